//! The self-re-arming accept loop.
//!
//! Exactly one accept is outstanding at a time. Each completion either starts a
//! [`Connection`] or is counted as a failed attempt, and the next accept is armed
//! immediately afterwards. Only the shutdown signal ends the loop.

use std::sync::Arc;

use log::{debug, warn};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::server::connection::Connection;
use crate::server::handler::RequestHandler;
use crate::server::stats::ServerStats;
use crate::server::tls::TlsContext;

/// The in-flight "next connection" slot.
///
/// Lives from the moment an accept is issued until it completes or is cancelled.
struct PendingAccept<'a> {
    stats: &'a ServerStats,
}

impl<'a> PendingAccept<'a> {
    fn arm(stats: &'a ServerStats) -> Self {
        stats.accept_armed();
        Self { stats }
    }
}

impl Drop for PendingAccept<'_> {
    fn drop(&mut self) {
        self.stats.accept_settled();
    }
}

pub(crate) struct AcceptLoop<H> {
    listener: TcpListener,
    tls: Option<TlsContext>,
    handler: Arc<H>,
    stats: Arc<ServerStats>,
    shutdown: watch::Receiver<bool>,
}

impl<H: RequestHandler> AcceptLoop<H> {
    pub(crate) fn new(
        listener: TcpListener,
        tls: Option<TlsContext>,
        handler: Arc<H>,
        stats: Arc<ServerStats>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            listener,
            tls,
            handler,
            stats,
            shutdown,
        }
    }

    /// Accept until shutdown is signalled. The listener is closed when this returns.
    pub(crate) async fn run(mut self) {
        debug!("Accept loop armed on {:?}", self.listener.local_addr().ok());

        loop {
            if *self.shutdown.borrow_and_update() {
                break;
            }

            let pending = PendingAccept::arm(&self.stats);
            let accepted = tokio::select! {
                biased;
                // Err means the server side of the signal is gone, which is a stop too.
                _ = self.shutdown.changed() => None,
                result = self.listener.accept() => Some(result),
            };
            drop(pending);

            match accepted {
                None => break,
                Some(Ok((stream, peer_addr))) => {
                    self.stats.record_accepted();
                    debug!("Accepted connection from {peer_addr}");
                    Connection::new(
                        stream,
                        peer_addr,
                        self.tls.clone(),
                        Arc::clone(&self.handler),
                        Arc::clone(&self.stats),
                    )
                    .start();
                }
                Some(Err(e)) => {
                    self.stats.record_accept_error();
                    warn!("Error accepting connection: {e}");
                }
            }
        }

        debug!("Accept loop cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::connection::Exchange;
    use crate::server::error::Error;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    async fn wait_for(stats: &ServerStats, check: impl Fn(&crate::StatsSnapshot) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check(&stats.snapshot()) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    fn greeting_handler() -> Arc<impl RequestHandler> {
        Arc::new(|mut exchange: Exchange| async move {
            exchange.write_all(b"hi").await?;
            Ok::<(), Error>(())
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rearms_after_each_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stats = Arc::new(ServerStats::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(
            AcceptLoop::new(listener, None, greeting_handler(), Arc::clone(&stats), shutdown_rx).run(),
        );

        for _ in 0..5 {
            let _client = TcpStream::connect(addr).await.unwrap();
        }
        wait_for(&stats, |s| s.accepted == 5 && s.connections_started == 5).await;
        wait_for(&stats, |s| s.pending_accepts == 1).await;

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.peak_pending_accepts, 1);
        assert_eq!(snapshot.pending_accepts, 0);
        assert_eq!(snapshot.accept_errors, 0);
    }

    #[tokio::test]
    async fn test_cancellation_closes_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stats = Arc::new(ServerStats::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(
            AcceptLoop::new(listener, None, greeting_handler(), Arc::clone(&stats), shutdown_rx).run(),
        );
        wait_for(&stats, |s| s.pending_accepts == 1).await;

        drop(shutdown_tx);
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

        assert!(TcpStream::connect(addr).await.is_err());
        assert_eq!(stats.snapshot().connections_started, 0);
    }

    #[tokio::test]
    async fn test_signal_raised_before_first_arm() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let stats = Arc::new(ServerStats::new());
        let (_shutdown_tx, shutdown_rx) = watch::channel(true);

        AcceptLoop::new(listener, None, greeting_handler(), Arc::clone(&stats), shutdown_rx)
            .run()
            .await;

        assert_eq!(stats.snapshot().peak_pending_accepts, 0);
    }
}
