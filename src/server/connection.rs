//! The per-connection object created by the accept loop.
//!
//! A [`Connection`] owns one accepted socket. [`Connection::start`] moves it into its
//! own task on the event loop, so it stays alive exactly as long as its exchange:
//! an optional TLS handshake followed by a single [`RequestHandler`] invocation.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

use crate::server::error::Error;
use crate::server::handler::RequestHandler;
use crate::server::stats::ServerStats;
use crate::server::tls::TlsContext;

/// The byte stream of an accepted connection.
#[derive(Debug)]
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport {
    pub fn is_tls(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }
}

impl AsyncRead for Transport {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Read side of a split [`Exchange`].
pub type RequestReader = ReadHalf<Exchange>;
/// Write side of a split [`Exchange`].
pub type ResponseWriter = WriteHalf<Exchange>;

/// What a [`RequestHandler`] receives: the connection's transport and its endpoints.
#[derive(Debug)]
pub struct Exchange {
    transport: Transport,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
}

impl Exchange {
    pub fn new(transport: Transport, peer_addr: SocketAddr, local_addr: SocketAddr) -> Self {
        Self {
            transport,
            peer_addr,
            local_addr,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_tls(&self) -> bool {
        self.transport.is_tls()
    }

    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    pub fn into_transport(self) -> Transport {
        self.transport
    }

    /// Split into independently usable request and response halves.
    pub fn into_split(self) -> (RequestReader, ResponseWriter) {
        tokio::io::split(self)
    }
}

impl AsyncRead for Exchange {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().transport).poll_read(cx, buf)
    }
}

impl AsyncWrite for Exchange {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().transport).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().transport).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().transport).poll_shutdown(cx)
    }
}

/// One accepted socket bound to the server's handler.
pub struct Connection<H> {
    stream: TcpStream,
    peer_addr: SocketAddr,
    tls: Option<TlsContext>,
    handler: Arc<H>,
    stats: Arc<ServerStats>,
}

impl<H: RequestHandler> Connection<H> {
    pub(crate) fn new(
        stream: TcpStream,
        peer_addr: SocketAddr,
        tls: Option<TlsContext>,
        handler: Arc<H>,
        stats: Arc<ServerStats>,
    ) -> Self {
        Self {
            stream,
            peer_addr,
            tls,
            handler,
            stats,
        }
    }

    /// Hand the connection over to its own task on the current event loop.
    ///
    /// Must be called from within the event loop.
    pub fn start(self) {
        let active = ActiveConnection::new(Arc::clone(&self.stats));
        tokio::spawn(self.serve(active));
    }

    /// `_active` is owned by the task from the moment it is spawned, so the
    /// gauge is released even when the task is dropped before its first poll.
    async fn serve(self, _active: ActiveConnection) {
        let Connection {
            stream,
            peer_addr,
            tls,
            handler,
            stats,
        } = self;

        let exchange = match Self::establish(stream, peer_addr, tls.as_ref()).await {
            Ok(exchange) => exchange,
            Err(e) => {
                debug!("Failed to establish connection with {peer_addr}: {e}");
                stats.record_handshake_failure();
                return;
            }
        };

        if let Err(e) = handler.handle(exchange).await {
            debug!("Error handling connection from {peer_addr}: {e}");
            stats.record_handler_error();
        }
    }

    async fn establish(stream: TcpStream, peer_addr: SocketAddr, tls: Option<&TlsContext>) -> Result<Exchange, Error> {
        let local_addr = stream.local_addr()?;
        let transport = match tls {
            Some(tls) => Transport::Tls(Box::new(tls.acceptor().accept(stream).await?)),
            None => Transport::Plain(stream),
        };
        Ok(Exchange::new(transport, peer_addr, local_addr))
    }
}

struct ActiveConnection(Arc<ServerStats>);

impl ActiveConnection {
    fn new(stats: Arc<ServerStats>) -> Self {
        stats.connection_started();
        Self(stats)
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.0.connection_finished();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn accepted_pair() -> (TcpStream, SocketAddr, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (server_side, peer) = listener.accept().await.unwrap();
        (server_side, peer, client)
    }

    async fn wait_for_completion(stats: &ServerStats) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while stats.snapshot().connections_completed == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_plain_exchange_reaches_handler() {
        let (stream, peer, mut client) = accepted_pair().await;
        let stats = Arc::new(ServerStats::new());
        let handler = Arc::new(move |mut exchange: Exchange| async move {
            assert!(!exchange.is_tls());
            assert_eq!(exchange.peer_addr(), peer);
            let mut buf = [0u8; 5];
            exchange.read_exact(&mut buf).await?;
            exchange.write_all(&buf).await?;
            Ok::<(), Error>(())
        });

        Connection::new(stream, peer, None, handler, Arc::clone(&stats)).start();

        client.write_all(b"hello").await.unwrap();
        let mut echoed = [0u8; 5];
        client.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"hello");

        wait_for_completion(&stats).await;
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.connections_started, 1);
        assert_eq!(snapshot.connections_active, 0);
        assert_eq!(snapshot.handler_errors, 0);
    }

    #[tokio::test]
    async fn test_handler_error_is_counted() {
        let (stream, peer, _client) = accepted_pair().await;
        let stats = Arc::new(ServerStats::new());
        let handler = Arc::new(|_exchange: Exchange| async { Err::<(), Error>(Error::Handler("boom".to_string())) });

        Connection::new(stream, peer, None, handler, Arc::clone(&stats)).start();

        wait_for_completion(&stats).await;
        assert_eq!(stats.snapshot().handler_errors, 1);
    }

    #[tokio::test]
    async fn test_split_exchange() {
        let (stream, peer, mut client) = accepted_pair().await;
        let stats = Arc::new(ServerStats::new());
        let handler = Arc::new(|exchange: Exchange| async move {
            let (mut request, mut response) = exchange.into_split();
            let mut line = [0u8; 4];
            request.read_exact(&mut line).await?;
            response.write_all(b"pong").await?;
            response.shutdown().await?;
            Ok::<(), Error>(())
        });

        Connection::new(stream, peer, None, handler, Arc::clone(&stats)).start();

        client.write_all(b"ping").await.unwrap();
        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"pong");
    }

    #[test]
    fn test_connection_dropped_before_first_poll_is_not_left_active() {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let stats = Arc::new(ServerStats::new());
        let (stream, peer, client) = runtime.block_on(accepted_pair());
        let handler = Arc::new(|_exchange: Exchange| async {
            std::future::pending::<()>().await;
            Ok::<(), Error>(())
        });

        runtime.block_on(async {
            Connection::new(stream, peer, None, handler, Arc::clone(&stats)).start();
        });
        assert_eq!(stats.snapshot().connections_started, 1);
        assert_eq!(stats.snapshot().connections_active, 1);

        drop(runtime);
        drop(client);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.connections_active, 0);
        assert_eq!(snapshot.connections_completed, 1);
    }
}
