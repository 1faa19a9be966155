//! HTTP listener facade: construction, `run()` and `stop()`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::server::accept::AcceptLoop;
use crate::server::config::ServerConfig;
use crate::server::error::Error;
use crate::server::handler::RequestHandler;
use crate::server::listener::{self, ListeningSocket};
use crate::server::stats::{ServerStats, StatsSnapshot};
use crate::server::tls::TlsContext;
use crate::server::worker_pool::WorkerPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Running,
    Stopped,
}

/// An HTTP listener.
///
/// Construction loads TLS material and binds the socket; [`run`](Self::run) starts
/// the worker pool and the accept loop; [`stop`](Self::stop) (or dropping the
/// server) cancels accepting, stops the event loop and joins every worker.
pub struct HttpServer<H: RequestHandler> {
    config: ServerConfig,
    local_addr: SocketAddr,
    /// The bound socket until `run()` hands it to the accept loop.
    socket: Option<ListeningSocket>,
    tls: Option<TlsContext>,
    handler: Arc<H>,
    stats: Arc<ServerStats>,
    shutdown: watch::Sender<bool>,
    pool: Option<WorkerPool>,
    state: State,
}

impl<H: RequestHandler> HttpServer<H> {
    /// Create a server bound to `config.address:config.port`.
    ///
    /// Fails on invalid configuration, unreadable TLS material, resolution errors
    /// and bind errors. A server that failed to construct does not exist, so
    /// `run()` cannot be reached.
    pub fn new(config: ServerConfig, handler: H) -> Result<Self, Error> {
        config.validate()?;
        let tls = TlsContext::from_config(&config)?;
        let addr = listener::resolve(&config.address, &config.port)?;
        let socket = ListeningSocket::bind(addr)?;
        let local_addr = socket.local_addr();
        let (shutdown, _) = watch::channel(false);

        info!(
            "Server bound to {scheme}://{local_addr}",
            scheme = if tls.is_some() { "https" } else { "http" }
        );

        Ok(Self {
            config,
            local_addr,
            socket: Some(socket),
            tls,
            handler: Arc::new(handler),
            stats: Arc::new(ServerStats::new()),
            shutdown,
            pool: None,
            state: State::Idle,
        })
    }

    /// Arm the first accept and start the worker threads.
    pub fn run(&mut self) -> Result<(), Error> {
        match self.state {
            State::Running => return Err(Error::AlreadyRunning),
            State::Stopped => return Err(Error::Stopped),
            State::Idle => {}
        }
        // The socket stays in place if the pool cannot be started.
        let pool = WorkerPool::start(self.config.workers, &self.config.thread_name, &self.stats)?;
        let listener = {
            let _guard = pool.handle().enter();
            self.socket.take().map(|socket| TcpListener::from_std(socket.into_std()))
        };
        let listener = match listener {
            Some(Ok(listener)) => listener,
            failed => {
                // The socket is gone, so the server cannot be run again.
                self.state = State::Stopped;
                pool.shutdown();
                return Err(match failed {
                    Some(Err(e)) => Error::IoError(e),
                    _ => Error::Stopped,
                });
            }
        };

        let accept_loop = AcceptLoop::new(
            listener,
            self.tls.clone(),
            Arc::clone(&self.handler),
            Arc::clone(&self.stats),
            self.shutdown.subscribe(),
        );
        pool.handle().spawn(accept_loop.run());

        info!(
            "Server running on {addr} with {workers} worker thread(s)",
            addr = self.local_addr,
            workers = pool.workers()
        );
        self.pool = Some(pool);
        self.state = State::Running;
        Ok(())
    }

    /// Cancel the outstanding accept, close the socket, stop the event loop and
    /// join all workers. Calling it again, or before `run()`, is a no-op.
    pub fn stop(&mut self) {
        if self.state == State::Stopped {
            return;
        }
        self.state = State::Stopped;

        self.shutdown.send_replace(true);
        if self.socket.take().is_some() {
            debug!("Closed listening socket on {addr}", addr = self.local_addr);
        }
        if let Some(pool) = self.pool.take() {
            pool.shutdown();
        }
        info!("Server on {addr} stopped", addr = self.local_addr);
    }

    /// Drive the event loop on the calling thread until `future` completes.
    ///
    /// Required when the server runs with zero worker threads; with workers it
    /// simply waits for `future` alongside them.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output, Error> {
        self.pool
            .as_ref()
            .map(|pool| pool.block_on(future))
            .ok_or(Error::NotRunning)
    }

    /// The bound endpoint, with the actual port when port 0 was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl<H: RequestHandler> Drop for HttpServer<H> {
    fn drop(&mut self) {
        self.stop();
    }
}
