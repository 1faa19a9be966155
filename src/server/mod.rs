//! The listener core: TLS setup, socket binding, the accept loop and the worker pool.

mod accept;
mod config;
mod connection;
mod error;
mod handler;
mod http_server;
mod listener;
mod stats;
mod tls;
mod worker_pool;

// Re-export public items
pub use config::ServerConfig;
pub use connection::{Connection, Exchange, RequestReader, ResponseWriter, Transport};
pub use error::{Error, TlsError};
pub use handler::{HandlerFuture, RequestHandler};
pub use http_server::HttpServer;
pub use listener::resolve;
pub use stats::{ServerStats, StatsSnapshot};
pub use tls::TlsContext;
