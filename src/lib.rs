//! An embeddable HTTP listener core.
//!
//! This library binds a TCP listening socket, optionally wraps accepted connections
//! in TLS, accepts connections in a continuously re-armed loop and hands each one to
//! a caller-supplied request handler, with all I/O running on a fixed pool of worker
//! threads.
//!
//! # Features
//!
//! - Synchronous construction: TLS material is loaded and the socket is bound before
//!   [`HttpServer::new`] returns, so configuration mistakes surface immediately
//! - A single outstanding accept at any time; slow handlers never delay the next accept
//! - A fixed number of worker threads sharing one event loop, joined on `stop()`
//! - Optional TLS 1.2/1.3 from a PEM certificate chain and private key
//! - Lock-free counters describing the accept loop, connections and workers
//!
//! HTTP parsing, routing and reply formatting are left to the [`RequestHandler`].
//!
//! # Examples
//!
//! ```
//! use acceptd::{Error, Exchange, HttpServer, ServerConfig};
//! use tokio::io::AsyncWriteExt;
//!
//! let config = ServerConfig::new("127.0.0.1", 0).with_workers(2);
//!
//! let mut server = HttpServer::new(config, |mut exchange: Exchange| async move {
//!     exchange
//!         .write_all(b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n")
//!         .await?;
//!     Ok::<(), Error>(())
//! })?;
//!
//! println!("Listening on {}", server.local_addr());
//! server.run()?;
//! server.stop();
//! # Ok::<(), Error>(())
//! ```
//!
//! ## Error handling
//!
//! ```
//! use acceptd::{Error, Exchange, HttpServer, ServerConfig};
//!
//! let config = ServerConfig::new("127.0.0.1", 0).with_tls("missing-chain.pem", "missing-key.pem");
//! let handler = |_exchange: Exchange| async { Ok::<(), Error>(()) };
//!
//! match HttpServer::new(config, handler) {
//!     Ok(_) => println!("Server constructed"),
//!     Err(Error::Tls(err)) => println!("Could not load TLS material: {}", err),
//!     Err(err) => println!("Other error: {}", err),
//! }
//! ```
//!
//! See the `demos` directory for a complete echo server.

// Export the server module
pub mod server;

// Re-export commonly used items for convenience
pub use server::{
    Connection, Error, Exchange, HandlerFuture, HttpServer, RequestHandler, RequestReader, ResponseWriter,
    ServerConfig, ServerStats, StatsSnapshot, TlsContext, TlsError, Transport,
};
