//! The request handler capability invoked once per accepted connection.

use std::future::Future;
use std::pin::Pin;

use crate::server::connection::Exchange;
use crate::server::error::Error;

/// Type alias for a boxed future that resolves when the exchange is finished.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), Error>> + Send>>;

/// Serves one accepted connection.
///
/// A single handler is supplied at construction and shared by every connection,
/// so it may be invoked concurrently from different worker threads.
pub trait RequestHandler: Send + Sync + 'static {
    /// Read the request from `exchange` and write the reply to it.
    fn handle(&self, exchange: Exchange) -> HandlerFuture;
}

impl<F, Fut> RequestHandler for F
where
    F: Fn(Exchange) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn handle(&self, exchange: Exchange) -> HandlerFuture {
        Box::pin(self(exchange))
    }
}
