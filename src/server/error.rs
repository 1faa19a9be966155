//! Error types for the listener core.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while constructing or running an [`HttpServer`](crate::HttpServer).
#[derive(Debug, Error)]
pub enum Error {
    /// The configured port is not a valid TCP port number.
    #[error("Invalid port: {0:?}")]
    InvalidPort(String),

    /// The bind address could not be resolved.
    #[error("Failed to resolve {address}:{port}: {source}")]
    Resolve {
        address: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Resolution succeeded but produced no usable endpoint.
    #[error("No address found for {address}:{port}")]
    NoAddress { address: String, port: u16 },

    /// Opening, configuring, binding or listening on the socket failed.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Only one of the certificate chain and private key paths was supplied.
    #[error("Partial TLS configuration: both cert_path and key_path are required (cert_path: {cert_path:?}, key_path: {key_path:?})")]
    PartialTlsConfig {
        cert_path: Option<PathBuf>,
        key_path: Option<PathBuf>,
    },

    /// The TLS certificate chain or private key could not be loaded.
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    /// The configuration is structurally invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration document could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// The event loop could not be started.
    #[error("Failed to start event loop: {0}")]
    Runtime(#[source] std::io::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// `run()` was called on a server that is already running.
    #[error("Server is already running")]
    AlreadyRunning,

    /// `run()` was called on a server that has been stopped.
    #[error("Server has been stopped and cannot be restarted")]
    Stopped,

    /// The event loop is not running.
    #[error("Server is not running")]
    NotRunning,

    /// A request handler failed.
    #[error("Handler error: {0}")]
    Handler(String),
}

/// Failures while loading TLS key material.
#[derive(Debug, Error)]
pub enum TlsError {
    /// A PEM file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A PEM file could not be parsed.
    #[error("Malformed PEM in {path}: {source}")]
    Pem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The certificate chain file contains no certificates.
    #[error("No certificates found in {0}")]
    NoCertificates(PathBuf),

    /// The key file contains no private key.
    #[error("No private key found in {0}")]
    NoPrivateKey(PathBuf),

    /// rustls rejected the chain/key pair or the protocol setup.
    #[error("{0}")]
    Rustls(#[from] rustls::Error),
}
