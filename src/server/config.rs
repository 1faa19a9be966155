//! Server configuration.

use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::server::error::Error;

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// The host name or IP address to bind to.
    pub address: String,
    /// The port to bind to. Accepts either a string or a number when deserialized.
    #[serde(deserialize_with = "deserialize_port")]
    pub port: String,
    /// Number of worker threads running the event loop.
    ///
    /// Zero means no threads are spawned and the caller drives the event loop
    /// with [`HttpServer::block_on`](crate::HttpServer::block_on).
    pub workers: usize,
    /// PEM certificate chain. Must be given together with `key_path`.
    pub cert_path: Option<PathBuf>,
    /// PEM private key. Must be given together with `cert_path`.
    pub key_path: Option<PathBuf>,
    /// Name prefix for worker threads.
    pub thread_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: "8080".to_string(),
            workers: default_workers(),
            cert_path: None,
            key_path: None,
            thread_name: "acceptd-worker".to_string(),
        }
    }
}

impl ServerConfig {
    /// Create a plaintext configuration for the given address and port.
    pub fn new(address: impl Into<String>, port: impl ToString) -> Self {
        Self {
            address: address.into(),
            port: port.to_string(),
            ..Self::default()
        }
    }

    /// Set the worker thread count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Enable TLS with a PEM certificate chain and private key.
    pub fn with_tls(mut self, cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        self.cert_path = Some(cert_path.into());
        self.key_path = Some(key_path.into());
        self
    }

    /// Set the worker thread name prefix.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Parse a configuration from a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Whether both TLS paths are configured.
    pub fn tls_enabled(&self) -> bool {
        self.cert_path.is_some() && self.key_path.is_some()
    }

    /// Check the invariants that do not require touching the network or filesystem.
    pub fn validate(&self) -> Result<(), Error> {
        if self.address.trim().is_empty() {
            return Err(Error::InvalidConfig("address must not be empty".to_string()));
        }
        if self.thread_name.is_empty() {
            return Err(Error::InvalidConfig("thread_name must not be empty".to_string()));
        }
        match (&self.cert_path, &self.key_path) {
            (Some(_), Some(_)) | (None, None) => Ok(()),
            (cert_path, key_path) => Err(Error::PartialTlsConfig {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
            }),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct PortVisitor;

    impl Visitor<'_> for PortVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a port as a string or an unsigned integer")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(PortVisitor)
}
