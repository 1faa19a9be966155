//! TLS context loading.
//!
//! A [`TlsContext`] is built once at construction from a PEM certificate chain and
//! private key and then shared, read-only, by every accepted connection. Loading
//! failures are construction errors: the server never falls back to plaintext when
//! TLS was asked for.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

use crate::server::config::ServerConfig;
use crate::server::error::{Error, TlsError};

/// Immutable TLS server configuration shared by all connections.
#[derive(Clone)]
pub struct TlsContext {
    config: Arc<rustls::ServerConfig>,
    acceptor: TlsAcceptor,
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext")
            .field("acceptor", &"<TlsAcceptor>")
            .finish()
    }
}

impl TlsContext {
    /// Build the context described by `config`.
    ///
    /// Returns `Ok(None)` when neither path is set (plaintext mode) and
    /// [`Error::PartialTlsConfig`] when only one of them is.
    pub fn from_config(config: &ServerConfig) -> Result<Option<Self>, Error> {
        match (&config.cert_path, &config.key_path) {
            (Some(cert), Some(key)) => Self::from_pem_files(cert, key).map(Some),
            (None, None) => Ok(None),
            (cert_path, key_path) => Err(Error::PartialTlsConfig {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
            }),
        }
    }

    /// Load a PEM certificate chain and private key.
    ///
    /// Only TLS 1.2 and 1.3 are negotiated; older protocol versions are never offered.
    pub fn from_pem_files(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self, Error> {
        let cert_path = cert_path.as_ref();
        let key_path = key_path.as_ref();

        let certs = load_certificates(cert_path)?;
        let key = load_private_key(key_path)?;
        debug!(
            "TLS: loaded {count} certificate(s) from {chain}, key from {key}",
            count = certs.len(),
            chain = cert_path.display(),
            key = key_path.display()
        );

        let config = rustls::ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(TlsError::from)?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(TlsError::from)?;

        Ok(Self::from_server_config(Arc::new(config)))
    }

    /// Wrap an already-built rustls configuration.
    pub fn from_server_config(config: Arc<rustls::ServerConfig>) -> Self {
        let acceptor = TlsAcceptor::from(Arc::clone(&config));
        Self { config, acceptor }
    }

    /// The rustls configuration backing this context.
    pub fn server_config(&self) -> &Arc<rustls::ServerConfig> {
        &self.config
    }

    pub(crate) fn acceptor(&self) -> &TlsAcceptor {
        &self.acceptor
    }
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path).map(BufReader::new).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Pem {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Pem {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(PathBuf::from(path)))
}
