//! TLS termination (cargo feature `tls`).
//!
//! Loads a PEM certificate chain and a PEM PKCS#8 private key (the format
//! `mkcert` writes as `localhost.pem` / `localhost-key.pem`) into a
//! native-tls acceptor.  Each accepted TCP stream is wrapped before the
//! WebSocket handshake runs on top of it.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::net::TcpStream;
use tokio_native_tls::{native_tls, TlsStream};

use crate::domain::TlsConfig;

/// Error type for TLS setup and handshakes.
#[derive(Debug, Error)]
pub enum TlsError {
    /// The certificate or key file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The certificate/key pair was rejected by the TLS library.
    #[error("invalid certificate or key: {0}")]
    Identity(#[source] native_tls::Error),

    /// The client's TLS handshake failed.
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] native_tls::Error),
}

/// Cloneable acceptor shared by all connection tasks.
#[derive(Clone)]
pub struct TlsAcceptor {
    inner: tokio_native_tls::TlsAcceptor,
}

impl TlsAcceptor {
    /// Builds an acceptor from the configured certificate and key files.
    ///
    /// # Errors
    ///
    /// Returns [`TlsError::Read`] if either file is unreadable and
    /// [`TlsError::Identity`] if their contents are not a valid pair.
    pub fn from_config(config: &TlsConfig) -> Result<Self, TlsError> {
        let cert = read(&config.cert_path)?;
        let key = read(&config.key_path)?;
        let identity =
            native_tls::Identity::from_pkcs8(&cert, &key).map_err(TlsError::Identity)?;
        let acceptor = native_tls::TlsAcceptor::new(identity).map_err(TlsError::Identity)?;
        Ok(Self {
            inner: acceptor.into(),
        })
    }

    /// Runs the server side of the TLS handshake on `stream`.
    pub async fn accept(&self, stream: TcpStream) -> Result<TlsStream<TcpStream>, TlsError> {
        self.inner.accept(stream).await.map_err(TlsError::Handshake)
    }
}

fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    std::fs::read(path).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_certificate_is_read_error() {
        let config = TlsConfig {
            cert_path: PathBuf::from("/nonexistent/ducktunnel/cert.pem"),
            key_path: PathBuf::from("/nonexistent/ducktunnel/key.pem"),
        };

        let err = TlsAcceptor::from_config(&config).err().expect("must fail");

        match err {
            TlsError::Read { path, .. } => assert_eq!(path, config.cert_path),
            other => panic!("expected Read error, got {other}"),
        }
    }
}
