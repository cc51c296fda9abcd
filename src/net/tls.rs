//! TLS configuration and certificate loading.

use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid PEM data: {0}")]
    Pem(#[source] std::io::Error),

    #[error("no certificate found in PEM data")]
    MissingCertificate,

    #[error("no private key found in PEM data")]
    MissingKey,

    #[error("TLS setup failed: {0}")]
    Setup(#[source] std::io::Error),
}

/// A PEM certificate chain plus its private key.
#[derive(Clone)]
pub struct Credential {
    cert: Vec<u8>,
    key: Vec<u8>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("cert_len", &self.cert.len())
            .field("key", &"<redacted>")
            .finish()
    }
}

impl Credential {
    /// Validate PEM data and keep it for later server setup.
    pub fn from_pem(cert: Vec<u8>, key: Vec<u8>) -> Result<Self, TlsError> {
        let mut pem = cert.as_slice();
        match rustls_pemfile::certs(&mut pem).next() {
            None => return Err(TlsError::MissingCertificate),
            Some(Err(e)) => return Err(TlsError::Pem(e)),
            Some(Ok(_)) => {}
        }

        let mut pem = key.as_slice();
        match rustls_pemfile::private_key(&mut pem) {
            Ok(Some(_)) => {}
            Ok(None) => return Err(TlsError::MissingKey),
            Err(e) => return Err(TlsError::Pem(e)),
        }

        Ok(Self { cert, key })
    }

    /// Read and validate the certificate and key files.
    pub async fn load(cert_path: &Path, key_path: &Path) -> Result<Self, TlsError> {
        let cert = read(cert_path).await?;
        let key = read(key_path).await?;
        Self::from_pem(cert, key)
    }

    /// Server-side rustls configuration for axum-server.
    pub async fn rustls_config(&self) -> Result<RustlsConfig, TlsError> {
        RustlsConfig::from_pem(self.cert.clone(), self.key.clone())
            .await
            .map_err(TlsError::Setup)
    }
}

async fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    tokio::fs::read(path).await.map_err(|source| TlsError::Io {
        path: path.display().to_string(),
        source,
    })
}
