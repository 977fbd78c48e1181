//! TLS configuration for the log server.
//!
//! Supports both plain TLS (server authentication) and mutual TLS. With
//! mutual TLS the transport verifies client certificates against the
//! configured CA, and the leaf certificate's SHA-256 fingerprint becomes
//! the caller's authorization subject — the principal the ACL policy keys
//! on. Plaintext connections carry the anonymous subject `""`.
//!
//! ## Usage
//!
//! ```ignore
//! // TLS only
//! let tls = TlsSettings::new("server.pem", "server-key.pem").load()?;
//!
//! // Mutual TLS: also require CA-signed client certificates
//! let tls = TlsSettings::new("server.pem", "server-key.pem")
//!     .with_client_ca("ca.pem")
//!     .load()?;
//!
//! Server::builder().tls_config(tls)?...
//! ```

use std::path::PathBuf;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tonic::transport::{Certificate, Identity, ServerTlsConfig};
use tonic::Request;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read certificate or key file: {0}")]
    Read(#[from] std::io::Error),
}

/// Paths to the PEM material the server loads at startup.
#[derive(Debug, Clone)]
pub struct TlsSettings {
    cert_path: PathBuf,
    key_path: PathBuf,
    client_ca_path: Option<PathBuf>,
}

impl TlsSettings {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            client_ca_path: None,
        }
    }

    /// Require client certificates signed by the CA at `path` (mutual TLS).
    pub fn with_client_ca(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_ca_path = Some(path.into());
        self
    }

    /// Read the PEM files and build the transport TLS configuration.
    pub fn load(&self) -> Result<ServerTlsConfig, TlsError> {
        let cert = std::fs::read(&self.cert_path)?;
        let key = std::fs::read(&self.key_path)?;
        let mut config = ServerTlsConfig::new().identity(Identity::from_pem(cert, key));
        if let Some(ca_path) = &self.client_ca_path {
            let ca = std::fs::read(ca_path)?;
            config = config
                .client_ca_root(Certificate::from_pem(ca))
                .client_auth_optional(false);
        }
        Ok(config)
    }
}

/// The caller's authorization subject, as established by the transport.
///
/// With mutual TLS the transport has already verified the client's
/// certificate chain; the subject is the hex SHA-256 fingerprint of the
/// DER-encoded leaf certificate. Without client authentication there is no
/// verified identity and the subject is empty.
pub fn peer_subject<T>(request: &Request<T>) -> String {
    request
        .peer_certs()
        .and_then(|certs| certs.first().map(|cert| fingerprint(cert.as_ref())))
        .unwrap_or_default()
}

/// Hex SHA-256 fingerprint of a DER-encoded certificate. The same value
/// `openssl x509 -fingerprint -sha256` prints, lowercased and uncolonned,
/// so operators can compute principals for the policy file.
pub fn fingerprint(der: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(der);
    format!("{:x}", hasher.finalize())
}
