//! Certificate material for the metrics endpoint.

use std::path::{Path, PathBuf};

use axum_server::tls_rustls::RustlsConfig;
use rcgen::{generate_simple_self_signed, CertifiedKey};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::TlsConfig;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {what} from {path}: {source}")]
    Read {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to generate a self-signed certificate: {0}")]
    Generate(#[from] rcgen::Error),

    #[error("invalid certificate or key: {0}")]
    Invalid(#[source] std::io::Error),
}

/// A PEM encoded certificate chain and private key.
#[derive(Clone)]
pub struct TlsMaterial {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

impl TlsMaterial {
    /// Reads both PEM files from disk.
    pub async fn load(cert_path: &Path, key_path: &Path) -> Result<Self, TlsError> {
        let cert_pem = read_pem("certificate", cert_path).await?;
        let key_pem = read_pem("private key", key_path).await?;
        Ok(TlsMaterial { cert_pem, key_pem })
    }

    /// Generates an ephemeral self-signed pair valid for `subject_alt_names`.
    pub fn self_signed(subject_alt_names: &[String]) -> Result<Self, TlsError> {
        let CertifiedKey { cert, key_pair } =
            generate_simple_self_signed(subject_alt_names.to_vec())?;
        Ok(TlsMaterial {
            cert_pem: cert.pem().into_bytes(),
            key_pem: key_pair.serialize_pem().into_bytes(),
        })
    }

    /// Loads or generates the material described by `config`.
    pub async fn from_config(config: &TlsConfig) -> Result<Self, TlsError> {
        match config {
            TlsConfig::Files {
                cert_path,
                key_path,
            } => {
                info!(cert = %cert_path.display(), key = %key_path.display(), "Loading TLS certificate");
                Self::load(cert_path, key_path).await
            }
            TlsConfig::SelfSigned { subject_alt_names } => {
                info!(names = ?subject_alt_names, "Generating self-signed TLS certificate");
                Self::self_signed(subject_alt_names)
            }
        }
    }

    /// Builds the rustls server configuration, validating the pair.
    pub async fn into_rustls_config(self) -> Result<RustlsConfig, TlsError> {
        install_crypto_provider();
        RustlsConfig::from_pem(self.cert_pem, self.key_pem)
            .await
            .map_err(TlsError::Invalid)
    }
}

async fn read_pem(what: &'static str, path: &Path) -> Result<Vec<u8>, TlsError> {
    tokio::fs::read(path).await.map_err(|source| TlsError::Read {
        what,
        path: path.to_path_buf(),
        source,
    })
}

/// Selects ring as the process-wide rustls provider. Later calls are no-ops.
pub fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }
}
