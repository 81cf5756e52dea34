use std::path::PathBuf;
use thiserror::Error;

/// TLS configuration errors
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Bad PEM data in {0}")]
    BadPem(String),

    #[error("No certificates found in {0}")]
    NoCertificates(String),

    #[error("No private key found in {0}")]
    NoPrivateKey(String),

    #[error("Certificate and key must be configured together")]
    IncompletePair,

    #[error("Certificate generation failed: {0}")]
    Generation(String),

    #[error("TLS error: {0}")]
    Rustls(#[from] rustls::Error),
}
