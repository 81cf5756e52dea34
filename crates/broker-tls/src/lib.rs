//! TLS material for the broker's listeners and outbound connections
//!
//! Servers load a certificate chain and key from PEM files, or fall back to
//! generated self-signed material when no paths are configured. Clients
//! trust explicit PEM roots, or the bundled web PKI roots when none are
//! given.

pub mod client;
pub mod error;
pub mod pem;
pub mod self_signed;
pub mod server;

pub use client::{load_client_config, ClientTlsOptions};
pub use error::TlsError;
pub use self_signed::{generate_self_signed, SelfSignedIdentity};
pub use server::load_server_config;

use std::sync::Arc;

/// Crypto provider used for every config built here
pub(crate) fn provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}
