//! Generated fallback identity
//!
//! Used when a listener is asked for TLS without certificate paths. Clients
//! will not trust it unless told to; it exists so a development broker
//! needs no setup.

use crate::TlsError;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

/// Names the default identity is valid for
pub const DEFAULT_NAMES: &[&str] = &["localhost", "127.0.0.1", "::1"];

/// A self-signed certificate with its private key
pub struct SelfSignedIdentity {
    pub cert_der: CertificateDer<'static>,
    pub key_der: PrivateKeyDer<'static>,
    pub pem_cert: String,
    pub pem_key: String,
}

impl SelfSignedIdentity {
    /// Save certificate and key to PEM files
    pub fn save_to_files(
        &self,
        cert_path: &std::path::Path,
        key_path: &std::path::Path,
    ) -> std::io::Result<()> {
        std::fs::write(cert_path, &self.pem_cert)?;
        std::fs::write(key_path, &self.pem_key)?;
        Ok(())
    }
}

/// Generate a self-signed certificate for `names`
pub fn generate_self_signed(names: &[&str]) -> Result<SelfSignedIdentity, TlsError> {
    let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    let certified = rcgen::generate_simple_self_signed(names)
        .map_err(|e| TlsError::Generation(e.to_string()))?;

    Ok(SelfSignedIdentity {
        cert_der: certified.cert.der().clone(),
        key_der: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
            certified.key_pair.serialize_der(),
        )),
        pem_cert: certified.cert.pem(),
        pem_key: certified.key_pair.serialize_pem(),
    })
}
