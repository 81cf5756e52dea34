//! PEM loading helpers

use crate::TlsError;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::path::Path;

pub fn read_file(path: &Path) -> Result<Vec<u8>, TlsError> {
    std::fs::read(path).map_err(|source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse every certificate in a PEM buffer; `origin` names it in errors
pub fn parse_certs(pem: &[u8], origin: &str) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| TlsError::BadPem(origin.to_string()))?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(origin.to_string()));
    }
    Ok(certs)
}

/// Parse the first private key in a PEM buffer
pub fn parse_private_key(pem: &[u8], origin: &str) -> Result<PrivateKeyDer<'static>, TlsError> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|_| TlsError::BadPem(origin.to_string()))?
        .ok_or_else(|| TlsError::NoPrivateKey(origin.to_string()))
}

pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    parse_certs(&read_file(path)?, &path.display().to_string())
}

pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    parse_private_key(&read_file(path)?, &path.display().to_string())
}
