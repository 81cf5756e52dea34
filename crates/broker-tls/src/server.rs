//! Server-side TLS configuration

use crate::pem::{load_certs, load_private_key};
use crate::self_signed::{generate_self_signed, DEFAULT_NAMES};
use crate::{provider, TlsError};
use rustls::ServerConfig;
use std::path::Path;
use tracing::{info, warn};

/// Build a server config from PEM files
///
/// With neither path given, a freshly generated self-signed identity is
/// used instead. Giving only one of the two is an error.
pub fn load_server_config(
    cert_path: Option<&Path>,
    key_path: Option<&Path>,
) -> Result<ServerConfig, TlsError> {
    let (certs, key) = match (cert_path, key_path) {
        (Some(cert_path), Some(key_path)) => {
            info!(cert = %cert_path.display(), "Loading TLS certificate");
            (load_certs(cert_path)?, load_private_key(key_path)?)
        }
        (None, None) => {
            warn!("No TLS certificate configured, using a generated self-signed certificate");
            let identity = generate_self_signed(DEFAULT_NAMES)?;
            (vec![identity.cert_der], identity.key_der)
        }
        _ => return Err(TlsError::IncompletePair),
    };

    let config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fallback_identity() {
        assert!(load_server_config(None, None).is_ok());
    }

    #[test]
    fn test_load_from_files() {
        let temp = TempDir::new().unwrap();
        let cert = temp.path().join("server.crt");
        let key = temp.path().join("server.key");
        generate_self_signed(&["broker.test"])
            .unwrap()
            .save_to_files(&cert, &key)
            .unwrap();

        assert!(load_server_config(Some(&cert), Some(&key)).is_ok());
    }

    #[test]
    fn test_half_configured_pair() {
        let result = load_server_config(Some(Path::new("server.crt")), None);
        assert!(matches!(result, Err(TlsError::IncompletePair)));
    }
}
