//! Account record codec
//!
//! One record per account. The payload is a JSON object carrying the
//! account fields plus a schema version `v`; records written before the
//! version field existed decode as version 1.

use crate::AccountConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current record schema version
pub const RECORD_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed account record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported account record version {0}")]
    UnsupportedVersion(u32),
}

#[derive(Serialize)]
struct RecordOut<'a> {
    v: u32,
    #[serde(flatten)]
    account: &'a AccountConfig,
}

#[derive(Deserialize)]
struct RecordIn {
    #[serde(default = "legacy_version")]
    v: u32,
    #[serde(flatten)]
    account: AccountConfig,
}

fn legacy_version() -> u32 {
    1
}

/// Serialize an account into its stored payload
pub fn encode_record(account: &AccountConfig) -> Vec<u8> {
    let record = RecordOut {
        v: RECORD_VERSION,
        account,
    };
    // Plain strings and a string list: serialization cannot fail.
    serde_json::to_vec(&record).unwrap_or_default()
}

/// Parse a stored payload back into an account
pub fn decode_record(bytes: &[u8]) -> Result<AccountConfig, DecodeError> {
    let record: RecordIn = serde_json::from_slice(bytes)?;
    if record.v != RECORD_VERSION {
        return Err(DecodeError::UnsupportedVersion(record.v));
    }
    Ok(record.account)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AccountConfig {
        AccountConfig {
            account_id: "a1".to_string(),
            bound_secret: "pw1".to_string(),
            subdomains: vec!["a1.example".to_string(), "www.a1.example".to_string()],
        }
    }

    #[test]
    fn test_encoded_record_carries_version() {
        let bytes = encode_record(&sample());
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["v"], 1);
        assert_eq!(value["accountId"], "a1");
        assert_eq!(value["boundSecret"], "pw1");
    }

    #[test]
    fn test_decode_restores_account() {
        let decoded = decode_record(&encode_record(&sample())).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_decode_unversioned_record() {
        let bytes = br#"{"accountId":"a1","boundSecret":"","subdomains":["a1.example"]}"#;
        let decoded = decode_record(bytes).unwrap();
        assert_eq!(decoded.account_id, "a1");
        assert!(!decoded.is_bound());
    }

    #[test]
    fn test_decode_rejects_future_version() {
        let bytes = br#"{"v":7,"accountId":"a1","boundSecret":"","subdomains":[]}"#;
        assert!(matches!(
            decode_record(bytes),
            Err(DecodeError::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_record(b"{not json"),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode_record(br#"{"boundSecret":"x"}"#),
            Err(DecodeError::Malformed(_))
        ));
    }
}
