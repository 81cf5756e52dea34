use broker_proto::DecodeError;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record {key} is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: DecodeError,
    },

    #[error("Record {key} holds account {found}")]
    KeyMismatch { key: String, found: String },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// True for failures confined to a single record, which a bulk load skips
    pub fn is_record_error(&self) -> bool {
        matches!(
            self,
            StoreError::Corrupt { .. } | StoreError::KeyMismatch { .. } | StoreError::NotFound(_)
        )
    }
}
