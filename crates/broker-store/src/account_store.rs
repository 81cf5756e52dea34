//! Persistent store adapter for account records
//!
//! Records live under `<prefix>:<account_id>` so the accounts can share a
//! store with unrelated data.

use crate::{DiskStore, StoreError, DEFAULT_KEY_PREFIX};
use broker_proto::{decode_record, encode_record, AccountConfig};
use tracing::debug;

/// Single-pass sequence of stored accounts
///
/// Failures confined to one record (see [`StoreError::is_record_error`])
/// are yielded in place so the caller can skip them and keep going.
pub type AccountRecords<'a> = Box<dyn Iterator<Item = Result<AccountConfig, StoreError>> + Send + 'a>;

/// Durable home of account configurations
pub trait AccountStore: Send + Sync {
    /// Durably record `account`, replacing any earlier version
    fn save(&self, account: &AccountConfig) -> Result<(), StoreError>;

    /// Scan every stored account
    fn load_all(&self) -> AccountRecords<'_>;
}

/// Build the storage key for an account
pub fn record_key(prefix: &str, account_id: &str) -> String {
    format!("{}:{}", prefix, account_id)
}

/// [`AccountStore`] on top of a [`DiskStore`]
pub struct DiskAccountStore {
    disk: DiskStore,
    prefix: String,
}

impl DiskAccountStore {
    pub fn new(disk: DiskStore) -> Self {
        Self::with_prefix(disk, DEFAULT_KEY_PREFIX)
    }

    pub fn with_prefix(disk: DiskStore, prefix: impl Into<String>) -> Self {
        Self {
            disk,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn load_key(&self, key: &str) -> Result<AccountConfig, StoreError> {
        let bytes = self.disk.read(key)?;
        let account = decode_record(&bytes).map_err(|source| StoreError::Corrupt {
            key: key.to_string(),
            source,
        })?;

        if record_key(&self.prefix, &account.account_id) != key {
            return Err(StoreError::KeyMismatch {
                key: key.to_string(),
                found: account.account_id,
            });
        }
        Ok(account)
    }
}

impl AccountStore for DiskAccountStore {
    fn save(&self, account: &AccountConfig) -> Result<(), StoreError> {
        let key = record_key(&self.prefix, &account.account_id);
        self.disk.write(&key, &encode_record(account))?;
        debug!(key = %key, "Saved account record");
        Ok(())
    }

    fn load_all(&self) -> AccountRecords<'_> {
        let namespace = format!("{}:", self.prefix);
        Box::new(
            self.disk
                .keys_with_prefix(&namespace)
                .map(move |key| key.and_then(|key| self.load_key(&key))),
        )
    }
}
