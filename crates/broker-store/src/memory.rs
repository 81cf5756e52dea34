//! In-memory account store
//!
//! Keeps encoded records in a map. Writes can be made to fail on demand,
//! which is how persistence failure paths are exercised.

use crate::{AccountRecords, AccountStore, StoreError};
use broker_proto::{decode_record, encode_record, AccountConfig};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Default)]
pub struct MemoryAccountStore {
    records: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `save` fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Store raw bytes for an account, bypassing the codec
    pub fn insert_raw(&self, account_id: &str, bytes: Vec<u8>) {
        self.lock().insert(account_id.to_string(), bytes);
    }

    /// Decode the stored record for an account
    pub fn get(&self, account_id: &str) -> Option<AccountConfig> {
        self.lock()
            .get(account_id)
            .and_then(|bytes| decode_record(bytes).ok())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AccountStore for MemoryAccountStore {
    fn save(&self, account: &AccountConfig) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }

        self.lock()
            .insert(account.account_id.clone(), encode_record(account));
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load_all(&self) -> AccountRecords<'_> {
        let snapshot: Vec<(String, Vec<u8>)> = self
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Box::new(snapshot.into_iter().map(|(key, bytes)| {
            decode_record(&bytes).map_err(|source| StoreError::Corrupt { key, source })
        }))
    }
}
