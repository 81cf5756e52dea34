//! Durable storage for broker accounts
//!
//! A small sharded key-value store on the local filesystem, and the
//! account-level adapter the registry is bootstrapped from.

pub mod account_store;
pub mod disk;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod transform;

pub use account_store::{record_key, AccountRecords, AccountStore, DiskAccountStore};
pub use disk::{DiskStore, DiskStoreOptions, Keys, DEFAULT_CACHE_SIZE};
pub use error::StoreError;
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryAccountStore;
pub use transform::{block_transform, KeyTransform, SMALL_BUCKET};

/// Namespace prepended to every account key
pub const DEFAULT_KEY_PREFIX: &str = "broker";
