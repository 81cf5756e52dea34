//! Shared account types for the tunnel broker
//!
//! Defines the durable per-account configuration and the byte format
//! it is persisted in.

pub mod account;
pub mod codec;

pub use account::{AccountConfig, AccountSnapshot, ValidationError, MAX_ACCOUNT_ID_LEN};
pub use codec::{decode_record, encode_record, DecodeError, RECORD_VERSION};

/// Default traffic allowance per period (1 GiB)
pub const DEFAULT_QUOTA_LIMIT: u64 = 1024 * 1024 * 1024;
