//! Account configuration

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Longest accepted account id, in bytes
///
/// Leaves room for a key prefix within the common 255-byte file name limit.
pub const MAX_ACCOUNT_ID_LEN: usize = 200;

/// Reasons an account configuration is refused before it reaches the registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("account id must not be empty")]
    EmptyAccountId,

    #[error("account id is {0} bytes, longer than {max}", max = MAX_ACCOUNT_ID_LEN)]
    AccountIdTooLong(usize),

    #[error("account id contains forbidden character {0:?}")]
    ForbiddenCharacter(char),

    #[error("subdomain must not be empty")]
    EmptySubdomain,

    #[error("subdomain listed twice: {0}")]
    DuplicateSubdomain(String),
}

/// Durable identity and configuration of one tunnel account
///
/// `bound_secret` is empty until the first successful login pairs the
/// account with the secret the client presented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct AccountConfig {
    /// Stable external identifier (the tunnel client id)
    pub account_id: String,
    /// Secret paired on first login; empty while unbound
    #[serde(default)]
    pub bound_secret: String,
    /// DNS names owned by this account
    #[serde(default)]
    pub subdomains: Vec<String>,
}

impl AccountConfig {
    pub fn new(account_id: impl Into<String>, subdomains: Vec<String>) -> Self {
        Self {
            account_id: account_id.into(),
            bound_secret: String::new(),
            subdomains,
        }
    }

    pub fn is_bound(&self) -> bool {
        !self.bound_secret.is_empty()
    }

    /// Check that the configuration can be indexed and stored
    ///
    /// Account ids end up in file names, so overlong ids, path separators
    /// and control characters are refused.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.account_id.is_empty() {
            return Err(ValidationError::EmptyAccountId);
        }

        if self.account_id.len() > MAX_ACCOUNT_ID_LEN {
            return Err(ValidationError::AccountIdTooLong(self.account_id.len()));
        }

        if let Some(c) = self
            .account_id
            .chars()
            .find(|c| matches!(c, '/' | '\\') || c.is_control())
        {
            return Err(ValidationError::ForbiddenCharacter(c));
        }

        for (i, subdomain) in self.subdomains.iter().enumerate() {
            if subdomain.is_empty() {
                return Err(ValidationError::EmptySubdomain);
            }
            if self.subdomains[..i].contains(subdomain) {
                return Err(ValidationError::DuplicateSubdomain(subdomain.clone()));
            }
        }

        Ok(())
    }
}

/// Point-in-time view of an account and its traffic counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    #[serde(flatten)]
    pub config: AccountConfig,
    /// Bytes moved since the last period reset
    pub bytes_transferred_period: u64,
    /// Bytes moved since the process started
    pub bytes_transferred_total: u64,
}
