use broker_proto::ValidationError;
use broker_store::StoreError;
use thiserror::Error;

/// Registry index errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Account already exists: {0}")]
    AlreadyExists(String),

    #[error("Subdomain already taken: {0}")]
    SubdomainTaken(String),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Account already bound: {0}")]
    AlreadyBound(String),

    #[error("Invalid account configuration: {0}")]
    Invalid(#[from] ValidationError),
}

/// Why a login attempt was refused
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("Unknown account")]
    UnknownAccount,

    #[error("Credentials rejected")]
    AuthRejected,

    #[error("Traffic quota exceeded")]
    QuotaExceeded,

    #[error("Failed to persist account: {0}")]
    Storage(#[from] StoreError),
}

/// Why an account could not be provisioned
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Failed to persist account: {0}")]
    Storage(#[from] StoreError),
}

impl ProvisionError {
    /// True when the request collides with an existing account
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ProvisionError::Registry(
                RegistryError::AlreadyExists(_) | RegistryError::SubdomainTaken(_)
            )
        )
    }
}
