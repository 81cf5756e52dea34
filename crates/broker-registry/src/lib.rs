//! User registry and admission control for the tunnel broker
//!
//! The [`UserRegistry`] indexes accounts by id and by subdomain. The
//! [`AdmissionController`] sits in front of it: it provisions accounts,
//! runs the trust-on-first-use bind, enforces the per-period traffic quota,
//! and makes sure every persisted change reaches the store before it is
//! reported.

pub mod account;
pub mod admission;
pub mod bootstrap;
pub mod error;
pub mod registry;
pub mod reset;

pub use account::{AccountHandle, AccountState};
pub use admission::{AdmissionConfig, AdmissionController, DEFAULT_RESET_INTERVAL};
pub use bootstrap::{load_registry, LoadReport};
pub use error::{AdmissionError, ProvisionError, RegistryError};
pub use registry::UserRegistry;
pub use reset::spawn_period_reset;
