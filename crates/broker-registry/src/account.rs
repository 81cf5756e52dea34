//! Runtime account state

use broker_proto::{AccountConfig, AccountSnapshot};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Shared handle to a registered account
///
/// Returned by a successful login; the data plane attributes traffic to
/// it through [`crate::AdmissionController::record_traffic`].
pub type AccountHandle = Arc<AccountState>;

/// One account as held by the registry
///
/// Identity and subdomains never change after registration. The secret is
/// set at most once, and the traffic counters are independent atomics so
/// accounting never touches the registry lock.
#[derive(Debug)]
pub struct AccountState {
    account_id: String,
    subdomains: Vec<String>,
    bound_secret: OnceLock<String>,
    bytes_period: AtomicU64,
    bytes_total: AtomicU64,
}

impl AccountState {
    pub(crate) fn new(config: AccountConfig) -> Self {
        let bound_secret = OnceLock::new();
        if !config.bound_secret.is_empty() {
            let _ = bound_secret.set(config.bound_secret);
        }

        Self {
            account_id: config.account_id,
            subdomains: config.subdomains,
            bound_secret,
            bytes_period: AtomicU64::new(0),
            bytes_total: AtomicU64::new(0),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn subdomains(&self) -> &[String] {
        &self.subdomains
    }

    /// Whether `name` is one of this account's subdomains
    pub fn owns_subdomain(&self, name: &str) -> bool {
        self.subdomains.iter().any(|s| s == name)
    }

    pub fn is_bound(&self) -> bool {
        self.bound_secret.get().is_some()
    }

    pub(crate) fn secret_matches(&self, supplied: &str) -> bool {
        self.bound_secret.get().is_some_and(|s| s == supplied)
    }

    /// Pair the account with `secret`; false if it was already bound
    pub(crate) fn bind(&self, secret: String) -> bool {
        self.bound_secret.set(secret).is_ok()
    }

    pub fn bytes_transferred_period(&self) -> u64 {
        self.bytes_period.load(Ordering::Acquire)
    }

    pub fn bytes_transferred_total(&self) -> u64 {
        self.bytes_total.load(Ordering::Acquire)
    }

    /// Counters saturate at `u64::MAX` instead of wrapping
    pub(crate) fn add_traffic(&self, bytes: u64) {
        saturating_add(&self.bytes_period, bytes);
        saturating_add(&self.bytes_total, bytes);
    }

    pub(crate) fn reset_period(&self) {
        self.bytes_period.store(0, Ordering::Release);
    }

    /// Copy of the persisted configuration
    pub fn config(&self) -> AccountConfig {
        AccountConfig {
            account_id: self.account_id.clone(),
            bound_secret: self.bound_secret.get().cloned().unwrap_or_default(),
            subdomains: self.subdomains.clone(),
        }
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            config: self.config(),
            bytes_transferred_period: self.bytes_transferred_period(),
            bytes_transferred_total: self.bytes_transferred_total(),
        }
    }
}

fn saturating_add(counter: &AtomicU64, bytes: u64) {
    // The closure always returns Some, so the update cannot fail
    let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
        Some(v.saturating_add(bytes))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_only_once() {
        let state = AccountState::new(AccountConfig::new("a1", vec![]));
        assert!(!state.is_bound());
        assert!(!state.secret_matches(""));

        assert!(state.bind("pw1".to_string()));
        assert!(!state.bind("pw2".to_string()));

        assert!(state.secret_matches("pw1"));
        assert!(!state.secret_matches("pw2"));
        assert_eq!(state.config().bound_secret, "pw1");
    }

    #[test]
    fn test_prebound_config() {
        let mut config = AccountConfig::new("a1", vec![]);
        config.bound_secret = "pw".to_string();

        let state = AccountState::new(config.clone());
        assert!(state.is_bound());
        assert_eq!(state.config(), config);
    }

    #[test]
    fn test_counters() {
        let state = AccountState::new(AccountConfig::new("a1", vec![]));

        state.add_traffic(100);
        state.add_traffic(50);
        assert_eq!(state.bytes_transferred_period(), 150);
        assert_eq!(state.bytes_transferred_total(), 150);

        state.reset_period();
        state.add_traffic(10);
        assert_eq!(state.bytes_transferred_period(), 10);
        assert_eq!(state.bytes_transferred_total(), 160);
    }

    #[test]
    fn test_counters_saturate() {
        let state = AccountState::new(AccountConfig::new("a1", vec![]));

        state.add_traffic(u64::MAX);
        state.add_traffic(2);
        assert_eq!(state.bytes_transferred_period(), u64::MAX);
        assert_eq!(state.bytes_transferred_total(), u64::MAX);

        state.reset_period();
        state.add_traffic(5);
        assert_eq!(state.bytes_transferred_period(), 5);
        assert_eq!(state.bytes_transferred_total(), u64::MAX);
    }

    #[test]
    fn test_owns_subdomain() {
        let state = AccountState::new(AccountConfig::new(
            "a1",
            vec!["a1.example".to_string(), "api.a1.example".to_string()],
        ));

        assert!(state.owns_subdomain("api.a1.example"));
        assert!(!state.owns_subdomain("a2.example"));
    }
}
