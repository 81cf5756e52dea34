//! Admission control
//!
//! Decides whether a tunnel login is allowed, pairs unbound accounts with
//! their first secret, and provisions new accounts. Changes to persisted
//! fields are written to the store before they become visible in the
//! registry, so a failed write leaves memory exactly as it was.

use crate::account::AccountHandle;
use crate::{AdmissionError, ProvisionError, RegistryError, UserRegistry};
use broker_proto::{AccountConfig, DEFAULT_QUOTA_LIMIT};
use broker_store::AccountStore;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default interval between period counter resets (24 hours)
pub const DEFAULT_RESET_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Admission settings
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Logins are refused once an account's period counter exceeds this
    pub quota_limit: u64,
    /// How often period counters are zeroed
    pub reset_interval: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            quota_limit: DEFAULT_QUOTA_LIMIT,
            reset_interval: DEFAULT_RESET_INTERVAL,
        }
    }
}

impl AdmissionConfig {
    pub fn with_quota_limit(mut self, bytes: u64) -> Self {
        self.quota_limit = bytes;
        self
    }

    pub fn with_reset_interval(mut self, interval: Duration) -> Self {
        self.reset_interval = interval;
        self
    }
}

enum BindOutcome {
    Bound,
    AlreadyBound,
}

/// Front door to the registry for logins, provisioning and traffic
pub struct AdmissionController {
    registry: Arc<UserRegistry>,
    store: Arc<dyn AccountStore>,
    config: AdmissionConfig,
    /// Serializes store-then-publish sequences (provision and bind)
    commit: Mutex<()>,
}

impl AdmissionController {
    pub fn new(
        registry: Arc<UserRegistry>,
        store: Arc<dyn AccountStore>,
        config: AdmissionConfig,
    ) -> Self {
        Self {
            registry,
            store,
            config,
            commit: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<UserRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Validate, persist and register a new account
    pub fn provision(&self, config: AccountConfig) -> Result<AccountHandle, ProvisionError> {
        let _commit = self.commit.lock().unwrap_or_else(PoisonError::into_inner);

        self.registry.check_available(&config)?;
        self.store.save(&config)?;
        let account = self.registry.create(config)?;

        info!(
            account_id = %account.account_id(),
            subdomains = ?account.subdomains(),
            "Provisioned account"
        );
        Ok(account)
    }

    /// Evaluate a tunnel login
    ///
    /// In order: resolve the account; bind it if unbound (and succeed);
    /// otherwise compare the secret; then check the period quota.
    pub fn login(&self, account_id: &str, secret: &str) -> Result<AccountHandle, AdmissionError> {
        let account = self.registry.lookup_by_id(account_id).ok_or_else(|| {
            debug!(account_id, "Login for unknown account");
            AdmissionError::UnknownAccount
        })?;

        if !account.is_bound() {
            match self.bind(&account, secret)? {
                BindOutcome::Bound => return Ok(account),
                // Another login bound it first; judge this one against that secret
                BindOutcome::AlreadyBound => {}
            }
        }

        if !account.secret_matches(secret) {
            debug!(account_id, "Login rejected: secret mismatch");
            return Err(AdmissionError::AuthRejected);
        }

        let used = account.bytes_transferred_period();
        if used > self.config.quota_limit {
            debug!(
                account_id,
                used,
                limit = self.config.quota_limit,
                "Login rejected: quota exceeded"
            );
            return Err(AdmissionError::QuotaExceeded);
        }

        Ok(account)
    }

    /// Attribute `bytes` of tunnel traffic to an account
    pub fn record_traffic(&self, account: &AccountHandle, bytes: u64) {
        account.add_traffic(bytes);
    }

    /// Zero every period counter
    pub fn reset_period_counters(&self) {
        self.registry.reset_all_period_counters();
    }

    fn bind(&self, account: &AccountHandle, secret: &str) -> Result<BindOutcome, AdmissionError> {
        if secret.is_empty() {
            debug!(account_id = %account.account_id(), "Refusing to bind an empty secret");
            return Err(AdmissionError::AuthRejected);
        }

        let _commit = self.commit.lock().unwrap_or_else(PoisonError::into_inner);
        if account.is_bound() {
            return Ok(BindOutcome::AlreadyBound);
        }

        let mut bound = account.config();
        bound.bound_secret = secret.to_string();
        self.store.save(&bound).map_err(|e| {
            warn!(account_id = %account.account_id(), error = %e, "Failed to persist bind");
            e
        })?;

        match self.registry.bind(account.account_id(), secret) {
            Ok(_) => {
                info!(account_id = %account.account_id(), "Bound account on first login");
                Ok(BindOutcome::Bound)
            }
            Err(RegistryError::AlreadyBound(_)) => Ok(BindOutcome::AlreadyBound),
            Err(_) => Err(AdmissionError::UnknownAccount),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_store::MemoryAccountStore;

    fn create_test_controller() -> (AdmissionController, Arc<MemoryAccountStore>) {
        let store = Arc::new(MemoryAccountStore::new());
        let controller = AdmissionController::new(
            Arc::new(UserRegistry::new()),
            store.clone(),
            AdmissionConfig::default(),
        );
        (controller, store)
    }

    fn account(id: &str, subdomains: &[&str]) -> AccountConfig {
        AccountConfig::new(id, subdomains.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_default_config() {
        let config = AdmissionConfig::default();
        assert_eq!(config.quota_limit, 1024 * 1024 * 1024);
        assert_eq!(config.reset_interval, Duration::from_secs(86_400));
    }

    #[test]
    fn test_provision_persists_and_registers() {
        let (controller, store) = create_test_controller();

        controller.provision(account("a1", &["a1.example"])).unwrap();

        assert_eq!(store.get("a1"), Some(account("a1", &["a1.example"])));
        assert!(controller.registry().lookup_by_subdomain("a1.example").is_some());
    }

    #[test]
    fn test_provision_conflict_does_not_write() {
        let (controller, store) = create_test_controller();
        controller.provision(account("a1", &["a1.example"])).unwrap();

        let err = controller
            .provision(account("a2", &["a1.example"]))
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.save_count(), 1);
        assert!(store.get("a2").is_none());
    }

    #[test]
    fn test_provision_store_failure_leaves_registry_untouched() {
        let (controller, store) = create_test_controller();
        store.set_fail_writes(true);

        let err = controller
            .provision(account("a1", &["a1.example"]))
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Storage(_)));
        assert!(!err.is_conflict());
        assert!(controller.registry().lookup_by_id("a1").is_none());
        assert!(controller.registry().lookup_by_subdomain("a1.example").is_none());

        // The id is still free once the store recovers
        store.set_fail_writes(false);
        controller.provision(account("a1", &["a1.example"])).unwrap();
    }

    #[test]
    fn test_unknown_account() {
        let (controller, _store) = create_test_controller();
        assert!(matches!(
            controller.login("ghost", "pw"),
            Err(AdmissionError::UnknownAccount)
        ));
    }

    #[test]
    fn test_bind_is_persisted_before_success() {
        let (controller, store) = create_test_controller();
        controller.provision(account("a1", &["a1.example"])).unwrap();

        controller.login("a1", "pw1").unwrap();
        assert_eq!(store.get("a1").unwrap().bound_secret, "pw1");
    }

    #[test]
    fn test_bind_store_failure_keeps_account_unbound() {
        let (controller, store) = create_test_controller();
        controller.provision(account("a1", &[])).unwrap();
        store.set_fail_writes(true);

        assert!(matches!(
            controller.login("a1", "pw1"),
            Err(AdmissionError::Storage(_))
        ));
        let state = controller.registry().lookup_by_id("a1").unwrap();
        assert!(!state.is_bound());

        // A later attempt may still bind, with whatever secret it brings
        store.set_fail_writes(false);
        controller.login("a1", "pw2").unwrap();
        assert_eq!(state.config().bound_secret, "pw2");
    }

    #[test]
    fn test_empty_secret_never_binds() {
        let (controller, store) = create_test_controller();
        controller.provision(account("a1", &[])).unwrap();

        assert!(matches!(
            controller.login("a1", ""),
            Err(AdmissionError::AuthRejected)
        ));
        assert!(!controller.registry().lookup_by_id("a1").unwrap().is_bound());
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn test_bind_skips_quota_check() {
        let (controller, _store) = create_test_controller();
        let handle = controller.provision(account("a1", &[])).unwrap();
        controller.record_traffic(&handle, 2 * DEFAULT_QUOTA_LIMIT);

        // The binding login succeeds regardless of usage
        controller.login("a1", "pw").unwrap();
        assert!(matches!(
            controller.login("a1", "pw"),
            Err(AdmissionError::QuotaExceeded)
        ));
    }

    #[test]
    fn test_quota_boundary() {
        let store = Arc::new(MemoryAccountStore::new());
        let controller = AdmissionController::new(
            Arc::new(UserRegistry::new()),
            store,
            AdmissionConfig::default().with_quota_limit(1000),
        );
        let handle = controller.provision(account("a1", &[])).unwrap();
        controller.login("a1", "pw").unwrap();

        controller.record_traffic(&handle, 1000);
        assert!(controller.login("a1", "pw").is_ok());

        controller.record_traffic(&handle, 1);
        assert!(matches!(
            controller.login("a1", "pw"),
            Err(AdmissionError::QuotaExceeded)
        ));
    }

    #[test]
    fn test_huge_traffic_stays_over_quota() {
        let (controller, _store) = create_test_controller();
        let handle = controller.provision(account("a1", &[])).unwrap();
        controller.login("a1", "pw").unwrap();

        controller.record_traffic(&handle, u64::MAX);
        controller.record_traffic(&handle, 2);

        assert_eq!(handle.bytes_transferred_total(), u64::MAX);
        assert!(matches!(
            controller.login("a1", "pw"),
            Err(AdmissionError::QuotaExceeded)
        ));
    }

    #[test]
    fn test_wrong_secret_wins_over_quota() {
        let (controller, _store) = create_test_controller();
        let handle = controller.provision(account("a1", &[])).unwrap();
        controller.login("a1", "pw").unwrap();
        controller.record_traffic(&handle, 2 * DEFAULT_QUOTA_LIMIT);

        assert!(matches!(
            controller.login("a1", "nope"),
            Err(AdmissionError::AuthRejected)
        ));
    }

    #[test]
    fn test_record_traffic_updates_both_counters() {
        let (controller, _store) = create_test_controller();
        let handle = controller.provision(account("a1", &[])).unwrap();

        controller.record_traffic(&handle, 300);
        controller.reset_period_counters();
        controller.record_traffic(&handle, 200);

        assert_eq!(handle.bytes_transferred_period(), 200);
        assert_eq!(handle.bytes_transferred_total(), 500);
    }
}
