//! Account registry
//!
//! Two indexes over the same accounts: by account id and by subdomain.
//! Index mutations are serialized by a single reader-writer lock; the
//! registry itself never performs I/O.

use crate::account::{AccountHandle, AccountState};
use crate::RegistryError;
use broker_proto::{AccountConfig, AccountSnapshot};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};

#[derive(Default)]
struct Indexes {
    by_id: HashMap<String, AccountHandle>,
    by_subdomain: HashMap<String, AccountHandle>,
}

impl Indexes {
    fn check_available(&self, config: &AccountConfig) -> Result<(), RegistryError> {
        config.validate()?;

        if self.by_id.contains_key(&config.account_id) {
            return Err(RegistryError::AlreadyExists(config.account_id.clone()));
        }

        if let Some(taken) = config
            .subdomains
            .iter()
            .find(|s| self.by_subdomain.contains_key(s.as_str()))
        {
            return Err(RegistryError::SubdomainTaken(taken.clone()));
        }

        Ok(())
    }
}

/// In-memory index of every known account
///
/// Invariants held after every mutation:
/// - an account id maps to at most one account
/// - a subdomain maps to at most one account, and that account lists it
/// - a bound secret never changes
#[derive(Default)]
pub struct UserRegistry {
    indexes: RwLock<Indexes>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new account in both indexes
    ///
    /// All-or-nothing: if the id or any subdomain is already taken nothing
    /// is inserted.
    pub fn create(&self, config: AccountConfig) -> Result<AccountHandle, RegistryError> {
        let mut indexes = self.write();
        indexes.check_available(&config)?;

        let account = Arc::new(AccountState::new(config));
        for subdomain in account.subdomains() {
            indexes
                .by_subdomain
                .insert(subdomain.clone(), account.clone());
        }
        indexes
            .by_id
            .insert(account.account_id().to_string(), account.clone());

        debug!(
            account_id = %account.account_id(),
            subdomains = account.subdomains().len(),
            "Registered account"
        );
        Ok(account)
    }

    /// Would [`UserRegistry::create`] accept this configuration right now?
    pub fn check_available(&self, config: &AccountConfig) -> Result<(), RegistryError> {
        self.read().check_available(config)
    }

    /// Pair an unbound account with `secret`
    ///
    /// Memory only; callers persist the bound configuration first.
    pub fn bind(&self, account_id: &str, secret: &str) -> Result<AccountHandle, RegistryError> {
        let indexes = self.write();
        let account = indexes
            .by_id
            .get(account_id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownAccount(account_id.to_string()))?;

        if !account.bind(secret.to_string()) {
            return Err(RegistryError::AlreadyBound(account_id.to_string()));
        }

        trace!(account_id, "Bound account secret");
        Ok(account)
    }

    pub fn lookup_by_id(&self, account_id: &str) -> Option<AccountHandle> {
        self.read().by_id.get(account_id).cloned()
    }

    pub fn lookup_by_subdomain(&self, name: &str) -> Option<AccountHandle> {
        self.read().by_subdomain.get(name).cloned()
    }

    /// Copies of every account configuration, ordered by account id
    pub fn list_all(&self) -> Vec<AccountConfig> {
        let mut configs: Vec<AccountConfig> =
            self.read().by_id.values().map(|a| a.config()).collect();
        configs.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        configs
    }

    /// Configurations plus traffic counters, ordered by account id
    pub fn snapshot_all(&self) -> Vec<AccountSnapshot> {
        let mut snapshots: Vec<AccountSnapshot> =
            self.read().by_id.values().map(|a| a.snapshot()).collect();
        snapshots.sort_by(|a, b| a.config.account_id.cmp(&b.config.account_id));
        snapshots
    }

    /// Zero every account's period counter; lifetime totals are untouched
    pub fn reset_all_period_counters(&self) {
        let indexes = self.read();
        for account in indexes.by_id.values() {
            account.reset_period();
        }
    }

    pub fn len(&self) -> usize {
        self.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, Indexes> {
        self.indexes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Indexes> {
        self.indexes.write().unwrap_or_else(PoisonError::into_inner)
    }
}
