//! Startup replay of persisted accounts

use crate::UserRegistry;
use broker_store::AccountStore;
use tracing::{info, warn};

/// Outcome of replaying the store into a registry
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Accounts now in the registry
    pub loaded: usize,
    /// Records that could not be decoded or sat under the wrong key
    pub corrupt: usize,
    /// Records the store failed to produce at all
    pub unreadable: usize,
    /// Records refused by the registry (duplicate id or subdomain, invalid)
    pub conflicts: usize,
}

impl LoadReport {
    pub fn skipped(&self) -> usize {
        self.corrupt + self.unreadable + self.conflicts
    }
}

/// Feed every stored account into `registry`
///
/// Bad records are logged and skipped; the scan always runs to the end.
pub fn load_registry(registry: &UserRegistry, store: &dyn AccountStore) -> LoadReport {
    let mut report = LoadReport::default();

    for record in store.load_all() {
        let account = match record {
            Ok(account) => account,
            Err(e) if e.is_record_error() => {
                warn!(error = %e, "Skipping corrupt account record");
                report.corrupt += 1;
                continue;
            }
            Err(e) => {
                warn!(error = %e, "Skipping unreadable account record");
                report.unreadable += 1;
                continue;
            }
        };

        let account_id = account.account_id.clone();
        match registry.create(account) {
            Ok(_) => report.loaded += 1,
            Err(e) => {
                warn!(account_id = %account_id, error = %e, "Skipping conflicting account record");
                report.conflicts += 1;
            }
        }
    }

    info!(
        loaded = report.loaded,
        skipped = report.skipped(),
        "Loaded accounts from store"
    );
    report
}
