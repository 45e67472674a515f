//! Usage Ledger
//!
//! Counters are cached projections of the store, recomputed after every
//! mutation rather than incremented in place. A create that commits its
//! row but crashes before bumping a counter would drift forever under
//! the increment model; overwriting from a recount inside the same
//! transaction scope makes the counter a faithful snapshot as of that
//! commit, and self-healing on the next mutation after a crash.

use fleet_common::{Feature, FleetResult, TenantId, UsageCounter};
use fleet_store::{MemStore, StoreError, Txn};
use std::sync::Arc;
use tracing::debug;

/// Authoritative usage accounting for `(tenant, feature)` pairs.
#[derive(Clone)]
pub struct UsageLedger {
    store: Arc<MemStore>,
}

impl UsageLedger {
    pub fn new(store: Arc<MemStore>) -> Self {
        Self { store }
    }

    /// Current counter, or `None` if the feature was never provisioned
    /// for this tenant. Callers must treat absence distinctly from zero.
    pub fn get_usage(&self, tenant: &TenantId, feature: Feature) -> FleetResult<Option<UsageCounter>> {
        let value = self
            .store
            .transaction(|txn| Ok::<_, StoreError>(txn.usage_counter(tenant, feature)))?;
        Ok(value.map(|value| UsageCounter {
            tenant_id: tenant.clone(),
            feature,
            instantaneous_value: value,
        }))
    }

    /// Overwrite the counter with `live_count` inside the caller's
    /// transaction. Idempotent: repeated calls with the same count are
    /// no-ops in effect.
    pub fn reconcile_in(
        txn: &mut Txn,
        tenant: &TenantId,
        feature: Feature,
        live_count: i64,
    ) -> UsageCounter {
        txn.put_usage_counter(tenant, feature, live_count);
        UsageCounter {
            tenant_id: tenant.clone(),
            feature,
            instantaneous_value: live_count,
        }
    }

    /// Post-commit reconciliation: recount live rows for the feature
    /// and overwrite the counter, both inside one fresh transaction so
    /// the count and the write see the same snapshot.
    pub fn reconcile(&self, tenant: &TenantId, feature: Feature) -> FleetResult<UsageCounter> {
        let counter = self.store.transaction(|txn| {
            let live = txn.live_count(tenant, feature);
            Ok::<_, StoreError>(Self::reconcile_in(txn, tenant, feature, live))
        })?;
        debug!(
            tenant = %tenant,
            feature = %feature,
            value = counter.instantaneous_value,
            "usage reconciled"
        );
        Ok(counter)
    }
}
