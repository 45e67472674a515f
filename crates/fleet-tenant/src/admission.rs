//! Admission Control Engine
//!
//! Pre-flight accept/reject against configured limits. The check runs
//! strictly before the mutating transaction commits, against a counter
//! that may be stale under concurrency; this is accepted soft-limit
//! policy, not a hard quota.

use fleet_common::{Feature, FleetResult, TenantId};
use fleet_store::{MemStore, StoreError, Txn};
use std::sync::Arc;
use tracing::debug;

/// Decides whether a hypothetical post-allocation usage value violates
/// the tenant's configured limits.
#[derive(Clone)]
pub struct AdmissionControl {
    store: Arc<MemStore>,
}

impl AdmissionControl {
    pub fn new(store: Arc<MemStore>) -> Self {
        Self { store }
    }

    /// Transaction-scoped check, for use inside the mutating
    /// transaction the decision gates. Returns `true` to reject.
    ///
    /// Absent limit row or an enabled override never rejects.
    pub fn check_limit_in(
        txn: &Txn,
        tenant: &TenantId,
        feature: Feature,
        hypothetical: i64,
    ) -> bool {
        match txn.limit(tenant, feature) {
            None => false,
            Some(config) if config.override_enabled => false,
            Some(config) => hypothetical > config.maximum,
        }
    }

    /// Standalone check against the current store state.
    pub fn check_limit(
        &self,
        tenant: &TenantId,
        feature: Feature,
        hypothetical: i64,
    ) -> FleetResult<bool> {
        let reject = self.store.transaction(|txn| {
            Ok::<_, StoreError>(Self::check_limit_in(txn, tenant, feature, hypothetical))
        })?;
        if reject {
            debug!(tenant = %tenant, feature = %feature, hypothetical, "admission rejected");
        }
        Ok(reject)
    }

    /// Coarse sweep: is *any* feature currently over its limit?
    ///
    /// Compares current counters to their maxima and short-circuits on
    /// the first violation. Used as a cheap admission gate on requests
    /// unrelated to any single feature.
    pub fn any_over_limit(&self, tenant: &TenantId) -> FleetResult<Option<Feature>> {
        let violation = self.store.transaction(|txn| {
            for feature in Feature::ALL {
                let Some(current) = txn.usage_counter(tenant, feature) else {
                    continue;
                };
                if Self::check_limit_in(txn, tenant, feature, current) {
                    return Ok::<_, StoreError>(Some(feature));
                }
            }
            Ok(None)
        })?;
        Ok(violation)
    }
}
