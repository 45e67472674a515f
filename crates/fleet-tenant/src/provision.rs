//! Resource provisioning
//!
//! The canonical gate-then-mutate-then-reconcile sequence for countable
//! resources (users, sites, domains). Remote exit nodes go through the
//! enrollment protocol instead.

use crate::admission::AdmissionControl;
use crate::ledger::UsageLedger;
use fleet_common::{Feature, FleetError, FleetResult, TenantId};
use fleet_store::MemStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Creates and removes countable tenant resources under admission
/// control, reconciling the usage ledger after every commit.
#[derive(Clone)]
pub struct Provisioner {
    store: Arc<MemStore>,
    ledger: UsageLedger,
}

impl Provisioner {
    pub fn new(store: Arc<MemStore>) -> Self {
        let ledger = UsageLedger::new(store.clone());
        Self { store, ledger }
    }

    /// Create a resource of `feature` for the tenant.
    ///
    /// The admission check and the insert run in one transaction, so a
    /// rejection leaves no partial state. Reconciliation happens after
    /// commit; its failure is logged, never surfaced.
    pub fn create(&self, tenant: &TenantId, feature: Feature, resource_id: &str) -> FleetResult<()> {
        if feature == Feature::RemoteExitNodes {
            return Err(FleetError::validation(
                "feature",
                "remote exit nodes are provisioned via enrollment",
            ));
        }
        if resource_id.is_empty() {
            return Err(FleetError::validation("resource_id", "cannot be empty"));
        }

        self.store.transaction(|txn| {
            let current = txn.usage_counter(tenant, feature).unwrap_or(0);
            if AdmissionControl::check_limit_in(txn, tenant, feature, current + 1) {
                return Err(FleetError::AdmissionRejected { feature });
            }
            txn.insert_resource(tenant, feature, resource_id)?;
            Ok(())
        })?;

        info!(tenant = %tenant, feature = %feature, resource_id, "resource created");
        self.reconcile_after_commit(tenant, feature);
        Ok(())
    }

    /// Remove a resource. Missing rows are `NotFound`.
    pub fn remove(&self, tenant: &TenantId, feature: Feature, resource_id: &str) -> FleetResult<()> {
        self.store.transaction(|txn| {
            txn.remove_resource(tenant, feature, resource_id)?;
            Ok::<_, FleetError>(())
        })?;

        info!(tenant = %tenant, feature = %feature, resource_id, "resource removed");
        self.reconcile_after_commit(tenant, feature);
        Ok(())
    }

    fn reconcile_after_commit(&self, tenant: &TenantId, feature: Feature) {
        if let Err(err) = self.ledger.reconcile(tenant, feature) {
            // Transient undercount; heals on the next mutation.
            warn!(tenant = %tenant, feature = %feature, %err, "post-commit reconciliation failed");
        }
    }
}
