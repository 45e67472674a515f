//! Subscription tier defaults
//!
//! Write path of the external tier resolver: per-feature default limit
//! rows for each tier. This core otherwise only reads limits.

use fleet_common::{Feature, FleetResult, LimitConfiguration, TenantId};
use fleet_store::{MemStore, StoreError};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Starter,
    Business,
    Enterprise,
}

impl SubscriptionTier {
    /// Default limit rows for this tier.
    ///
    /// Enterprise disables enforcement via the override flag rather
    /// than sentinel maxima.
    pub fn limits_for(&self, tenant: &TenantId) -> Vec<LimitConfiguration> {
        let row = |feature: Feature, maximum: i64, override_enabled: bool| LimitConfiguration {
            tenant_id: tenant.clone(),
            feature,
            maximum,
            override_enabled,
        };
        match self {
            Self::Starter => vec![
                row(Feature::Users, 50, false),
                row(Feature::Sites, 5, false),
                row(Feature::Domains, 3, false),
                row(Feature::RemoteExitNodes, 1, false),
            ],
            Self::Business => vec![
                row(Feature::Users, 500, false),
                row(Feature::Sites, 50, false),
                row(Feature::Domains, 20, false),
                row(Feature::RemoteExitNodes, 10, false),
            ],
            Self::Enterprise => Feature::ALL
                .into_iter()
                .map(|feature| row(feature, 0, true))
                .collect(),
        }
    }
}

/// Write the tier's default limit rows for a tenant in one transaction.
pub fn apply_tier(store: &MemStore, tenant: &TenantId, tier: SubscriptionTier) -> FleetResult<()> {
    store.transaction(|txn| {
        for config in tier.limits_for(tenant) {
            txn.put_limit(config);
        }
        Ok::<_, StoreError>(())
    })?;
    info!(tenant = %tenant, ?tier, "tier limits applied");
    Ok(())
}
