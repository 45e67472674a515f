//! Transactional in-memory store
//!
//! Transactions are serialized by a mutex: the closure mutates a clone
//! of the state, and the clone replaces the shared state only when the
//! closure returns `Ok`. Any `Err` drops the clone, so a failed
//! transaction never leaves partial state.

use crate::entities::{ExitNode, ExitNodeOrgMembership, RemoteExitNodeCredential};
use fleet_common::{ExitNodeId, Feature, FleetError, LimitConfiguration, RemoteNodeId, TenantId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use thiserror::Error;

/// Store errors.
///
/// Unique-constraint violations surface as `Duplicate` so callers can
/// reclassify them into a domain-level "already exists".
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for FleetError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(key) => FleetError::Conflict(key),
            StoreError::NotFound(what) => FleetError::NotFound(what),
            StoreError::Storage(reason) => FleetError::Internal(reason),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct State {
    usage: HashMap<(TenantId, Feature), i64>,
    limits: HashMap<(TenantId, Feature), LimitConfiguration>,
    nodes: HashMap<ExitNodeId, ExitNode>,
    credentials: HashMap<RemoteNodeId, RemoteExitNodeCredential>,
    memberships: HashMap<(ExitNodeId, TenantId), ExitNodeOrgMembership>,
    resources: HashMap<(TenantId, Feature), HashSet<String>>,
}

/// In-memory resource store.
#[derive(Debug, Default)]
pub struct MemStore {
    state: Mutex<State>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` inside a transaction.
    ///
    /// The closure sees a consistent snapshot of the whole store and
    /// its writes become visible atomically on commit. Returning any
    /// error rolls the transaction back.
    pub fn transaction<T, E>(&self, f: impl FnOnce(&mut Txn) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut guard = self.state.lock();
        let mut txn = Txn {
            state: guard.clone(),
        };
        let out = f(&mut txn)?;
        *guard = txn.state;
        Ok(out)
    }
}

/// An open transaction over a snapshot of the store.
pub struct Txn {
    state: State,
}

impl Txn {
    // --- usage counters ---

    /// Counter value, if the feature was ever provisioned. Absence is
    /// distinct from zero.
    pub fn usage_counter(&self, tenant: &TenantId, feature: Feature) -> Option<i64> {
        self.state.usage.get(&(tenant.clone(), feature)).copied()
    }

    /// Overwrite the counter (upsert).
    pub fn put_usage_counter(&mut self, tenant: &TenantId, feature: Feature, value: i64) {
        self.state.usage.insert((tenant.clone(), feature), value);
    }

    // --- limit configurations ---

    pub fn limit(&self, tenant: &TenantId, feature: Feature) -> Option<LimitConfiguration> {
        self.state.limits.get(&(tenant.clone(), feature)).cloned()
    }

    pub fn put_limit(&mut self, config: LimitConfiguration) {
        self.state
            .limits
            .insert((config.tenant_id.clone(), config.feature), config);
    }

    // --- credentials ---

    pub fn credential(&self, node_id: &RemoteNodeId) -> Option<RemoteExitNodeCredential> {
        self.state.credentials.get(node_id).cloned()
    }

    pub fn insert_credential(&mut self, cred: RemoteExitNodeCredential) -> Result<(), StoreError> {
        if self.state.credentials.contains_key(&cred.remote_node_id) {
            return Err(StoreError::Duplicate(format!(
                "credential {}",
                cred.remote_node_id
            )));
        }
        self.state.credentials.insert(cred.remote_node_id.clone(), cred);
        Ok(())
    }

    pub fn delete_credential(&mut self, node_id: &RemoteNodeId) -> Result<(), StoreError> {
        self.state
            .credentials
            .remove(node_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("credential {node_id}")))
    }

    // --- exit nodes ---

    pub fn node(&self, id: &ExitNodeId) -> Option<ExitNode> {
        self.state.nodes.get(id).cloned()
    }

    pub fn insert_node(&mut self, node: ExitNode) -> Result<(), StoreError> {
        if self.state.nodes.contains_key(&node.id) {
            return Err(StoreError::Duplicate(format!("exit node {}", node.id)));
        }
        self.state.nodes.insert(node.id, node);
        Ok(())
    }

    /// Overwrite an existing node row.
    pub fn update_node(&mut self, node: ExitNode) -> Result<(), StoreError> {
        if !self.state.nodes.contains_key(&node.id) {
            return Err(StoreError::NotFound(format!("exit node {}", node.id)));
        }
        self.state.nodes.insert(node.id, node);
        Ok(())
    }

    pub fn delete_node(&mut self, id: &ExitNodeId) -> Result<(), StoreError> {
        self.state
            .nodes
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("exit node {id}")))
    }

    /// Addresses currently held by any node. Used by the address pool.
    pub fn addresses_in_use(&self) -> HashSet<Ipv4Addr> {
        self.state.nodes.values().map(|n| n.address).collect()
    }

    // --- memberships ---

    pub fn membership_exists(&self, node: &ExitNodeId, tenant: &TenantId) -> bool {
        self.state
            .memberships
            .contains_key(&(*node, tenant.clone()))
    }

    pub fn insert_membership(&mut self, m: ExitNodeOrgMembership) -> Result<(), StoreError> {
        let key = (m.exit_node_id, m.tenant_id.clone());
        if self.state.memberships.contains_key(&key) {
            return Err(StoreError::Duplicate(format!(
                "membership ({}, {})",
                m.exit_node_id, m.tenant_id
            )));
        }
        self.state.memberships.insert(key, m);
        Ok(())
    }

    pub fn delete_membership(
        &mut self,
        node: &ExitNodeId,
        tenant: &TenantId,
    ) -> Result<(), StoreError> {
        self.state
            .memberships
            .remove(&(*node, tenant.clone()))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("membership ({node}, {tenant})")))
    }

    /// Memberships left on a node, across all tenants.
    pub fn node_membership_count(&self, node: &ExitNodeId) -> i64 {
        self.state
            .memberships
            .keys()
            .filter(|(n, _)| n == node)
            .count() as i64
    }

    /// Exit node memberships held by a tenant.
    pub fn tenant_node_count(&self, tenant: &TenantId) -> i64 {
        self.state
            .memberships
            .keys()
            .filter(|(_, t)| t == tenant)
            .count() as i64
    }

    // --- provisioned resources (users, sites, domains, ...) ---

    pub fn insert_resource(
        &mut self,
        tenant: &TenantId,
        feature: Feature,
        resource_id: &str,
    ) -> Result<(), StoreError> {
        let set = self
            .state
            .resources
            .entry((tenant.clone(), feature))
            .or_default();
        if !set.insert(resource_id.to_string()) {
            return Err(StoreError::Duplicate(format!("{feature} {resource_id}")));
        }
        Ok(())
    }

    pub fn remove_resource(
        &mut self,
        tenant: &TenantId,
        feature: Feature,
        resource_id: &str,
    ) -> Result<(), StoreError> {
        let removed = self
            .state
            .resources
            .get_mut(&(tenant.clone(), feature))
            .map(|set| set.remove(resource_id))
            .unwrap_or(false);
        if !removed {
            return Err(StoreError::NotFound(format!("{feature} {resource_id}")));
        }
        Ok(())
    }

    /// Count of live resources of `feature` owned by the tenant, as of
    /// this transaction's snapshot. This is the ground truth counters
    /// are reconciled against.
    pub fn live_count(&self, tenant: &TenantId, feature: Feature) -> i64 {
        match feature {
            Feature::RemoteExitNodes => self.tenant_node_count(tenant),
            _ => self
                .state
                .resources
                .get(&(tenant.clone(), feature))
                .map(|set| set.len() as i64)
                .unwrap_or(0),
        }
    }
}
