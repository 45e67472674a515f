//! Store entities
//!
//! Row types for the fleet tables. Lifecycle rules live in the
//! services; the store only enforces key uniqueness.

use chrono::{DateTime, Utc};
use fleet_common::{ExitNodeId, RemoteNodeId, TenantId};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Exit node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitNodeKind {
    Gateway,
    RemoteExitNode,
}

/// A network egress node.
///
/// Created lazily on first successful enrollment; endpoint and public
/// key stay empty until the node publishes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitNode {
    pub id: ExitNodeId,
    pub address: Ipv4Addr,
    pub endpoint: Option<String>,
    pub public_key: Option<String>,
    pub online: bool,
    pub kind: ExitNodeKind,
}

impl ExitNode {
    /// New remote exit node with a pool-assigned address.
    pub fn remote(id: ExitNodeId, address: Ipv4Addr) -> Self {
        Self {
            id,
            address,
            endpoint: None,
            public_key: None,
            online: false,
            kind: ExitNodeKind::RemoteExitNode,
        }
    }
}

/// Shared-secret credential for a remote exit node.
///
/// Only the hash of the secret is ever stored. One-to-one with at most
/// one `ExitNode` via `exit_node_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteExitNodeCredential {
    pub remote_node_id: RemoteNodeId,
    pub secret_hash: String,
    pub exit_node_id: ExitNodeId,
}

/// Join row granting a tenant use of an exit node.
///
/// `(exit_node_id, tenant_id)` is unique; a node with zero memberships
/// is orphaned and garbage-collected with its credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitNodeOrgMembership {
    pub exit_node_id: ExitNodeId,
    pub tenant_id: TenantId,
    pub created_at: DateTime<Utc>,
}

impl ExitNodeOrgMembership {
    pub fn new(exit_node_id: ExitNodeId, tenant_id: TenantId) -> Self {
        Self {
            exit_node_id,
            tenant_id,
            created_at: Utc::now(),
        }
    }
}
