//! Value objects and shared records
//!
//! Identifier newtypes are self-validating; a constructed id is always
//! well-formed.

use crate::error::FleetError;
use crate::feature::Feature;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Remote node ids are fixed-length so agents can embed them in config.
pub const REMOTE_NODE_ID_LEN: usize = 15;

/// Tenant (organization) identifier.
///
/// # Invariants
/// - Non-empty, max 64 characters
/// - Alphanumeric with hyphens/underscores
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    /// Create a tenant id with validation.
    pub fn new(id: impl Into<String>) -> Result<Self, FleetError> {
        let id = id.into();
        if id.is_empty() {
            return Err(FleetError::validation("tenant_id", "cannot be empty"));
        }
        if id.len() > 64 {
            return Err(FleetError::validation("tenant_id", "max 64 characters"));
        }
        if !id.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
            return Err(FleetError::validation("tenant_id", "alphanumeric only"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier a remote exit node enrolls under.
///
/// # Invariants
/// - Exactly 15 alphanumeric characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteNodeId(String);

impl RemoteNodeId {
    /// Create a remote node id with validation.
    pub fn new(id: impl Into<String>) -> Result<Self, FleetError> {
        let id = id.into();
        if id.len() != REMOTE_NODE_ID_LEN {
            return Err(FleetError::validation(
                "remote_node_id",
                "must be exactly 15 characters",
            ));
        }
        if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(FleetError::validation(
                "remote_node_id",
                "alphanumeric only",
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backing exit node record identifier, generated server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExitNodeId(Uuid);

impl ExitNodeId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ExitNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cached projection of a tenant's live resource count for one feature.
///
/// Only ever overwritten from a recount, never incremented in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    pub tenant_id: TenantId,
    pub feature: Feature,
    pub instantaneous_value: i64,
}

/// Configured limit for a `(tenant, feature)` pair.
///
/// Written by the external tier resolver, read-only to this core.
/// `override_enabled` disables enforcement regardless of `maximum`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitConfiguration {
    pub tenant_id: TenantId,
    pub feature: Feature,
    pub maximum: i64,
    pub override_enabled: bool,
}
