//! Metered feature set
//!
//! The closed set of capabilities a tenant can be limited on. Fixed at
//! deploy time so admission sweeps stay exhaustiveness-checked.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A metered, limitable capability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Users,
    Sites,
    Domains,
    RemoteExitNodes,
}

impl Feature {
    /// Every metered feature, in sweep order.
    pub const ALL: [Feature; 4] = [
        Feature::Users,
        Feature::Sites,
        Feature::Domains,
        Feature::RemoteExitNodes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Sites => "sites",
            Self::Domains => "domains",
            Self::RemoteExitNodes => "remote_exit_nodes",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
