//! Shared domain types for the OpenFleet admission and enrollment core.
//!
//! Everything here is transport-agnostic: the metered feature set, the
//! validated identifier newtypes, the usage/limit records and the error
//! taxonomy that the HTTP layer maps onto status codes.

pub mod error;
pub mod feature;
pub mod model;

pub use error::{FleetError, FleetResult};
pub use feature::Feature;
pub use model::{
    ExitNodeId, LimitConfiguration, RemoteNodeId, TenantId, UsageCounter, REMOTE_NODE_ID_LEN,
};
