//! Tenant resource accounting for the OpenFleet core.
//!
//! The usage ledger keeps per-(tenant, feature) counters as faithful
//! snapshots of the resource store, the admission control engine
//! answers accept/reject against configured limits before a mutation
//! commits, and the provisioner ties the two together for countable
//! resources.

pub mod admission;
pub mod ledger;
pub mod provision;
pub mod tiers;

pub use admission::AdmissionControl;
pub use ledger::UsageLedger;
pub use provision::Provisioner;
pub use tiers::{apply_tier, SubscriptionTier};
