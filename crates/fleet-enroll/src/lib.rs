//! Fleet enrollment protocol for the OpenFleet core.
//!
//! Lets a remote exit node register itself into a tenant's fleet with a
//! shared-secret credential, obtain a scoped session, and have its
//! membership counted against the tenant's limits. Registration,
//! re-authentication and deregistration are idempotent under retries.

pub mod credentials;
pub mod enrollment;
pub mod notify;
pub mod pool;
pub mod session;

pub use enrollment::{EnrollmentRequest, EnrollmentResponse, EnrollmentService};
pub use notify::{MemoryChannel, NodeMessage, NotificationChannel, NotifyError, NullChannel};
pub use pool::AddressPool;
pub use session::{MemorySessionIssuer, SessionError, SessionIssuer, SessionToken};
