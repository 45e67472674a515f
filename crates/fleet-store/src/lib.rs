//! Resource store for the OpenFleet core.
//!
//! Holds the authoritative tables for usage counters, limit
//! configurations, exit nodes, credentials and memberships, behind a
//! transactional API: a closure runs against a snapshot of the whole
//! state, commits atomically on `Ok` and rolls back on `Err`. A
//! SQL-backed store would implement the same `transaction`/`Txn` shape.

pub mod entities;
pub mod mem;

pub use entities::{ExitNode, ExitNodeKind, ExitNodeOrgMembership, RemoteExitNodeCredential};
pub use mem::{MemStore, StoreError, Txn};
