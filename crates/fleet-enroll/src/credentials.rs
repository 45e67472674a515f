//! Node credentials
//!
//! Secrets are hashed before storage and verified by hash comparison.
//! Generators cover the admin "create node" path, which hands the pair
//! to the agent out of band.

use fleet_common::{FleetError, RemoteNodeId, REMOTE_NODE_ID_LEN};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

/// Enrollment secrets are fixed-length opaque strings.
pub const SECRET_LEN: usize = 48;

/// SHA-256 hex digest of a secret.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify a presented secret against a stored hash.
pub fn verify_secret(secret: &str, stored_hash: &str) -> bool {
    hash_secret(secret) == stored_hash
}

/// Validate a presented secret's shape before touching any state.
pub fn validate_secret(secret: &str) -> Result<(), FleetError> {
    if secret.len() != SECRET_LEN {
        return Err(FleetError::validation(
            "secret",
            format!("must be exactly {SECRET_LEN} characters"),
        ));
    }
    Ok(())
}

/// Generate a fresh remote node id.
pub fn generate_node_id() -> RemoteNodeId {
    let id: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REMOTE_NODE_ID_LEN)
        .map(char::from)
        .collect();
    // Alphanumeric of the right length always validates.
    RemoteNodeId::new(id).expect("generated id is well-formed")
}

/// Generate a fresh enrollment secret.
pub fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}
