//! Session issuance
//!
//! External collaborator seam: the core only needs `mint`. Tokens are
//! opaque to everything in this crate.

use async_trait::async_trait;
use dashmap::DashMap;
use fleet_common::RemoteNodeId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Opaque session token bound to a remote node id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Session issuer errors.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Mints and stores opaque session tokens for authenticated nodes.
#[async_trait]
pub trait SessionIssuer: Send + Sync {
    async fn mint(&self, subject: &RemoteNodeId) -> Result<SessionToken, SessionError>;
}

/// In-memory issuer for tests and development.
#[derive(Debug, Default)]
pub struct MemorySessionIssuer {
    tokens: DashMap<String, RemoteNodeId>,
}

impl MemorySessionIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subject a token was minted for, if it exists.
    pub fn subject_for(&self, token: &SessionToken) -> Option<RemoteNodeId> {
        self.tokens.get(token.as_str()).map(|e| e.value().clone())
    }

    /// Number of live tokens minted for a subject.
    pub fn tokens_for(&self, subject: &RemoteNodeId) -> usize {
        self.tokens.iter().filter(|e| e.value() == subject).count()
    }
}

#[async_trait]
impl SessionIssuer for MemorySessionIssuer {
    async fn mint(&self, subject: &RemoteNodeId) -> Result<SessionToken, SessionError> {
        let token = SessionToken(Uuid::new_v4().to_string());
        self.tokens.insert(token.as_str().to_string(), subject.clone());
        Ok(token)
    }
}
