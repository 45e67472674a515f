//! Notification channel
//!
//! Best-effort push to a connected agent. The core dispatches and
//! forgets; delivery failure is a log line, never a return value on the
//! request path.

use async_trait::async_trait;
use fleet_common::{RemoteNodeId, TenantId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message pushed to a node's live connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum NodeMessage {
    /// The node's membership in a tenant was removed.
    Terminated { tenant_id: TenantId },
}

/// Notification delivery errors.
#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    #[error("no live connection for {0}")]
    NotConnected(RemoteNodeId),

    #[error("channel failure: {0}")]
    Channel(String),
}

/// Fire-and-forget push channel to worker agents.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, subject: &RemoteNodeId, message: NodeMessage) -> Result<(), NotifyError>;
}

/// Channel that drops every message. Production default when no agent
/// transport is wired up.
#[derive(Debug, Default)]
pub struct NullChannel;

#[async_trait]
impl NotificationChannel for NullChannel {
    async fn send(&self, _subject: &RemoteNodeId, _message: NodeMessage) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Recording channel for tests.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    sent: Mutex<Vec<(RemoteNodeId, NodeMessage)>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(RemoteNodeId, NodeMessage)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl NotificationChannel for MemoryChannel {
    async fn send(&self, subject: &RemoteNodeId, message: NodeMessage) -> Result<(), NotifyError> {
        self.sent.lock().push((subject.clone(), message));
        Ok(())
    }
}
