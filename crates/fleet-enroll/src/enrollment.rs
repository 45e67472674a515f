//! Enrollment protocol
//!
//! Register-or-reauthenticate for remote exit nodes. All state for one
//! request commits in a single transaction; the admission gate runs
//! inside that transaction so a rejection leaves nothing behind.
//! Ledger reconciliation and the termination push happen after commit
//! and never fail the caller.

use crate::credentials::{hash_secret, validate_secret, verify_secret};
use crate::notify::{NodeMessage, NotificationChannel};
use crate::pool::AddressPool;
use crate::session::{SessionIssuer, SessionToken};
use fleet_common::{ExitNodeId, Feature, FleetError, FleetResult, RemoteNodeId, TenantId};
use fleet_store::{ExitNode, ExitNodeOrgMembership, MemStore, RemoteExitNodeCredential, Txn};
use fleet_tenant::{AdmissionControl, UsageLedger};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Enrollment request, tenant identified out of band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentRequest {
    pub remote_node_id: String,
    pub secret: String,
}

/// Successful enrollment: the credential pair echoed back plus a fresh
/// session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentResponse {
    pub remote_node_id: RemoteNodeId,
    pub secret: String,
    pub token: SessionToken,
}

/// The register/re-authenticate flow for remote exit nodes.
pub struct EnrollmentService {
    store: Arc<MemStore>,
    ledger: UsageLedger,
    sessions: Arc<dyn SessionIssuer>,
    notifier: Arc<dyn NotificationChannel>,
    pool: AddressPool,
}

impl EnrollmentService {
    pub fn new(
        store: Arc<MemStore>,
        sessions: Arc<dyn SessionIssuer>,
        notifier: Arc<dyn NotificationChannel>,
        pool: AddressPool,
    ) -> Self {
        let ledger = UsageLedger::new(store.clone());
        Self {
            store,
            ledger,
            sessions,
            notifier,
            pool,
        }
    }

    /// Enroll a node into a tenant's fleet.
    ///
    /// First-ever enrollment creates the node record (pool address),
    /// its credential and the tenant membership in one transaction.
    /// Re-enrollment verifies the secret, reuses the backing node and
    /// adds the membership if missing; an existing membership is
    /// accepted idempotently. Either way a fresh session token is
    /// minted after commit.
    pub async fn enroll(
        &self,
        tenant: &TenantId,
        request: EnrollmentRequest,
    ) -> FleetResult<EnrollmentResponse> {
        let node_id = RemoteNodeId::new(request.remote_node_id)?;
        validate_secret(&request.secret)?;
        let secret = request.secret;

        let registered = self.store.transaction(|txn| {
            match txn.credential(&node_id) {
                Some(cred) => {
                    if !verify_secret(&secret, &cred.secret_hash) {
                        return Err(FleetError::Authentication);
                    }
                    if txn.membership_exists(&cred.exit_node_id, tenant) {
                        // Repeat enrollment into the same tenant: no-op.
                        return Ok(false);
                    }
                    Self::gate_membership(txn, tenant)?;
                    txn.insert_membership(ExitNodeOrgMembership::new(
                        cred.exit_node_id,
                        tenant.clone(),
                    ))?;
                    Ok(false)
                }
                None => {
                    Self::gate_membership(txn, tenant)?;
                    let address = self.pool.allocate(&txn.addresses_in_use())?;
                    let exit_node_id = ExitNodeId::generate();
                    txn.insert_node(ExitNode::remote(exit_node_id, address))?;
                    txn.insert_credential(RemoteExitNodeCredential {
                        remote_node_id: node_id.clone(),
                        secret_hash: hash_secret(&secret),
                        exit_node_id,
                    })?;
                    txn.insert_membership(ExitNodeOrgMembership::new(
                        exit_node_id,
                        tenant.clone(),
                    ))?;
                    Ok(true)
                }
            }
        })?;

        info!(tenant = %tenant, node = %node_id, registered, "node enrolled");
        self.reconcile_after_commit(tenant);

        // Mint failure keeps the enrollment; the node retries auth.
        let token = self.sessions.mint(&node_id).await.map_err(|err| {
            warn!(node = %node_id, %err, "session mint failed after enrollment");
            FleetError::Internal(err.to_string())
        })?;

        Ok(EnrollmentResponse {
            remote_node_id: node_id,
            secret,
            token,
        })
    }

    /// Remove a tenant's membership for a node.
    ///
    /// If that was the node's last membership, the node record and its
    /// credential are deleted in the same transaction. A termination
    /// notification is dispatched after commit and never awaited.
    pub async fn deregister(&self, tenant: &TenantId, node_id: &RemoteNodeId) -> FleetResult<()> {
        self.store.transaction(|txn| {
            let cred = txn
                .credential(node_id)
                .ok_or_else(|| FleetError::NotFound(format!("remote exit node {node_id}")))?;
            txn.delete_membership(&cred.exit_node_id, tenant)?;
            if txn.node_membership_count(&cred.exit_node_id) == 0 {
                // Orphan cleanup: last membership takes the node and
                // credential with it.
                txn.delete_credential(node_id)?;
                txn.delete_node(&cred.exit_node_id)?;
            }
            Ok::<_, FleetError>(())
        })?;

        info!(tenant = %tenant, node = %node_id, "node deregistered");
        self.reconcile_after_commit(tenant);

        let notifier = self.notifier.clone();
        let node_id = node_id.clone();
        let tenant = tenant.clone();
        tokio::spawn(async move {
            let message = NodeMessage::Terminated {
                tenant_id: tenant.clone(),
            };
            if let Err(err) = notifier.send(&node_id, message).await {
                warn!(tenant = %tenant, node = %node_id, %err, "termination push failed");
            }
        });

        Ok(())
    }

    /// Record the endpoint and public key a node publishes once it is
    /// up, and mark it live. The session layer has already
    /// authenticated the caller by the time this runs.
    pub async fn publish_node_info(
        &self,
        node_id: &RemoteNodeId,
        endpoint: String,
        public_key: String,
    ) -> FleetResult<()> {
        self.store.transaction(|txn| {
            let cred = txn
                .credential(node_id)
                .ok_or_else(|| FleetError::NotFound(format!("remote exit node {node_id}")))?;
            let mut node = txn
                .node(&cred.exit_node_id)
                .ok_or_else(|| FleetError::Internal("credential without node".into()))?;
            node.endpoint = Some(endpoint);
            node.public_key = Some(public_key);
            node.online = true;
            txn.update_node(node)?;
            Ok::<_, FleetError>(())
        })?;
        info!(node = %node_id, "node info published");
        Ok(())
    }

    fn gate_membership(txn: &Txn, tenant: &TenantId) -> FleetResult<()> {
        let hypothetical = txn.tenant_node_count(tenant) + 1;
        if AdmissionControl::check_limit_in(txn, tenant, Feature::RemoteExitNodes, hypothetical) {
            return Err(FleetError::AdmissionRejected {
                feature: Feature::RemoteExitNodes,
            });
        }
        Ok(())
    }

    fn reconcile_after_commit(&self, tenant: &TenantId) {
        if let Err(err) = self.ledger.reconcile(tenant, Feature::RemoteExitNodes) {
            // Transient undercount; heals on the next mutation.
            warn!(tenant = %tenant, %err, "post-commit reconciliation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::generate_secret;
    use crate::notify::MemoryChannel;
    use crate::session::MemorySessionIssuer;
    use fleet_common::LimitConfiguration;
    use fleet_store::StoreError;
    use ipnetwork::Ipv4Network;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    struct Harness {
        store: Arc<MemStore>,
        sessions: Arc<MemorySessionIssuer>,
        notifier: Arc<MemoryChannel>,
        service: EnrollmentService,
    }

    fn harness() -> Harness {
        harness_with_pool(AddressPool::default_pool())
    }

    fn harness_with_pool(pool: AddressPool) -> Harness {
        let store = Arc::new(MemStore::new());
        let sessions = Arc::new(MemorySessionIssuer::new());
        let notifier = Arc::new(MemoryChannel::new());
        let service = EnrollmentService::new(
            store.clone(),
            sessions.clone(),
            notifier.clone(),
            pool,
        );
        Harness {
            store,
            sessions,
            notifier,
            service,
        }
    }

    fn tenant(s: &str) -> TenantId {
        TenantId::new(s).unwrap()
    }

    fn request(id: &str, secret: &str) -> EnrollmentRequest {
        EnrollmentRequest {
            remote_node_id: id.to_string(),
            secret: secret.to_string(),
        }
    }

    fn set_node_limit(store: &MemStore, tenant: &TenantId, maximum: i64) {
        store
            .transaction(|txn| -> Result<(), StoreError> {
                txn.put_limit(LimitConfiguration {
                    tenant_id: tenant.clone(),
                    feature: Feature::RemoteExitNodes,
                    maximum,
                    override_enabled: false,
                });
                Ok(())
            })
            .unwrap();
    }

    fn node_count(store: &MemStore, tenant: &TenantId) -> i64 {
        store
            .transaction(|txn| -> Result<i64, StoreError> { Ok(txn.tenant_node_count(tenant)) })
            .unwrap()
    }

    fn usage(store: &MemStore, tenant: &TenantId) -> Option<i64> {
        store
            .transaction(|txn| -> Result<Option<i64>, StoreError> {
                Ok(txn.usage_counter(tenant, Feature::RemoteExitNodes))
            })
            .unwrap()
    }

    const NODE_A: &str = "abc123def456789";
    const NODE_B: &str = "zzz999yyy888777";

    #[tokio::test]
    async fn test_first_enrollment_registers_node() {
        let h = harness();
        let t1 = tenant("t1");
        let secret = generate_secret();

        let response = h.service.enroll(&t1, request(NODE_A, &secret)).await.unwrap();
        assert_eq!(response.remote_node_id.as_str(), NODE_A);
        assert_eq!(response.secret, secret);
        assert_eq!(
            h.sessions.subject_for(&response.token),
            Some(response.remote_node_id.clone())
        );

        assert_eq!(node_count(&h.store, &t1), 1);
        assert_eq!(usage(&h.store, &t1), Some(1));

        // Node record exists with a pool address and empty endpoint.
        let node_id = RemoteNodeId::new(NODE_A).unwrap();
        let node = h
            .store
            .transaction(|txn| -> Result<ExitNode, StoreError> {
                let cred = txn
                    .credential(&node_id)
                    .ok_or_else(|| StoreError::NotFound("cred".into()))?;
                txn.node(&cred.exit_node_id)
                    .ok_or_else(|| StoreError::NotFound("node".into()))
            })
            .unwrap();
        assert!(node.endpoint.is_none());
        assert!(node.public_key.is_none());
    }

    #[tokio::test]
    async fn test_repeat_enrollment_same_tenant_is_noop() {
        let h = harness();
        let t1 = tenant("t1");
        let secret = generate_secret();

        let first = h.service.enroll(&t1, request(NODE_A, &secret)).await.unwrap();
        let second = h.service.enroll(&t1, request(NODE_A, &secret)).await.unwrap();

        // One membership row, but a fresh token each time.
        assert_eq!(node_count(&h.store, &t1), 1);
        assert_eq!(usage(&h.store, &t1), Some(1));
        assert_ne!(first.token, second.token);
    }

    #[tokio::test]
    async fn test_second_tenant_shares_backing_node() {
        let h = harness();
        let t1 = tenant("t1");
        let t2 = tenant("t2");
        let secret = generate_secret();

        h.service.enroll(&t1, request(NODE_A, &secret)).await.unwrap();
        h.service.enroll(&t2, request(NODE_A, &secret)).await.unwrap();

        assert_eq!(node_count(&h.store, &t1), 1);
        assert_eq!(node_count(&h.store, &t2), 1);

        // Both memberships point at one exit node.
        let node_id = RemoteNodeId::new(NODE_A).unwrap();
        let shared = h
            .store
            .transaction(|txn| -> Result<i64, StoreError> {
                let cred = txn
                    .credential(&node_id)
                    .ok_or_else(|| StoreError::NotFound("cred".into()))?;
                Ok(txn.node_membership_count(&cred.exit_node_id))
            })
            .unwrap();
        assert_eq!(shared, 2);
    }

    #[tokio::test]
    async fn test_wrong_secret_always_rejected() {
        let h = harness();
        let t1 = tenant("t1");
        let t2 = tenant("t2");
        let secret = generate_secret();
        let wrong = generate_secret();

        h.service.enroll(&t1, request(NODE_A, &secret)).await.unwrap();

        let err = h.service.enroll(&t1, request(NODE_A, &wrong)).await.unwrap_err();
        assert!(matches!(err, FleetError::Authentication));

        // Same failure when targeting another tenant.
        let err = h.service.enroll(&t2, request(NODE_A, &wrong)).await.unwrap_err();
        assert!(matches!(err, FleetError::Authentication));
        assert_eq!(node_count(&h.store, &t2), 0);
    }

    #[tokio::test]
    async fn test_limit_gate_rejects_without_partial_state() {
        let h = harness();
        let t1 = tenant("t1");
        set_node_limit(&h.store, &t1, 1);

        let secret_a = generate_secret();
        h.service.enroll(&t1, request(NODE_A, &secret_a)).await.unwrap();

        let secret_b = generate_secret();
        let err = h
            .service
            .enroll(&t1, request(NODE_B, &secret_b))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FleetError::AdmissionRejected { feature: Feature::RemoteExitNodes }
        ));

        // Nothing from the rejected enrollment persisted.
        let node_b = RemoteNodeId::new(NODE_B).unwrap();
        let cred = h
            .store
            .transaction(|txn| -> Result<_, StoreError> { Ok(txn.credential(&node_b)) })
            .unwrap();
        assert!(cred.is_none());
        assert_eq!(node_count(&h.store, &t1), 1);
        assert_eq!(usage(&h.store, &t1), Some(1));
    }

    #[tokio::test]
    async fn test_validation_precedes_any_mutation() {
        let h = harness();
        let t1 = tenant("t1");

        let err = h
            .service
            .enroll(&t1, request("short", &generate_secret()))
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Validation { .. }));

        let err = h
            .service
            .enroll(&t1, request(NODE_A, "too-short-secret"))
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Validation { .. }));

        assert_eq!(node_count(&h.store, &t1), 0);
        assert_eq!(usage(&h.store, &t1), None);
    }

    #[tokio::test]
    async fn test_deregister_last_membership_cleans_up() {
        let h = harness();
        let t1 = tenant("t1");
        let secret = generate_secret();
        let node_id = RemoteNodeId::new(NODE_A).unwrap();

        h.service.enroll(&t1, request(NODE_A, &secret)).await.unwrap();
        h.service.deregister(&t1, &node_id).await.unwrap();

        let cred = h
            .store
            .transaction(|txn| -> Result<_, StoreError> { Ok(txn.credential(&node_id)) })
            .unwrap();
        assert!(cred.is_none());
        assert_eq!(node_count(&h.store, &t1), 0);
        assert_eq!(usage(&h.store, &t1), Some(0));

        // Termination push is dispatched on a detached task.
        let mut waited = Duration::ZERO;
        while h.notifier.sent().is_empty() && waited < Duration::from_secs(1) {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += Duration::from_millis(10);
        }
        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, node_id);
        assert_eq!(sent[0].1, NodeMessage::Terminated { tenant_id: t1 });
    }

    #[tokio::test]
    async fn test_deregister_nonlast_keeps_node() {
        let h = harness();
        let t1 = tenant("t1");
        let t2 = tenant("t2");
        let secret = generate_secret();
        let node_id = RemoteNodeId::new(NODE_A).unwrap();

        h.service.enroll(&t1, request(NODE_A, &secret)).await.unwrap();
        h.service.enroll(&t2, request(NODE_A, &secret)).await.unwrap();
        h.service.deregister(&t1, &node_id).await.unwrap();

        // Credential and node survive for the remaining tenant.
        let cred = h
            .store
            .transaction(|txn| -> Result<_, StoreError> { Ok(txn.credential(&node_id)) })
            .unwrap();
        assert!(cred.is_some());
        assert_eq!(node_count(&h.store, &t1), 0);
        assert_eq!(node_count(&h.store, &t2), 1);
        assert_eq!(usage(&h.store, &t1), Some(0));
    }

    #[tokio::test]
    async fn test_deregister_unknown_is_not_found() {
        let h = harness();
        let t1 = tenant("t1");
        let node_id = RemoteNodeId::new(NODE_A).unwrap();

        let err = h.service.deregister(&t1, &node_id).await.unwrap_err();
        assert!(matches!(err, FleetError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_deregister_wrong_tenant_is_not_found() {
        let h = harness();
        let t1 = tenant("t1");
        let t2 = tenant("t2");
        let secret = generate_secret();
        let node_id = RemoteNodeId::new(NODE_A).unwrap();

        h.service.enroll(&t1, request(NODE_A, &secret)).await.unwrap();
        let err = h.service.deregister(&t2, &node_id).await.unwrap_err();
        assert!(matches!(err, FleetError::NotFound(_)));

        // The existing membership is untouched.
        assert_eq!(node_count(&h.store, &t1), 1);
    }

    #[tokio::test]
    async fn test_pool_exhaustion_is_internal() {
        let pool = AddressPool::new(
            Ipv4Network::new(Ipv4Addr::new(10, 0, 0, 0), 30).unwrap(),
        );
        let h = harness_with_pool(pool);
        let t1 = tenant("t1");

        // A /30 holds three allocatable addresses.
        for id in ["aaa111aaa111aaa", "bbb222bbb222bbb", "ccc333ccc333ccc"] {
            h.service.enroll(&t1, request(id, &generate_secret())).await.unwrap();
        }
        let err = h
            .service
            .enroll(&t1, request("ddd444ddd444ddd", &generate_secret()))
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Internal(_)));
    }

    #[tokio::test]
    async fn test_publish_node_info() {
        let h = harness();
        let t1 = tenant("t1");
        let node_id = RemoteNodeId::new(NODE_A).unwrap();

        h.service
            .enroll(&t1, request(NODE_A, &generate_secret()))
            .await
            .unwrap();
        h.service
            .publish_node_info(&node_id, "203.0.113.9:51820".into(), "pubkey".into())
            .await
            .unwrap();

        let node = h
            .store
            .transaction(|txn| -> Result<ExitNode, StoreError> {
                let cred = txn
                    .credential(&node_id)
                    .ok_or_else(|| StoreError::NotFound("cred".into()))?;
                txn.node(&cred.exit_node_id)
                    .ok_or_else(|| StoreError::NotFound("node".into()))
            })
            .unwrap();
        assert_eq!(node.endpoint.as_deref(), Some("203.0.113.9:51820"));
        assert!(node.online);

        let err = h
            .service
            .publish_node_info(
                &RemoteNodeId::new(NODE_B).unwrap(),
                "x".into(),
                "y".into(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reenrollment_after_cleanup_registers_fresh() {
        let h = harness();
        let t1 = tenant("t1");
        let node_id = RemoteNodeId::new(NODE_A).unwrap();
        let secret = generate_secret();

        h.service.enroll(&t1, request(NODE_A, &secret)).await.unwrap();
        h.service.deregister(&t1, &node_id).await.unwrap();

        // Old credential is gone, so any secret registers a new node.
        let other = generate_secret();
        h.service.enroll(&t1, request(NODE_A, &other)).await.unwrap();
        assert_eq!(node_count(&h.store, &t1), 1);
        assert_eq!(usage(&h.store, &t1), Some(1));
    }
}
