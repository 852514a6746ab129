//! C8 — session registration & migration. Exclusive vs. multi-session
//! registration (spec §4.8), the leader's `register_subscriber_`
//! action, `remap_subscription`, and the remote `migrate_session`
//! endpoint. Grounded on the teacher's `router/mod.rs::handle_connect`
//! clean-session branch (tear down prior state vs. resume it),
//! generalized from a node-local active/inactive split to a
//! cluster-wide leader-serialized handoff.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::admission::AdmissionGate;
use crate::collaborators::{ClusterOracle, RegisterLeader};
use crate::coordinator::CoordinatorHandle;
use crate::error::{Error, Result};
use crate::id::{NodeId, SubscriberId};
use crate::metadata::SubscriptionStore;
use crate::queue::{DeliverMode, QueueHandleRef, QueueOpt};
use crate::session_table::{now_secs, SessionRow, SessionTable};

pub struct RegistrationService {
    this_node: NodeId,
    coordinator: CoordinatorHandle,
    table: Arc<SessionTable>,
    store: SubscriptionStore,
    gate: Arc<AdmissionGate>,
    leader: Arc<dyn RegisterLeader>,
    oracle: Arc<dyn ClusterOracle>,
    overload_retry_backoff: Duration,
    migrate_rpc_timeout: Duration,
}

impl RegistrationService {
    pub fn new(
        this_node: NodeId,
        coordinator: CoordinatorHandle,
        table: Arc<SessionTable>,
        store: SubscriptionStore,
        gate: Arc<AdmissionGate>,
        leader: Arc<dyn RegisterLeader>,
        oracle: Arc<dyn ClusterOracle>,
        overload_retry_backoff: Duration,
        migrate_rpc_timeout: Duration,
    ) -> RegistrationService {
        RegistrationService {
            this_node,
            coordinator,
            table,
            store,
            gate,
            leader,
            oracle,
            overload_retry_backoff,
            migrate_rpc_timeout,
        }
    }

    /// Top-level entry point selected by `allow_multiple_sessions`
    /// (spec §4.8).
    pub async fn register(
        &self,
        session_ref: SubscriberId,
        id: &SubscriberId,
        clean_session: bool,
        allow_multiple_sessions: bool,
        balance_sessions: bool,
    ) -> Result<QueueHandleRef> {
        if allow_multiple_sessions {
            self.register_multi_session(session_ref, id, balance_sessions).await
        } else {
            self.register_exclusive(session_ref, id, clean_session).await
        }
    }

    /// Exclusive mode: the leader serializes exactly one node running
    /// `register_subscriber_` for `id` at a time.
    async fn register_exclusive(&self, session_ref: SubscriberId, id: &SubscriberId, clean_session: bool) -> Result<QueueHandleRef> {
        let handle = self.leader.register_subscriber(session_ref, id, clean_session).await?;

        if !clean_session {
            self.remap_subscription(id).await?;
        }

        Ok(handle)
    }

    /// Multi-session mode: `clean_session` is ignored — callers cannot
    /// request a fresh state this way. Documented as intentional
    /// (DESIGN NOTES open question): multi-session disables
    /// clean-session semantics.
    async fn register_multi_session(&self, session_ref: SubscriberId, id: &SubscriberId, balance_sessions: bool) -> Result<QueueHandleRef> {
        let handle = self.coordinator.ensure_queue(id.clone()).await?;
        handle.add_session(&session_ref, false, true).await?;

        if balance_sessions {
            handle.set_opts(&[QueueOpt::DeliverMode(DeliverMode::Balance)]).await?;
        }

        let row = SessionRow {
            subscriber_id: session_ref.clone(),
            queue_handle: handle.clone(),
            liveness_token: handle.liveness_token(),
            last_seen: now_secs(),
            balance: balance_sessions,
            clean: false,
        };
        self.coordinator.add_session_row(id.clone(), row).await?;

        log::info!("multi-session registration for {} (balance={})", id, balance_sessions);
        Ok(handle)
    }

    /// The leader's action on the node that won the slot for `id`
    /// (spec §4.8).
    pub async fn register_subscriber_(&self, session_ref: SubscriberId, id: &SubscriberId, clean_session: bool) -> Result<QueueHandleRef> {
        if clean_session {
            let store = &self.store;
            let gate = &self.gate;
            let backoff = self.overload_retry_backoff;
            gate.with_retry(backoff, || async { store.delete(id).await }).await?;
        }

        let handle = self.coordinator.ensure_queue(id.clone()).await?;

        for node in self.oracle.nodes() {
            if node == self.this_node {
                continue;
            }
            match timeout(self.migrate_rpc_timeout, self.oracle.migrate_session(&node, id, handle.clone())).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("migrate RPC to {} for {} failed: {}", node, id, e),
                Err(_) => log::warn!("migrate RPC to {} for {} timed out", node, id),
            }
        }

        handle.add_session(&session_ref, clean_session, false).await?;

        let row = SessionRow {
            subscriber_id: session_ref,
            queue_handle: handle.clone(),
            liveness_token: handle.liveness_token(),
            last_seen: now_secs(),
            balance: false,
            clean: clean_session,
        };
        self.coordinator.add_session_row(id.clone(), row).await?;

        Ok(handle)
    }

    /// `remap_subscription(id)` (spec §4.8): rewrite every tuple's
    /// `owner_node` to `this_node`, dedupe, `put`. Retries on overload.
    pub async fn remap_subscription(&self, id: &SubscriberId) -> Result<()> {
        let store = &self.store;
        let gate = &self.gate;
        let this_node = self.this_node.clone();
        let backoff = self.overload_retry_backoff;

        gate.with_retry(backoff, || {
            let this_node = this_node.clone();
            async move {
                let set = store.get(id).await?;
                let remapped: std::collections::HashSet<_> = set
                    .into_iter()
                    .map(|mut entry| {
                        entry.owner_node = this_node.clone();
                        entry
                    })
                    .collect();
                store.put(id, remapped).await
            }
        })
        .await
    }

    /// `migrate_session(id, other_handle)` (remote endpoint, §4.8):
    /// if this node has no live queue for `id`, no-op; else hand off
    /// to `other` and let the local queue terminate.
    pub async fn migrate_session(&self, id: &SubscriberId, other: QueueHandleRef) -> Result<()> {
        match self.table.get_queue_pid(id) {
            Ok(local) => local.migrate(other).await,
            Err(Error::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
