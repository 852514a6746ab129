//! Registry core of a distributed MQTT broker: subscriber-to-queue-
//! owner mapping, the cluster-wide subscription table, and session
//! handover on reconnect (components C1-C9). Everything upstream of
//! this crate — wire protocol parsing, TLS, the replicated metadata
//! store, the retained-match algorithm, leader election — is an
//! external collaborator reached only through the trait seams in
//! `collaborators`, `metadata`, `retained` and `queue`.
//!
//! `Registry` is the facade that wires the components together; each
//! component module also works standalone for a caller that wants to
//! own the wiring itself.

pub mod admission;
pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod id;
pub mod introspection;
pub mod metadata;
pub mod metrics;
pub mod publish;
pub mod queue;
pub mod reg_view;
pub mod registration;
pub mod retained;
pub mod session_table;
pub mod subscribe;

use std::sync::Arc;

use crate::admission::AdmissionGate;
use crate::collaborators::{AuthChain, ClusterOracle, EventChain, QueueSupervisor, RegisterLeader};
use crate::config::RegistryConfig;
use crate::coordinator::{Coordinator, CoordinatorHandle};
use crate::error::Result;
use crate::id::{NodeId, SubscriberId};
use crate::introspection::Introspection;
use crate::metadata::{MetadataStore, Qos, SubscriptionStore};
use crate::publish::{Message, PublishRouter};
use crate::queue::QueueHandleRef;
use crate::reg_view::RoutingView;
use crate::retained::RetainedStore;
use crate::registration::RegistrationService;
use crate::session_table::SessionTable;
use crate::subscribe::SubscribeEngine;
use crate::metrics::Metrics;

/// The set of external collaborators a `Registry` is built around
/// (spec §1). Grouped into one struct so `Registry::new` doesn't take
/// eight positional `Arc<dyn Trait>` arguments.
pub struct Collaborators {
    pub auth: Arc<dyn AuthChain>,
    pub events: Arc<dyn EventChain>,
    pub oracle: Arc<dyn ClusterOracle>,
    pub leader: Arc<dyn RegisterLeader>,
    pub supervisor: Arc<dyn QueueSupervisor>,
    pub metadata_store: Arc<dyn MetadataStore>,
    pub retained_store: Arc<dyn RetainedStore>,
}

/// Top-level facade tying C1-C9 together for a single cluster node.
/// Construction spawns the coordinator actor (C5) onto the current
/// tokio runtime, mirroring how the teacher's `main.rs` spawns
/// `Router::start` — there is no separate "start" call to forget.
pub struct Registry {
    this_node: NodeId,
    config: RegistryConfig,
    table: Arc<SessionTable>,
    coordinator: CoordinatorHandle,
    subscriptions: SubscriptionStore,
    subscribe: SubscribeEngine,
    publish: PublishRouter,
    registration: RegistrationService,
    introspection: Introspection,
    metrics: Arc<Metrics>,
}

impl Registry {
    pub fn new(this_node: NodeId, config: RegistryConfig, collaborators: Collaborators) -> Registry {
        let table = Arc::new(SessionTable::new());
        let gate = Arc::new(AdmissionGate::new(config.admission_bucket_size, config.admission_refill_per_sec));
        let subscriptions = SubscriptionStore::new(collaborators.metadata_store, gate.clone());
        let metrics = Arc::new(Metrics::new());

        let (coordinator, coordinator_handle) = Coordinator::new(table.clone(), collaborators.supervisor);
        tokio::spawn(coordinator.run());

        let subscribe = SubscribeEngine::new(
            this_node.clone(),
            subscriptions.clone(),
            collaborators.auth,
            collaborators.events,
            collaborators.oracle.clone(),
            table.clone(),
            collaborators.retained_store.clone(),
            metrics.clone(),
            config.ready_poll_interval,
        );

        let publish = PublishRouter::new(table.clone(), collaborators.oracle.clone(), collaborators.retained_store.clone());

        let registration = RegistrationService::new(
            this_node.clone(),
            coordinator_handle.clone(),
            table.clone(),
            subscriptions.clone(),
            gate.clone(),
            collaborators.leader,
            collaborators.oracle,
            config.overload_retry_backoff,
            config.migrate_rpc_timeout,
        );

        let introspection = Introspection::new(this_node.clone(), table.clone(), subscriptions.clone(), collaborators.retained_store, gate);

        Registry { this_node, config, table, coordinator: coordinator_handle, subscriptions, subscribe, publish, registration, introspection, metrics }
    }

    pub fn this_node(&self) -> &NodeId {
        &self.this_node
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub async fn subscribe(&self, user: &str, id: &SubscriberId, topics: Vec<(String, Qos)>) -> Result<()> {
        self.subscribe.subscribe(self.config.trade_consistency, user, id, topics).await
    }

    pub async fn unsubscribe(&self, user: &str, id: &SubscriberId, topics: Vec<String>) -> Result<()> {
        self.subscribe.unsubscribe(self.config.trade_consistency, user, id, topics).await
    }

    pub async fn delete_subscriptions(&self, id: &SubscriberId) -> Result<()> {
        self.subscribe.delete_subscriptions(id).await
    }

    pub async fn wait_til_ready(&self) {
        self.subscribe.wait_til_ready().await
    }

    pub async fn publish(&self, msg: Message, reg_view: &dyn RoutingView) -> Result<()> {
        self.publish.publish(msg, reg_view).await
    }

    pub async fn register(
        &self,
        session_ref: SubscriberId,
        id: &SubscriberId,
        clean_session: bool,
    ) -> Result<QueueHandleRef> {
        self.registration.register(session_ref, id, clean_session, self.config.allow_multiple_sessions, self.config.balance_sessions).await
    }

    pub async fn migrate_session(&self, id: &SubscriberId, other: QueueHandleRef) -> Result<()> {
        self.registration.migrate_session(id, other).await
    }

    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.coordinator
    }

    pub fn sessions(&self) -> &Arc<SessionTable> {
        &self.table
    }

    pub fn subscriptions(&self) -> &SubscriptionStore {
        &self.subscriptions
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn introspection(&self) -> &Introspection {
        &self.introspection
    }
}
