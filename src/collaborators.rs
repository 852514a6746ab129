//! Trait seams for everything spec.md §1 calls an external collaborator:
//! the wire-protocol session state machine that calls into the
//! registry is the only thing upstream of these traits; everything
//! below this module is out of scope and specified only by interface.

use async_trait::async_trait;

use crate::error::Result;
use crate::id::{NodeId, SubscriberId};
use crate::metadata::Qos;

/// What the auth plugin chain may decide about a subscribe request
/// (spec §4.6 step 2).
pub enum AuthDecision {
    Ok,
    OkWithTopics(Vec<(String, Qos)>),
    Error,
}

/// `all_till_ok(auth_on_subscribe, ...)` — tries plugins in order,
/// stops at the first that doesn't defer.
#[async_trait]
pub trait AuthChain: Send + Sync {
    async fn auth_on_subscribe(
        &self,
        user: &str,
        id: &SubscriberId,
        topics: &[(String, Qos)],
    ) -> AuthDecision;
}

/// Best-effort event notification chain (`all(on_subscribe, ...)`).
/// Failures here are not propagated to the caller.
#[async_trait]
pub trait EventChain: Send + Sync {
    async fn on_subscribe(&self, user: &str, id: &SubscriberId, topics: &[(String, Qos)]);
    async fn on_unsubscribe(&self, user: &str, id: &SubscriberId, topics: &[String]);
}

/// Cluster-membership oracle. Doubles as the registry's cross-node RPC
/// transport — `publish_to_remote` carries fan-out (§4.7),
/// `migrate_session` carries the per-peer handoff RPC issued by
/// `register_subscriber_` step 3 (§4.8); both are fire-and-forget,
/// timeout-bounded calls to a peer, so one collaborator models both.
#[async_trait]
pub trait ClusterOracle: Send + Sync {
    fn is_ready(&self) -> bool;
    fn nodes(&self) -> Vec<NodeId>;
    async fn publish_to_remote(&self, node: &NodeId, msg: &crate::publish::Message) -> Result<()>;
    async fn migrate_session(&self, node: &NodeId, id: &SubscriberId, handle: crate::queue::QueueHandleRef) -> Result<()>;
}

/// The cluster-wide serializer used by exclusive-mode registration
/// (§4.8). Guarantees exactly one node executes `register_subscriber_`
/// for a given id at a time.
#[async_trait]
pub trait RegisterLeader: Send + Sync {
    async fn register_subscriber(
        &self,
        session_ref: SubscriberId,
        id: &SubscriberId,
        clean_session: bool,
    ) -> Result<crate::queue::QueueHandleRef>;
}

/// Produces fresh queue actors. Idempotence is explicitly NOT this
/// trait's job — single-flight is the coordinator's (§4.4).
#[async_trait]
pub trait QueueSupervisor: Send + Sync {
    async fn start_queue(&self, id: &SubscriberId) -> Result<crate::queue::QueueHandleRef>;
}
