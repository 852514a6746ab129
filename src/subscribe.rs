//! C6 — subscribe/unsubscribe engine. Auth chain, subscription-set
//! merge/diff, retained replay, event notifications (spec §4.6).
//! Grounded on the teacher's `router/connection.rs`
//! `add_to_subscriptions`/`remove_from_subscriptions`, generalized
//! from a node-local `HashMap<String, Subscription>` mutation to a
//! read-modify-write against the replicated store.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::collaborators::{AuthChain, AuthDecision, EventChain};
use crate::error::{Error, Result};
use crate::id::{NodeId, SubscriberId};
use crate::metadata::{Qos, SubscriptionEntry, SubscriptionStore};
use crate::metrics::Metrics;
use crate::queue::QueuedMessage;
use crate::retained::RetainedStore;
use crate::session_table::SessionTable;
use crate::collaborators::ClusterOracle;

pub struct SubscribeEngine {
    this_node: NodeId,
    store: SubscriptionStore,
    auth: Arc<dyn AuthChain>,
    events: Arc<dyn EventChain>,
    oracle: Arc<dyn ClusterOracle>,
    table: Arc<SessionTable>,
    retained: Arc<dyn RetainedStore>,
    metrics: Arc<Metrics>,
    ready_poll_interval: Duration,
}

impl SubscribeEngine {
    pub fn new(
        this_node: NodeId,
        store: SubscriptionStore,
        auth: Arc<dyn AuthChain>,
        events: Arc<dyn EventChain>,
        oracle: Arc<dyn ClusterOracle>,
        table: Arc<SessionTable>,
        retained: Arc<dyn RetainedStore>,
        metrics: Arc<Metrics>,
        ready_poll_interval: Duration,
    ) -> SubscribeEngine {
        SubscribeEngine { this_node, store, auth, events, oracle, table, retained, metrics, ready_poll_interval }
    }

    /// Bounded-sleep poll; may loop indefinitely — callers needing a
    /// deadline wrap it externally (spec §5).
    pub async fn wait_til_ready(&self) {
        while !self.oracle.is_ready() {
            tokio::time::delay_for(self.ready_poll_interval).await;
        }
    }

    fn check_ready(&self, trade_consistency: bool) -> Result<()> {
        if !trade_consistency && !self.oracle.is_ready() {
            return Err(Error::NotReady);
        }
        Ok(())
    }

    /// `subscribe(trade_consistency, user, id, [(topic,qos)])` (§4.6).
    pub async fn subscribe(
        &self,
        trade_consistency: bool,
        user: &str,
        id: &SubscriberId,
        topics: Vec<(String, Qos)>,
    ) -> Result<()> {
        self.check_ready(trade_consistency)?;

        let topics = match self.auth.auth_on_subscribe(user, id, &topics).await {
            AuthDecision::Ok => topics,
            AuthDecision::OkWithTopics(substituted) => substituted,
            AuthDecision::Error => return Err(Error::NotAllowed),
        };

        let mut set = self.store.get(id).await?;
        for (topic, qos) in &topics {
            set.insert(SubscriptionEntry { topic: topic.clone(), qos: *qos, owner_node: self.this_node.clone() });
        }
        self.store.put(id, set).await?;

        if let Ok(handle) = self.table.get_queue_pid(id) {
            for (topic, qos) in &topics {
                let mut hits = Vec::new();
                self.retained.match_fold(&id.mountpoint, topic, &mut |t, payload| {
                    hits.push((t.to_string(), payload.clone()));
                });
                for (matched_topic, payload) in hits {
                    let queued = QueuedMessage { routing_key: matched_topic, payload, qos: *qos, retain: true, dup: false };
                    if let Err(e) = handle.enqueue(queued).await {
                        log::warn!("retained replay enqueue for {} failed: {}", id, e);
                    }
                }
            }
        }

        self.events.on_subscribe(user, id, &topics).await;
        for (topic, _) in &topics {
            self.metrics.subscription_count.incr(topic);
        }

        Ok(())
    }

    /// `unsubscribe(trade_consistency, user, id, [topic])` (§4.6).
    pub async fn unsubscribe(&self, trade_consistency: bool, user: &str, id: &SubscriberId, topics: Vec<String>) -> Result<()> {
        self.check_ready(trade_consistency)?;

        let set = self.store.get(id).await?;
        let retained: std::collections::HashSet<_> = set
            .into_iter()
            .filter(|entry| entry.owner_node != self.this_node || !topics.contains(&entry.topic))
            .collect();
        self.store.put(id, retained).await?;

        self.events.on_unsubscribe(user, id, &topics).await;
        for topic in &topics {
            self.metrics.subscription_count.decr(topic);
        }

        Ok(())
    }

    /// `delete_subscriptions(id)` — tombstone, no auth, no events
    /// (§4.6).
    pub async fn delete_subscriptions(&self, id: &SubscriberId) -> Result<()> {
        self.store.delete(id).await
    }
}
