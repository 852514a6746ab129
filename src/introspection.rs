//! C9 — introspection. Read-only derived views over the session table,
//! the subscription store, the retained store and a subscriber's
//! queue, for operators (spec §4.9). Grounded on the pack's
//! `mesquitte` `GlobalState` read accessors: a thin struct holding
//! shared references to the live collaborators, exposing only getters.

use std::sync::Arc;

use crate::admission::AdmissionGate;
use crate::error::Result;
use crate::id::{NodeId, SubscriberId};
use crate::metadata::{Qos, SubscriptionStore};
use crate::retained::RetainedStore;
use crate::session_table::{SessionRow, SessionTable};

/// One hit produced by `fold_subscribers` (spec §4.9): a local
/// delivery target carries the subscriber id and qos, a remote one
/// only the owning node.
pub enum SubscriberTarget {
    Local(SubscriberId, Qos),
    Remote(NodeId),
}

pub struct Introspection {
    this_node: NodeId,
    table: Arc<SessionTable>,
    subscriptions: SubscriptionStore,
    retained: Arc<dyn RetainedStore>,
    gate: Arc<AdmissionGate>,
}

impl Introspection {
    pub fn new(
        this_node: NodeId,
        table: Arc<SessionTable>,
        subscriptions: SubscriptionStore,
        retained: Arc<dyn RetainedStore>,
        gate: Arc<AdmissionGate>,
    ) -> Introspection {
        Introspection { this_node, table, subscriptions, retained, gate }
    }

    /// `(granted, rejected)` for a named admission bucket (SPEC_FULL
    /// §C).
    pub fn admission_stats(&self, bucket: &str) -> (u64, u64) {
        self.gate.stats(bucket)
    }

    /// `(total, active, inactive)` where inactive = rows whose
    /// liveness token is unset (the `0` detached sentinel).
    pub fn client_stats(&self) -> (usize, usize, usize) {
        self.table.client_stats()
    }

    pub fn total_sessions(&self) -> usize {
        self.table.total_sessions()
    }

    pub fn total_subscriptions(&self) -> usize {
        self.subscriptions.size()
    }

    pub fn retained(&self) -> usize {
        self.retained.size()
    }

    /// Queued depth for `id`'s queue, or `0` if it has none right now
    /// (spec §4.9: not an error, a dead/absent queue just reads empty).
    pub async fn stored(&self, id: &SubscriberId) -> Result<usize> {
        match self.table.get_queue_pid(id) {
            Ok(handle) => {
                let (_, depth) = handle.status().await?;
                Ok(depth)
            }
            Err(crate::error::Error::NotFound(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    pub fn fold_sessions<B>(&self, init: B, f: impl FnMut(B, &SessionRow) -> B) -> B {
        self.table.fold(init, f)
    }

    /// Walks every non-tombstone `(id, topic, qos, owner_node)` in the
    /// subscription store, yielding `Local` when `owner_node` is this
    /// node and `Remote` otherwise (spec §4.9). Best-effort: concurrent
    /// deletions during the fold may miss or double-count (spec §8).
    pub fn fold_subscribers<B>(&self, init: B, mut f: impl FnMut(B, &str, SubscriberTarget) -> B) -> B {
        self.subscriptions.fold(init, |acc, id, set| {
            let mut acc = acc;
            for entry in set {
                let target = if entry.owner_node == self.this_node {
                    SubscriberTarget::Local(id.clone(), entry.qos)
                } else {
                    SubscriberTarget::Remote(entry.owner_node.clone())
                };
                acc = f(acc, &entry.topic, target);
            }
            acc
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::admission::AdmissionGate;
    use crate::metadata::{MetadataStore, SubscriptionEntry, SubscriptionSet};
    use crate::queue::{DeliverMode, QueueHandle, QueueHandleRef, QueueOpt, QueueState, QueuedMessage};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeQueue {
        depth: usize,
    }

    #[async_trait]
    impl QueueHandle for FakeQueue {
        fn liveness_token(&self) -> u64 {
            1
        }
        async fn add_session(&self, _s: &SubscriberId, _c: bool, _p: bool) -> Result<()> {
            Ok(())
        }
        async fn set_opts(&self, _o: &[QueueOpt]) -> Result<()> {
            Ok(())
        }
        async fn enqueue(&self, _m: QueuedMessage) -> Result<()> {
            Ok(())
        }
        async fn migrate(&self, _o: Arc<dyn QueueHandle>) -> Result<()> {
            Ok(())
        }
        async fn get_sessions(&self) -> Result<Vec<SubscriberId>> {
            Ok(vec![])
        }
        async fn status(&self) -> Result<(QueueState, usize)> {
            Ok((QueueState::Active, self.depth))
        }
        fn active(&self) -> bool {
            true
        }
        async fn notify(&self) {
            std::future::pending::<()>().await
        }
    }

    struct MemStore {
        rows: Mutex<HashMap<SubscriberId, SubscriptionSet>>,
    }

    #[async_trait]
    impl MetadataStore for MemStore {
        async fn get(&self, id: &SubscriberId) -> Result<SubscriptionSet> {
            Ok(self.rows.lock().unwrap().get(id).cloned().unwrap_or_default())
        }
        async fn put(&self, id: &SubscriberId, set: SubscriptionSet) -> Result<()> {
            self.rows.lock().unwrap().insert(id.clone(), set);
            Ok(())
        }
        async fn delete(&self, id: &SubscriberId) -> Result<()> {
            self.rows.lock().unwrap().remove(id);
            Ok(())
        }
        fn fold(&self, f: &mut dyn FnMut(&SubscriberId, &SubscriptionSet)) {
            for (id, set) in self.rows.lock().unwrap().iter() {
                f(id, set);
            }
        }
        fn size(&self) -> usize {
            self.rows.lock().unwrap().len()
        }
    }

    struct FakeRetained {
        count: usize,
    }

    #[async_trait]
    impl RetainedStore for FakeRetained {
        async fn insert(&self, _m: &str, _t: &str, _p: Bytes) -> Result<()> {
            Ok(())
        }
        async fn delete(&self, _m: &str, _t: &str) -> Result<()> {
            Ok(())
        }
        fn match_fold(&self, _m: &str, _f: &str, _cb: &mut dyn FnMut(&str, &Bytes)) {}
        fn size(&self) -> usize {
            self.count
        }
    }

    fn introspection(store: Arc<dyn MetadataStore>, retained_count: usize) -> Introspection {
        let gate = Arc::new(AdmissionGate::new(100, 100));
        Introspection::new(
            NodeId("n1".into()),
            Arc::new(SessionTable::new()),
            SubscriptionStore::new(store, gate.clone()),
            Arc::new(FakeRetained { count: retained_count }),
            gate,
        )
    }

    #[test]
    fn empty_registry_reports_zero_everywhere() {
        let view = introspection(Arc::new(MemStore { rows: Mutex::new(HashMap::new()) }), 0);
        assert_eq!(view.client_stats(), (0, 0, 0));
        assert_eq!(view.total_sessions(), 0);
        assert_eq!(view.total_subscriptions(), 0);
        assert_eq!(view.retained(), 0);
    }

    #[tokio::test]
    async fn stored_reads_zero_when_no_queue_for_id() {
        let view = introspection(Arc::new(MemStore { rows: Mutex::new(HashMap::new()) }), 0);
        let id = SubscriberId::new("", b"c1".to_vec());
        assert_eq!(view.stored(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stored_reads_live_queue_depth() {
        let table = Arc::new(SessionTable::new());
        let id = SubscriberId::new("", b"c1".to_vec());
        let handle: QueueHandleRef = Arc::new(FakeQueue { depth: 7 });
        table.insert_row(
            id.clone(),
            SessionRow { subscriber_id: id.clone(), queue_handle: handle, liveness_token: 1, last_seen: 0, balance: false, clean: false },
        );
        let gate = Arc::new(AdmissionGate::new(100, 100));
        let view = Introspection::new(
            NodeId("n1".into()),
            table,
            SubscriptionStore::new(Arc::new(MemStore { rows: Mutex::new(HashMap::new()) }), gate.clone()),
            Arc::new(FakeRetained { count: 0 }),
            gate,
        );
        assert_eq!(view.stored(&id).await.unwrap(), 7);
    }

    #[test]
    fn admission_stats_reports_granted_and_rejected_for_a_bucket() {
        let gate = Arc::new(AdmissionGate::new(1, 0));
        let _first = gate.acquire("b").unwrap();
        assert!(gate.acquire("b").is_err());
        let view = Introspection::new(
            NodeId("n1".into()),
            Arc::new(SessionTable::new()),
            SubscriptionStore::new(Arc::new(MemStore { rows: Mutex::new(HashMap::new()) }), gate.clone()),
            Arc::new(FakeRetained { count: 0 }),
            gate,
        );
        assert_eq!(view.admission_stats("b"), (1, 1));
        assert_eq!(view.admission_stats("unused"), (0, 0));
    }

    #[test]
    fn fold_subscribers_splits_local_and_remote_by_owner_node() {
        let mut rows = HashMap::new();
        let id = SubscriberId::new("", b"c1".to_vec());
        let mut set = SubscriptionSet::new();
        set.insert(SubscriptionEntry { topic: "a/b".into(), qos: Qos::AtMostOnce, owner_node: NodeId("n1".into()) });
        set.insert(SubscriptionEntry { topic: "c/d".into(), qos: Qos::AtLeastOnce, owner_node: NodeId("n2".into()) });
        rows.insert(id, set);
        let view = introspection(Arc::new(MemStore { rows: Mutex::new(rows) }), 0);

        let (local, remote) = view.fold_subscribers((0, 0), |(l, r), _topic, target| match target {
            SubscriberTarget::Local(..) => (l + 1, r),
            SubscriberTarget::Remote(..) => (l, r + 1),
        });
        assert_eq!((local, remote), (1, 1));
    }
}
