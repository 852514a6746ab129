//! C2 — subscription store adapter: a thin façade over the replicated
//! metadata store, keyed by `SubscriberId`, wrapped by the admission
//! gate on every call. Mirrors the adapter shape of the teacher's
//! `router/commitlog.rs` (a small owned struct hiding the storage
//! detail behind `fill`/`get`), generalized to an external, replicated
//! collaborator instead of an in-process log.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::admission::AdmissionGate;
use crate::error::{Error, Result};
use crate::id::{NodeId, SubscriberId};

/// MQTT QoS level. The registry never interprets delivery semantics
/// beyond this tag (qos 1/2 guarantees are the queue's job, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Qos {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

/// One tuple of a subscription record: `(topic, qos, owner_node)`.
/// Set semantics, unique by the full triple (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionEntry {
    pub topic: String,
    pub qos: Qos,
    pub owner_node: NodeId,
}

pub type SubscriptionSet = HashSet<SubscriptionEntry>;

/// A store-level change, already diffed against the previous value so
/// that tombstone⇄undefined transitions are suppressed (§4.2).
#[derive(Debug, PartialEq, Eq)]
pub enum SubscriptionChange {
    Updated { id: SubscriberId, removed: SubscriptionSet, added: SubscriptionSet },
    Deleted { id: SubscriberId, old: SubscriptionSet },
}

/// The replicated metadata store collaborator (out of scope, §1):
/// last-writer-wins at read time, tombstone sentinel for deletes.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, id: &SubscriberId) -> Result<SubscriptionSet>;
    async fn put(&self, id: &SubscriberId, set: SubscriptionSet) -> Result<()>;
    async fn delete(&self, id: &SubscriberId) -> Result<()>;
    /// Iterate every non-tombstone entry, LWW-resolved.
    fn fold(&self, f: &mut dyn FnMut(&SubscriberId, &SubscriptionSet));
    fn size(&self) -> usize;
    /// Raw change feed backing `SubscriptionStore::subscribe_changes`
    /// (spec §4.2): `None` is a tombstone/delete, `Some(set)` a
    /// full-replacement put. Collaborators with no live feed may leave
    /// this at its default, an empty channel that never yields.
    fn subscribe_raw(&self) -> mpsc::Receiver<(SubscriberId, Option<SubscriptionSet>)> {
        let (_tx, rx) = mpsc::channel(1);
        rx
    }
}

/// C2 itself: every operation funnels through the admission gate
/// before touching the store (spec §4.2). Cheap to clone — both
/// fields are `Arc`s, so every collaborator that needs a
/// `SubscriptionStore` shares the same underlying store and gate.
#[derive(Clone)]
pub struct SubscriptionStore {
    store: Arc<dyn MetadataStore>,
    gate: Arc<AdmissionGate>,
}

impl SubscriptionStore {
    pub fn new(store: Arc<dyn MetadataStore>, gate: Arc<AdmissionGate>) -> SubscriptionStore {
        SubscriptionStore { store, gate }
    }

    /// Absent/tombstone reads as empty — callers never need to special-case it.
    pub async fn get(&self, id: &SubscriberId) -> Result<SubscriptionSet> {
        let _permit = self.gate.acquire("subscription_store")?;
        match self.store.get(id).await {
            Ok(set) => Ok(set),
            Err(Error::NotFound(_)) => Ok(SubscriptionSet::new()),
            Err(e) => Err(e),
        }
    }

    /// Full-replacement write.
    pub async fn put(&self, id: &SubscriberId, set: SubscriptionSet) -> Result<()> {
        let _permit = self.gate.acquire("subscription_store")?;
        self.store.put(id, set).await
    }

    /// Tombstone. Callers that must succeed eventually (clean-session
    /// teardown, §4.1) retry on `Overloaded` with the configured
    /// backoff; this method itself fails fast once.
    pub async fn delete(&self, id: &SubscriberId) -> Result<()> {
        let _permit = self.gate.acquire("subscription_store")?;
        self.store.delete(id).await
    }

    pub fn fold<B>(&self, init: B, mut f: impl FnMut(B, &SubscriberId, &SubscriptionSet) -> B) -> B {
        let mut acc = Some(init);
        self.store.fold(&mut |id, set| {
            acc = Some(f(acc.take().unwrap(), id, set));
        });
        acc.unwrap()
    }

    pub fn size(&self) -> usize {
        self.store.size()
    }

    /// `subscribe_changes()` (spec §4.2): diffs the raw store feed into
    /// `{Updated, removed, added}` / `{Deleted, old}` events, suppressing
    /// a tombstone for an id this stream never saw a put for (an
    /// undefined⇄tombstone transition carries no information for a
    /// subscriber to react to).
    pub fn subscribe_changes(&self) -> mpsc::Receiver<SubscriptionChange> {
        let mut raw = self.store.subscribe_raw();
        let (tx, rx) = mpsc::channel(128);
        tokio::spawn(async move {
            let mut last: HashMap<SubscriberId, SubscriptionSet> = HashMap::new();
            while let Some((id, new)) = raw.recv().await {
                match new {
                    None => {
                        if let Some(old) = last.remove(&id) {
                            if tx.send(SubscriptionChange::Deleted { id, old }).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(set) => {
                        let old = last.get(&id).cloned().unwrap_or_default();
                        if set == old {
                            continue;
                        }
                        let removed: SubscriptionSet = old.difference(&set).cloned().collect();
                        let added: SubscriptionSet = set.difference(&old).cloned().collect();
                        last.insert(id.clone(), set);
                        if tx.send(SubscriptionChange::Updated { id, removed, added }).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        rx
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::admission::AdmissionGate;
    use std::sync::Mutex;

    struct MemStore {
        rows: Mutex<std::collections::HashMap<SubscriberId, SubscriptionSet>>,
    }

    impl MemStore {
        fn new() -> MemStore {
            MemStore { rows: Mutex::new(std::collections::HashMap::new()) }
        }
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

    #[tokio::test]
    async fn absent_reads_as_empty() {
        let gate = Arc::new(AdmissionGate::new(10, 10));
        let store = SubscriptionStore::new(Arc::new(MemStore::new()), gate);
        let id = SubscriberId::new("", b"c1".to_vec());
        assert!(store.get(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let gate = Arc::new(AdmissionGate::new(10, 10));
        let store = SubscriptionStore::new(Arc::new(MemStore::new()), gate);
        let id = SubscriberId::new("", b"c1".to_vec());
        let mut set = SubscriptionSet::new();
        set.insert(SubscriptionEntry { topic: "a/b".into(), qos: Qos::AtLeastOnce, owner_node: NodeId("n1".into()) });
        store.put(&id, set.clone()).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), set);
    }

    fn entry(topic: &str) -> SubscriptionEntry {
        SubscriptionEntry { topic: topic.into(), qos: Qos::AtMostOnce, owner_node: NodeId("n1".into()) }
    }

    #[tokio::test]
    async fn subscribe_changes_suppresses_tombstone_for_an_id_never_put() {
        let (raw_tx, raw_rx) = mpsc::channel(8);
        let gate = Arc::new(AdmissionGate::new(10, 10));
        struct Wired(Mutex<Option<mpsc::Receiver<(SubscriberId, Option<SubscriptionSet>)>>>);
        #[async_trait]
        impl MetadataStore for Wired {
            async fn get(&self, _id: &SubscriberId) -> Result<SubscriptionSet> {
                Ok(SubscriptionSet::new())
            }
            async fn put(&self, _id: &SubscriberId, _set: SubscriptionSet) -> Result<()> {
                Ok(())
            }
            async fn delete(&self, _id: &SubscriberId) -> Result<()> {
                Ok(())
            }
            fn fold(&self, _f: &mut dyn FnMut(&SubscriberId, &SubscriptionSet)) {}
            fn size(&self) -> usize {
                0
            }
            fn subscribe_raw(&self) -> mpsc::Receiver<(SubscriberId, Option<SubscriptionSet>)> {
                self.0.lock().unwrap().take().expect("subscribe_raw called once")
            }
        }
        let store = SubscriptionStore::new(Arc::new(Wired(Mutex::new(Some(raw_rx)))), gate);

        let mut changes = store.subscribe_changes();
        let id = SubscriberId::new("", b"c1".to_vec());
        raw_tx.send((id.clone(), None)).await.unwrap();
        drop(raw_tx);

        assert!(changes.recv().await.is_none());
    }

    #[tokio::test]
    async fn subscribe_changes_diffs_put_into_added_and_removed() {
        let (raw_tx, raw_rx) = mpsc::channel(8);
        let gate = Arc::new(AdmissionGate::new(10, 10));
        struct Wired(Mutex<Option<mpsc::Receiver<(SubscriberId, Option<SubscriptionSet>)>>>);
        #[async_trait]
        impl MetadataStore for Wired {
            async fn get(&self, _id: &SubscriberId) -> Result<SubscriptionSet> {
                Ok(SubscriptionSet::new())
            }
            async fn put(&self, _id: &SubscriberId, _set: SubscriptionSet) -> Result<()> {
                Ok(())
            }
            async fn delete(&self, _id: &SubscriberId) -> Result<()> {
                Ok(())
            }
            fn fold(&self, _f: &mut dyn FnMut(&SubscriberId, &SubscriptionSet)) {}
            fn size(&self) -> usize {
                0
            }
            fn subscribe_raw(&self) -> mpsc::Receiver<(SubscriberId, Option<SubscriptionSet>)> {
                self.0.lock().unwrap().take().expect("subscribe_raw called once")
            }
        }
        let store = SubscriptionStore::new(Arc::new(Wired(Mutex::new(Some(raw_rx)))), gate);

        let mut changes = store.subscribe_changes();
        let id = SubscriberId::new("", b"c2".to_vec());

        let mut first = SubscriptionSet::new();
        first.insert(entry("a"));
        raw_tx.send((id.clone(), Some(first))).await.unwrap();

        let mut second = SubscriptionSet::new();
        second.insert(entry("b"));
        raw_tx.send((id.clone(), Some(second))).await.unwrap();

        match changes.recv().await.unwrap() {
            SubscriptionChange::Updated { removed, added, .. } => {
                assert!(removed.is_empty());
                assert!(added.contains(&entry("a")));
            }
            other => panic!("expected Updated, got {:?}", other),
        }

        match changes.recv().await.unwrap() {
            SubscriptionChange::Updated { removed, added, .. } => {
                assert!(removed.contains(&entry("a")));
                assert!(added.contains(&entry("b")));
            }
            other => panic!("expected Updated, got {:?}", other),
        }
    }
}
