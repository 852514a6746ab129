//! The topic-routing view: spec §1 lists `fold(mountpoint, topic, f,
//! acc)` as an out-of-scope external collaborator, and §9 DESIGN NOTES
//! calls for modeling the dynamic `reg_view` module selection as "a
//! narrow trait/interface... The default implementation is a topic
//! trie." `RoutingView` is that trait seam; `TrieRoutingView` is a
//! minimal default so the crate is runnable standalone, not a
//! hardened matching engine — full retained/topic-tree matching
//! algorithms remain the Non-goal spec.md §1 names. It generalizes the
//! teacher's `router/connection.rs` concrete-vs-wildcard subscription
//! split into a per-segment trie instead of a flat map-of-filters.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::id::NodeId;
use crate::metadata::Qos;
use crate::id::SubscriberId;

/// One hit produced by a routing-view fold (spec §4.7): either a
/// local subscriber this node must deliver to directly, or a remote
/// node that has matching subscribers of its own.
pub enum RouteTarget {
    Local(SubscriberId, Qos),
    Remote(NodeId),
}

pub trait RoutingView: Send + Sync {
    fn fold(&self, mountpoint: &str, topic: &str, visit: &mut dyn FnMut(&RouteTarget));
}

#[derive(Default)]
struct TrieNode {
    children: HashMap<String, TrieNode>,
    plus: Option<Box<TrieNode>>,
    hash: Vec<(SubscriberId, Qos, NodeId)>,
    here: Vec<(SubscriberId, Qos, NodeId)>,
}

/// The default `reg_view` (spec §6 `default_reg_view: module =
/// trie_view`). Rebuilt wholesale from the subscription store on
/// `rebuild` rather than incrementally maintained — the registry
/// itself only needs read access for fan-out; keeping the store as
/// the source of truth avoids a second place subscription records can
/// drift from.
pub struct TrieRoutingView {
    this_node: NodeId,
    roots: Mutex<HashMap<String, TrieNode>>,
}

impl TrieRoutingView {
    pub fn new(this_node: NodeId) -> TrieRoutingView {
        TrieRoutingView { this_node, roots: Mutex::new(HashMap::new()) }
    }

    /// Replace the view's contents with `entries`, one row per
    /// `(mountpoint, subscriber_id, topic, qos, owner_node)`.
    pub fn rebuild<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, SubscriberId, String, Qos, NodeId)>,
    {
        let mut roots = HashMap::new();
        for (mountpoint, id, topic, qos, node) in entries {
            let root = roots.entry(mountpoint).or_insert_with(TrieNode::default);
            insert(root, topic.split('/'), id, qos, node);
        }
        *self.roots.lock().unwrap() = roots;
    }
}

fn insert<'a>(node: &mut TrieNode, mut segs: impl Iterator<Item = &'a str>, id: SubscriberId, qos: Qos, owner: NodeId) {
    match segs.next() {
        None => node.here.push((id, qos, owner)),
        Some("#") => node.hash.push((id, qos, owner)),
        Some(seg) => {
            let child = node.children.entry(seg.to_string()).or_insert_with(TrieNode::default);
            insert(child, segs, id, qos, owner);
        }
    }
}

fn walk<'a>(node: &TrieNode, mut segs: impl Iterator<Item = &'a str> + Clone, this_node: &NodeId, visit: &mut dyn FnMut(&RouteTarget)) {
    for (id, qos, owner) in &node.hash {
        emit(id, *qos, owner, this_node, visit);
    }

    match segs.next() {
        None => {
            for (id, qos, owner) in &node.here {
                emit(id, *qos, owner, this_node, visit);
            }
        }
        Some(seg) => {
            if let Some(child) = node.children.get(seg) {
                walk(child, segs.clone(), this_node, visit);
            }
            if let Some(plus) = node.children.get("+") {
                walk(plus, segs, this_node, visit);
            }
        }
    }
}

fn emit(id: &SubscriberId, qos: Qos, owner: &NodeId, this_node: &NodeId, visit: &mut dyn FnMut(&RouteTarget)) {
    if owner == this_node {
        visit(&RouteTarget::Local(id.clone(), qos));
    } else {
        visit(&RouteTarget::Remote(owner.clone()));
    }
}

impl RoutingView for TrieRoutingView {
    fn fold(&self, mountpoint: &str, topic: &str, visit: &mut dyn FnMut(&RouteTarget)) {
        let roots = self.roots.lock().unwrap();
        if let Some(root) = roots.get(mountpoint) {
            walk(root, topic.split('/'), &self.this_node, visit);
        }
    }
}
