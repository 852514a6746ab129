//! C4 — queue supervisor interface. The registry never buffers
//! messages itself; it holds a handle to an external per-subscriber
//! queue actor (spec §4.4) and drives it through this trait. Mirrors
//! the teacher's channel-handle style in `router/mod.rs`
//! (`Sender<RouterMessage>` stashed on `ActiveConnection`), generalized
//! from an in-process mpsc sender to an opaque actor reference since
//! the queue process here is an external collaborator.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::id::SubscriberId;
use crate::metadata::Qos;

/// Delivery mode set via `set_opts` (spec §4.8 multi-session mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverMode {
    /// Every attached session gets every message.
    Fanout,
    /// Messages are balanced round-robin across attached sessions.
    Balance,
}

#[derive(Debug, Clone)]
pub enum QueueOpt {
    DeliverMode(DeliverMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Active,
    Draining,
    Dead,
}

/// What a freshly delivered item looks like once the registry has
/// decided to enqueue it (subscribe-time retained replay, §4.6.1, or
/// a live publish fan-out, §4.7).
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub routing_key: String,
    pub payload: bytes::Bytes,
    pub qos: Qos,
    pub retain: bool,
    pub dup: bool,
}

/// A live per-subscriber queue actor. `liveness_token` is the nonce
/// that lets a late death notification be told apart from a fresh
/// restart of the same subscriber id (DESIGN NOTES, "Liveness
/// monitoring").
#[async_trait]
pub trait QueueHandle: Send + Sync {
    fn liveness_token(&self) -> u64;
    async fn add_session(&self, session_ref: &SubscriberId, clean: bool, queue_present: bool) -> Result<()>;
    async fn set_opts(&self, opts: &[QueueOpt]) -> Result<()>;
    async fn enqueue(&self, msg: QueuedMessage) -> Result<()>;
    /// Transfer this queue's buffered messages and session references
    /// into `other`, then terminate self (§4.8 step 3: the old node's
    /// queue hands off to the newly registered owner and dies).
    async fn migrate(&self, other: Arc<dyn QueueHandle>) -> Result<()>;
    async fn get_sessions(&self) -> Result<Vec<SubscriberId>>;
    async fn status(&self) -> Result<(QueueState, usize)>;
    fn active(&self) -> bool;
    async fn notify(&self);
}

pub type QueueHandleRef = Arc<dyn QueueHandle>;

impl fmt::Debug for dyn QueueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueueHandle(token={})", self.liveness_token())
    }
}
