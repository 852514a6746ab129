//! C5 — registry coordinator. A single-writer actor owning the
//! session table: every mutation is a request on an mpsc channel
//! served strictly in arrival order, which is what makes
//! `ensure_queue` single-flight per `SubscriberId` without any
//! per-key locking (spec §4.5, §5). Directly modeled on the teacher's
//! `router/mod.rs::Router::start` — a `tokio::select!` loop reading a
//! single `Receiver` and owning all mutable state itself, with reads
//! served off the side (here, off `SessionTable`'s `DashMap` instead
//! of the teacher's private `HashMap`).

use std::sync::Arc;

use derive_more::From;
use tokio::sync::{mpsc, oneshot};

use crate::collaborators::QueueSupervisor;
use crate::error::{Error, Result};
use crate::id::SubscriberId;
use crate::queue::QueueHandleRef;
use crate::session_table::{now_secs, SessionRow, SessionTable};

/// Requests the coordinator serves. Mirrors the teacher's
/// `RouterMessage` enum shape (one request type dispatched in a
/// `select!`/`match`).
pub enum CoordinatorRequest {
    EnsureQueue { id: SubscriberId, reply: oneshot::Sender<Result<QueueHandleRef>> },
    /// Append a bag row for a session sharing an already-ensured queue
    /// (multi-session mode, and exclusive-mode registration's own
    /// winning-node session row, §4.8).
    AddSessionRow { id: SubscriberId, row: SessionRow, reply: oneshot::Sender<()> },
    QueueDeath { token: u64, handle: QueueHandleRef },
}

#[derive(Debug, From)]
pub enum CoordinatorError {
    AllSendersDown,
}

/// Handle held by every caller; cheap to clone, the mpsc sender is the
/// only thing it wraps (teacher's `Connection::handle` plays the same
/// role for the router).
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordinatorRequest>,
}

impl CoordinatorHandle {
    /// `ensure_queue(id)` (spec §4.5): if a row exists, its handle is
    /// returned without touching the supervisor; otherwise the
    /// coordinator starts one queue and installs exactly one row.
    /// Two concurrent callers for the same id are serialized by the
    /// single channel, so exactly one queue is ever created (P4).
    pub async fn ensure_queue(&self, id: SubscriberId) -> Result<QueueHandleRef> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .clone()
            .send(CoordinatorRequest::EnsureQueue { id, reply })
            .await
            .map_err(|_| Error::AllSendersDown)?;
        rx.await.map_err(|_| Error::AllSendersDown)?
    }

    /// Append an extra bag row for `id` sharing an already-ensured
    /// queue. Serialized through the same channel as `ensure_queue`
    /// so I1 (one queue handle per id) stays an invariant rather than
    /// a convention callers must uphold themselves.
    pub async fn add_session_row(&self, id: SubscriberId, row: SessionRow) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .clone()
            .send(CoordinatorRequest::AddSessionRow { id, row, reply })
            .await
            .map_err(|_| Error::AllSendersDown)?;
        rx.await.map_err(|_| Error::AllSendersDown)
    }

    /// Fire-and-forget notification that a queue actor died (spec
    /// §4.5). The coordinator purges every row keyed by `(token,
    /// handle)`; no reply is expected.
    pub async fn queue_died(&self, token: u64, handle: QueueHandleRef) {
        let _ = self.tx.clone().send(CoordinatorRequest::QueueDeath { token, handle }).await;
    }
}

/// The actor body. Owns the only mutating reference to `SessionTable`;
/// run this on its own task via `spawn`.
pub struct Coordinator {
    table: Arc<SessionTable>,
    supervisor: Arc<dyn QueueSupervisor>,
    rx: mpsc::Receiver<CoordinatorRequest>,
    self_handle: CoordinatorHandle,
}

impl Coordinator {
    pub fn new(
        table: Arc<SessionTable>,
        supervisor: Arc<dyn QueueSupervisor>,
    ) -> (Coordinator, CoordinatorHandle) {
        let (tx, rx) = mpsc::channel(1024);
        let self_handle = CoordinatorHandle { tx: tx.clone() };
        (Coordinator { table, supervisor, rx, self_handle }, CoordinatorHandle { tx })
    }

    pub async fn run(mut self) {
        while let Some(request) = self.rx.recv().await {
            match request {
                CoordinatorRequest::EnsureQueue { id, reply } => {
                    let result = self.ensure_queue(&id).await;
                    let _ = reply.send(result);
                }
                CoordinatorRequest::AddSessionRow { id, row, reply } => {
                    self.table.insert_row(id, row);
                    let _ = reply.send(());
                }
                CoordinatorRequest::QueueDeath { token, handle } => {
                    self.table.remove_dead(token, &handle);
                    log::info!("queue died, purged session rows (token={})", token);
                }
            }
        }
        log::info!("registry coordinator stopped: all senders dropped");
    }

    async fn ensure_queue(&mut self, id: &SubscriberId) -> Result<QueueHandleRef> {
        if let Ok(handle) = self.table.get_queue_pid(id) {
            return Ok(handle);
        }

        let handle = self.supervisor.start_queue(id).await?;
        let row = SessionRow {
            subscriber_id: id.clone(),
            queue_handle: handle.clone(),
            liveness_token: handle.liveness_token(),
            last_seen: now_secs(),
            balance: false,
            clean: false,
        };
        self.table.insert_row(id.clone(), row);
        self.watch_liveness(handle.clone());
        log::info!("queue created for {}", id);
        Ok(handle)
    }

    /// Installs a liveness watch on a freshly created queue (spec §4.5):
    /// a background task blocks on `QueueHandle::notify` and reports the
    /// death back to this same coordinator, so a dead queue's rows are
    /// purged without any caller having to poll for it.
    fn watch_liveness(&self, handle: QueueHandleRef) {
        let coordinator = self.self_handle.clone();
        tokio::spawn(async move {
            let token = handle.liveness_token();
            handle.notify().await;
            coordinator.queue_died(token, handle).await;
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::queue::{DeliverMode, QueueHandle, QueueOpt, QueueState, QueuedMessage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FakeQueue(u64);

    #[async_trait]
    impl QueueHandle for FakeQueue {
        fn liveness_token(&self) -> u64 {
            self.0
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
            Ok((QueueState::Active, 0))
        }
        fn active(&self) -> bool {
            true
        }
        async fn notify(&self) {
            std::future::pending::<()>().await
        }
    }

    struct CountingSupervisor {
        started: AtomicU64,
        next_token: AtomicU64,
    }

    #[async_trait]
    impl QueueSupervisor for CountingSupervisor {
        async fn start_queue(&self, _id: &SubscriberId) -> Result<QueueHandleRef> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let token = self.next_token.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FakeQueue(token)))
        }
    }

    #[tokio::test]
    async fn concurrent_ensure_queue_is_single_flight() {
        let table = Arc::new(SessionTable::new());
        let supervisor = Arc::new(CountingSupervisor { started: AtomicU64::new(0), next_token: AtomicU64::new(1) });
        let (coordinator, handle) = Coordinator::new(table, supervisor.clone());
        tokio::spawn(coordinator.run());

        let id = SubscriberId::new("", b"c1".to_vec());
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let handle = handle.clone();
            let id = id.clone();
            tasks.push(tokio::spawn(async move { handle.ensure_queue(id).await.unwrap() }));
        }

        let mut handles = Vec::new();
        for t in tasks {
            handles.push(t.await.unwrap());
        }

        assert_eq!(supervisor.started.load(Ordering::SeqCst), 1);
        let first_token = handles[0].liveness_token();
        for h in &handles {
            assert_eq!(h.liveness_token(), first_token);
        }
    }

    #[tokio::test]
    async fn queue_death_purges_matching_rows() {
        let table = Arc::new(SessionTable::new());
        let supervisor = Arc::new(CountingSupervisor { started: AtomicU64::new(0), next_token: AtomicU64::new(1) });
        let (coordinator, handle) = Coordinator::new(table.clone(), supervisor);
        tokio::spawn(coordinator.run());

        let id = SubscriberId::new("", b"c1".to_vec());
        let queue = handle.ensure_queue(id.clone()).await.unwrap();
        assert!(table.contains(&id));

        handle.queue_died(queue.liveness_token(), queue).await;
        tokio::time::delay_for(std::time::Duration::from_millis(20)).await;
        assert!(!table.contains(&id));
    }
}
