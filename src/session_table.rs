//! C3 — the node-local live-session table. Concurrent multimap keyed
//! by `SubscriberId`, bag semantics per key to support "allow multiple
//! sessions" (spec §3, §4.3). Grounded on the pack's
//! `mesquitte-mesquitte` `GlobalState`, which keys an MQTT broker's
//! client table with `DashMap` for wait-free concurrent reads while a
//! single logical owner performs inserts/removes — here that owner is
//! the registry coordinator (C5); nothing outside `coordinator.rs`
//! should call the `insert_row`/`remove_*` methods below.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::id::SubscriberId;
use crate::queue::QueueHandleRef;

/// One row of the session table (spec §3). `clean` mirrors the MQTT
/// clean-session flag the session connected with; `balance` records
/// whether this session opted into balanced delivery in multi-session
/// mode.
#[derive(Clone)]
pub struct SessionRow {
    pub subscriber_id: SubscriberId,
    pub queue_handle: QueueHandleRef,
    pub liveness_token: u64,
    pub last_seen: u64,
    pub balance: bool,
    pub clean: bool,
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[derive(Default)]
pub struct SessionTable {
    rows: DashMap<SubscriberId, Vec<SessionRow>>,
}

impl SessionTable {
    pub fn new() -> SessionTable {
        SessionTable { rows: DashMap::new() }
    }

    /// `get_queue_pid(id)`: first row's handle, or `NotFound` (§4.3).
    pub fn get_queue_pid(&self, id: &SubscriberId) -> Result<QueueHandleRef> {
        match self.rows.get(id) {
            Some(rows) if !rows.is_empty() => Ok(rows[0].queue_handle.clone()),
            _ => Err(Error::NotFound(id.clone())),
        }
    }

    pub fn rows_for(&self, id: &SubscriberId) -> Vec<SessionRow> {
        self.rows.get(id).map(|r| r.clone()).unwrap_or_default()
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.rows.get(id).map(|r| !r.is_empty()).unwrap_or(false)
    }

    /// Coordinator-only: append a row for `id`. Caller is responsible
    /// for upholding I1 (every row of a key shares the same handle).
    pub(crate) fn insert_row(&self, id: SubscriberId, row: SessionRow) {
        self.rows.entry(id).or_insert_with(Vec::new).push(row);
    }

    /// Coordinator-only: replace all rows for `id` with a single fresh
    /// one (used by `ensure_queue` when no row existed yet).
    pub(crate) fn set_rows(&self, id: SubscriberId, rows: Vec<SessionRow>) {
        if rows.is_empty() {
            self.rows.remove(&id);
        } else {
            self.rows.insert(id, rows);
        }
    }

    /// Coordinator-only: queue-death eviction. Removes every row
    /// across every key matching `(handle, token)` (§4.5).
    pub(crate) fn remove_dead(&self, token: u64, handle: &QueueHandleRef) {
        let mut emptied = Vec::new();
        for mut entry in self.rows.iter_mut() {
            entry.value_mut().retain(|row| {
                !(row.liveness_token == token && Arc::ptr_eq(&row.queue_handle, handle))
            });
            if entry.value().is_empty() {
                emptied.push(entry.key().clone());
            }
        }
        for id in emptied {
            self.rows.remove(&id);
        }
    }

    pub fn total_sessions(&self) -> usize {
        self.rows.iter().map(|r| r.value().len()).sum()
    }

    /// `(total, active, inactive)` where inactive = rows whose
    /// liveness token is the sentinel `0` (detached placeholder row),
    /// used by C9's `client_stats`.
    pub fn client_stats(&self) -> (usize, usize, usize) {
        let mut active = 0;
        let mut inactive = 0;
        for entry in self.rows.iter() {
            for row in entry.value() {
                if row.liveness_token == 0 {
                    inactive += 1;
                } else {
                    active += 1;
                }
            }
        }
        (active + inactive, active, inactive)
    }

    pub fn fold<B>(&self, init: B, mut f: impl FnMut(B, &SessionRow) -> B) -> B {
        let mut acc = init;
        for entry in self.rows.iter() {
            for row in entry.value() {
                acc = f(acc, row);
            }
        }
        acc
    }
}
