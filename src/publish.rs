//! C7 — publish router. Dispatches a publish per the table in spec
//! §4.7: retain handling crossed with the trade-consistency/readiness
//! matrix, then fan-out over the routing view. Mirrors the teacher's
//! `router/mod.rs` `route`/`fill_and_track`/`forward` split: decide
//! what to do with the message, then walk the live targets and push
//! to each one, logging and continuing on a per-target failure
//! instead of aborting the whole publish.

use std::sync::Arc;

use bytes::Bytes;

use crate::collaborators::ClusterOracle;
use crate::error::{Error, Result};
use crate::metadata::Qos;
use crate::queue::QueuedMessage;
use crate::reg_view::{RouteTarget, RoutingView};
use crate::retained::RetainedStore;
use crate::session_table::SessionTable;

#[derive(Debug, Clone)]
pub struct Message {
    pub trade_consistency: bool,
    pub mountpoint: String,
    pub routing_key: String,
    pub payload: Bytes,
    pub retain: bool,
}

pub struct PublishRouter {
    table: Arc<SessionTable>,
    oracle: Arc<dyn ClusterOracle>,
    retained: Arc<dyn RetainedStore>,
}

impl PublishRouter {
    pub fn new(table: Arc<SessionTable>, oracle: Arc<dyn ClusterOracle>, retained: Arc<dyn RetainedStore>) -> PublishRouter {
        PublishRouter { table, oracle, retained }
    }

    /// `publish(msg)` (spec §4.7). `reg_view` is passed in rather than
    /// held by the router so a caller may substitute a different
    /// routing view per mountpoint if it wants to (DESIGN NOTES:
    /// "Dynamic `reg_view` module").
    pub async fn publish(&self, msg: Message, reg_view: &dyn RoutingView) -> Result<()> {
        let ready = self.oracle.is_ready();

        if !msg.trade_consistency && !ready {
            return Err(Error::NotReady);
        }

        if msg.retain {
            if msg.payload.is_empty() {
                self.retained.delete(&msg.mountpoint, &msg.routing_key).await?;
                return Ok(());
            } else {
                self.retained.insert(&msg.mountpoint, &msg.routing_key, msg.payload.clone()).await?;
                let mut fanout_msg = msg.clone();
                fanout_msg.retain = false;
                return self.fan_out(&fanout_msg, reg_view).await;
            }
        }

        self.fan_out(&msg, reg_view).await
    }

    async fn fan_out(&self, msg: &Message, reg_view: &dyn RoutingView) -> Result<()> {
        let mut targets = Vec::new();
        reg_view.fold(&msg.mountpoint, &msg.routing_key, &mut |t| {
            targets.push(match t {
                RouteTarget::Local(id, qos) => RouteTarget::Local(id.clone(), *qos),
                RouteTarget::Remote(n) => RouteTarget::Remote(n.clone()),
            });
        });

        for target in targets {
            match target {
                RouteTarget::Local(id, qos) => self.deliver_local(&id, qos, msg).await,
                RouteTarget::Remote(node) => {
                    if let Err(e) = self.oracle.publish_to_remote(&node, msg).await {
                        log::warn!("remote publish to {} failed: {}", node, e);
                    }
                }
            }
        }

        Ok(())
    }

    async fn deliver_local(&self, id: &crate::id::SubscriberId, qos: Qos, msg: &Message) {
        match self.table.get_queue_pid(id) {
            Ok(handle) => {
                let queued = QueuedMessage { routing_key: msg.routing_key.clone(), payload: msg.payload.clone(), qos, retain: msg.retain, dup: false };
                if let Err(e) = handle.enqueue(queued).await {
                    log::warn!("enqueue to {} failed: {}", id, e);
                }
            }
            Err(Error::NotFound(_)) => {
                // Record not yet propagated, or torn down after the fold snapshot. Drop silently (§4.7).
            }
            Err(e) => log::warn!("local delivery lookup for {} failed: {}", id, e),
        }
    }
}
