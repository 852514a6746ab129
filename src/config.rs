use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Registry-wide configuration (spec §6). Per-call flags
/// (`trade_consistency`, `allow_multiple_sessions`, `balance_sessions`)
/// are also accepted as explicit parameters on the mutating APIs —
/// this struct only supplies their defaults plus the knobs spec.md
/// leaves to "configuration" without naming a call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// When true, subscribe/unsubscribe/publish do not wait for
    /// cluster readiness.
    pub trade_consistency: bool,
    /// Queue bound passed to newly created queues.
    pub max_queued_messages: usize,
    /// Registration-time default: allow more than one session to
    /// share a subscriber id's queue.
    pub allow_multiple_sessions: bool,
    /// Registration-time default: balance deliveries across sessions
    /// sharing a queue (only meaningful when `allow_multiple_sessions`).
    pub balance_sessions: bool,
    /// Admission gate bucket capacity (tokens).
    pub admission_bucket_size: u32,
    /// Admission gate refill rate (tokens/second).
    pub admission_refill_per_sec: u32,
    /// Backoff between retries for callers that must eventually
    /// succeed (clean-session delete during registration, remap).
    pub overload_retry_backoff: Duration,
    /// Per-peer timeout for migration/registration RPCs (§5d).
    pub migrate_rpc_timeout: Duration,
    /// Poll interval for `wait_til_ready`.
    pub ready_poll_interval: Duration,
    /// Name of the default routing view a caller should build if it
    /// doesn't supply its own `RoutingView` (spec §6: `default_reg_view:
    /// module = trie_view`).
    pub default_reg_view: String,
}

impl Default for RegistryConfig {
    fn default() -> RegistryConfig {
        RegistryConfig {
            trade_consistency: false,
            max_queued_messages: 1000,
            allow_multiple_sessions: false,
            balance_sessions: false,
            admission_bucket_size: 1000,
            admission_refill_per_sec: 1000,
            overload_retry_backoff: Duration::from_millis(100),
            migrate_rpc_timeout: Duration::from_secs(5),
            ready_poll_interval: Duration::from_millis(100),
            default_reg_view: "trie_view".to_string(),
        }
    }
}
