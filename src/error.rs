use derive_more::From;
use std::fmt;

use crate::id::SubscriberId;

/// Error taxonomy of the registry (spec §7). These are values callers
/// branch on, not an exhaustive panic-on-the-rest hierarchy: a session
/// front end maps `NotAllowed`/`Overloaded`/`NotReady` directly to an
/// MQTT ack failure code.
#[derive(Debug, From)]
pub enum Error {
    /// Auth chain refused the subscribe.
    NotAllowed,
    /// Admission gate rejected the operation; bucket is saturated.
    Overloaded,
    /// Cluster not ready and `trade_consistency = false`.
    NotReady,
    /// Lookup for a session/queue that has no row. Used internally as
    /// a silent drop in publish fan-out; surfaced to callers who ask
    /// for a specific id's queue directly.
    NotFound(SubscriberId),
    /// Plugin-export factory rejected a config value. Fatal to the
    /// caller, not retried.
    #[from(ignore)]
    InvalidConfig(String),
    #[from(ignore)]
    InvalidTopic(String),
    /// A named external collaborator (auth chain, metadata store,
    /// retained store, register leader, remote-publish) returned an
    /// error. The registry has no supervisor restart logic for these;
    /// they propagate.
    #[from(ignore)]
    Collaborator(String),
    /// A cross-node RPC (remap, migrate, register) did not complete
    /// within the configured timeout (§5d). Treated the same as "peer
    /// had no queue" by callers that can tolerate it.
    Timeout,
    AllSendersDown,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotAllowed => write!(f, "not allowed"),
            Error::Overloaded => write!(f, "overloaded"),
            Error::NotReady => write!(f, "not ready"),
            Error::NotFound(id) => write!(f, "no session/queue for {}", id),
            Error::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            Error::InvalidTopic(msg) => write!(f, "invalid topic: {}", msg),
            Error::Collaborator(msg) => write!(f, "collaborator error: {}", msg),
            Error::Timeout => write!(f, "timed out"),
            Error::AllSendersDown => write!(f, "all senders down"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
