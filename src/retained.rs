//! Retained-message store collaborator (out of scope, §1): the
//! matching algorithm and persistence live outside the registry. This
//! module only states the interface C6 (retained replay) and C7
//! (publish) drive.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

#[async_trait]
pub trait RetainedStore: Send + Sync {
    /// `insert` — empty payload is never passed here; callers route
    /// empty-payload retains to `delete` instead (spec §4.7).
    async fn insert(&self, mountpoint: &str, topic: &str, payload: Bytes) -> Result<()>;
    async fn delete(&self, mountpoint: &str, topic: &str) -> Result<()>;
    /// Walk every retained `(topic, payload)` in `mountpoint` whose
    /// topic matches `filter` under MQTT wildcard rules, folding `f`
    /// over each hit.
    fn match_fold(&self, mountpoint: &str, filter: &str, f: &mut dyn FnMut(&str, &Bytes));
    fn size(&self) -> usize;
}
