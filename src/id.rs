use std::fmt;

/// Identifies a subscriber within a routing namespace.
///
/// Equality is structural on `(mountpoint, client_id)` and this is the
/// primary key of both the subscription store (§4.2) and the session
/// table (§4.3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId {
    pub mountpoint: String,
    pub client_id: Vec<u8>,
}

impl SubscriberId {
    pub fn new(mountpoint: impl Into<String>, client_id: impl Into<Vec<u8>>) -> SubscriberId {
        SubscriberId { mountpoint: mountpoint.into(), client_id: client_id.into() }
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.client_id) {
            Ok(s) => write!(f, "{}/{}", self.mountpoint, s),
            Err(_) => write!(f, "{}/{:?}", self.mountpoint, self.client_id),
        }
    }
}

/// Opaque identifier for a cluster member, used as `owner_node` on
/// subscription records and as the target of remote-publish/migration
/// RPCs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn equal_subscriber_ids_are_structural() {
        let a = SubscriberId::new("", b"c1".to_vec());
        let b = SubscriberId::new("", b"c1".to_vec());
        assert_eq!(a, b);
    }

    #[test]
    fn different_mountpoints_are_distinct() {
        let a = SubscriberId::new("tenant-a", b"c1".to_vec());
        let b = SubscriberId::new("tenant-b", b"c1".to_vec());
        assert_ne!(a, b);
    }
}
