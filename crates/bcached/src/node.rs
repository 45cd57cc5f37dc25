//! Cache node: local cache API plus the transport-facing gossip callbacks

use bcache_core::{Batch, BoundedStore, Entry, GossipData, MergeEngine, PeerName};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Node errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Core error: {0}")]
    Core(#[from] bcache_core::Error),
}

/// Callbacks a gossip transport drives
pub trait Gossiper {
    /// Complete state for a periodic round
    fn gossip(&self) -> Batch;

    /// Peer answered or initiated a round: merge and return the delta to relay
    fn on_gossip(&self, payload: &[u8]) -> Result<Batch, NodeError>;

    /// Broadcast received: merge and return what was new, or `None` to stop the flood
    fn on_gossip_broadcast(&self, payload: &[u8]) -> Result<Option<Batch>, NodeError>;
}

/// A single cache replica
pub struct Node {
    engine: MergeEngine,
    /// Local writes not yet broadcast
    pending: Mutex<Batch>,
}

impl Node {
    /// Create a node with a fresh store of `max_keys` capacity
    pub fn new(peer: PeerName, max_keys: usize) -> Result<Self, NodeError> {
        let store = Arc::new(BoundedStore::new(max_keys)?);
        Ok(Self {
            engine: MergeEngine::new(store, peer),
            pending: Mutex::new(Batch::new()),
        })
    }

    pub fn peer(&self) -> PeerName {
        self.engine.peer()
    }

    /// Write locally and queue the write for the next broadcast.
    ///
    /// The queue holds at most as many keys as the store. Writes that do not
    /// fit are left to the next full-state round.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>, expiry: i64) {
        let key = key.into();
        let entry = Entry::new(value, expiry);
        let store = self.engine.store();
        if let Some(evicted) = store.lock().set(key.clone(), entry.clone()) {
            debug!(key = %key, evicted = %evicted, "local write evicted key");
        }

        let capacity = store.capacity();
        let mut pending = self.pending.lock();
        if pending.len() >= capacity && !pending.contains_key(&key) {
            trace!(key = %key, "broadcast queue full, not queued");
            return;
        }
        trace!(key = %key, "queued local write");
        pending.merge(Batch::from_entries(self.peer(), Default::default()).with(key, entry));
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.engine.store().get(key)
    }

    /// Take the queued local writes, if any
    pub fn drain_pending(&self) -> Option<Batch> {
        let batch = std::mem::take(&mut *self.pending.lock());
        (!batch.is_empty()).then_some(batch)
    }

    /// Store statistics
    pub fn stats(&self) -> NodeStats {
        let store = self.engine.store();
        NodeStats {
            keys: store.len(),
            capacity: store.capacity(),
            pending: self.pending.lock().len(),
        }
    }
}

impl Gossiper for Node {
    fn gossip(&self) -> Batch {
        self.engine.state()
    }

    fn on_gossip(&self, payload: &[u8]) -> Result<Batch, NodeError> {
        let batch = Batch::decode(payload)?;
        Ok(self.engine.merge_delta(batch))
    }

    fn on_gossip_broadcast(&self, payload: &[u8]) -> Result<Option<Batch>, NodeError> {
        let batch = Batch::decode(payload)?;
        Ok(self.engine.merge_new(batch))
    }
}

/// Node statistics
#[derive(Debug, Clone)]
pub struct NodeStats {
    pub keys: usize,
    pub capacity: usize,
    pub pending: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(nickname: &str) -> Node {
        Node::new(PeerName::from_nickname(nickname), 16).unwrap()
    }

    #[test]
    fn test_node_creation() {
        assert!(Node::new(PeerName::from_nickname("a"), 0).is_err());

        let stats = node("a").stats();
        assert_eq!(stats.keys, 0);
        assert_eq!(stats.capacity, 16);
    }

    #[test]
    fn test_local_writes_are_queued() {
        let a = node("a");
        a.set("x", "1", 0);
        a.set("x", "2", 0);
        a.set("y", "3", 0);

        assert_eq!(a.get("x").as_deref(), Some("2"));
        assert_eq!(a.stats().pending, 2);

        let pending = a.drain_pending().unwrap();
        assert_eq!(pending.origin, Some(a.peer()));
        assert_eq!(pending.get("x").unwrap().value, "2");
        assert!(a.drain_pending().is_none());
    }

    #[test]
    fn test_broadcast_queue_bounded_by_capacity() {
        let a = Node::new(PeerName::from_nickname("a"), 4).unwrap();
        for i in 0..1000 {
            a.set(format!("key-{}", i), "v", 0);
        }

        let stats = a.stats();
        assert_eq!(stats.keys, 4);
        assert_eq!(stats.pending, 4);

        // Keys already queued can still be updated
        a.set("key-0", "updated", 0);
        assert_eq!(a.drain_pending().unwrap().get("key-0").unwrap().value, "updated");
    }

    #[test]
    fn test_broadcast_damping() {
        let a = node("a");
        let b = node("b");
        a.set("x", "1", 0);

        let payload = a.drain_pending().unwrap().encode().unwrap();
        let relay = b.on_gossip_broadcast(&payload).unwrap().unwrap();
        assert_eq!(relay.origin, Some(b.peer()));
        assert_eq!(b.get("x").as_deref(), Some("1"));

        // Second delivery carries nothing new
        assert!(b.on_gossip_broadcast(&payload).unwrap().is_none());
    }

    #[test]
    fn test_gossip_round_returns_delta() {
        let a = node("a");
        let b = node("b");
        a.set("x", "1", 0);
        b.set("x", "1", 0);
        a.set("y", "2", 0);

        let delta = b.on_gossip(&a.gossip().encode().unwrap()).unwrap();
        assert_eq!(delta.len(), 1);
        assert!(delta.contains_key("y"));

        let again = b.on_gossip(&a.gossip().encode().unwrap()).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_malformed_payload() {
        let a = node("a");
        assert!(matches!(
            a.on_gossip(b"not postcard \xff\xff"),
            Err(NodeError::Core(bcache_core::Error::Codec(_)))
        ));
    }
}
