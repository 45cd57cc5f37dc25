//! Core data types shared by the store, the merge engine and the transport
//!
//! Everything that travels between peers derives serde so it can be carried
//! by postcard (see [`crate::gossip`]).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as Unix seconds
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

// =============================================================================
// IDENTITY
// =============================================================================

/// Opaque 64-bit node identity, stamped onto outgoing batches
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PeerName(pub [u8; 8]);

impl PeerName {
    /// Derive a stable name from a human nickname: BLAKE3("bcache-peer-v1:" || nickname)
    pub fn from_nickname(nickname: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"bcache-peer-v1:");
        hasher.update(nickname.as_bytes());
        let mut name = [0u8; 8];
        name.copy_from_slice(&hasher.finalize().as_bytes()[..8]);
        Self(name)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl std::fmt::Display for PeerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// =============================================================================
// ENTRY
// =============================================================================

/// A cached value with an optional absolute expiry (Unix seconds)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entry {
    pub value: String,
    /// `<= 0` means the entry never expires
    pub expiry: i64,
}

impl Entry {
    pub fn new(value: impl Into<String>, expiry: i64) -> Self {
        Self {
            value: value.into(),
            expiry,
        }
    }

    /// Entry that never expires
    pub fn persistent(value: impl Into<String>) -> Self {
        Self::new(value, 0)
    }

    /// Whether the entry is stale at `now`. The expiry second itself is still live.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expiry > 0 && now > self.expiry
    }
}

// =============================================================================
// BATCH
// =============================================================================

/// Gossip payload: everything a peer wants to communicate in one round
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Batch {
    /// Peer that produced this batch, if it came out of a merge engine
    pub origin: Option<PeerName>,
    pub entries: HashMap<String, Entry>,
}

impl Batch {
    /// Empty batch with no provenance
    pub fn new() -> Self {
        Self::default()
    }

    /// Batch stamped with the producing peer
    pub fn from_entries(origin: PeerName, entries: HashMap<String, Entry>) -> Self {
        Self {
            origin: Some(origin),
            entries,
        }
    }

    /// Add or replace one entry (builder style)
    pub fn with(mut self, key: impl Into<String>, entry: Entry) -> Self {
        self.entries.insert(key.into(), entry);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: Entry) -> Option<Entry> {
        self.entries.insert(key.into(), entry)
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_name_derivation() {
        let a = PeerName::from_nickname("node-a");
        assert_eq!(a, PeerName::from_nickname("node-a"));
        assert_ne!(a, PeerName::from_nickname("node-b"));
        assert_eq!(a.to_string().len(), 16);
    }

    #[test]
    fn test_entry_expiry() {
        assert!(!Entry::persistent("v").is_expired_at(i64::MAX));
        assert!(!Entry::new("v", -5).is_expired_at(100));

        let entry = Entry::new("v", 100);
        assert!(!entry.is_expired_at(99));
        assert!(!entry.is_expired_at(100));
        assert!(entry.is_expired_at(101));
    }

    #[test]
    fn test_batch_builder() {
        let batch = Batch::new()
            .with("a", Entry::persistent("1"))
            .with("b", Entry::new("2", 10))
            .with("a", Entry::persistent("3"));

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.get("a").unwrap().value, "3");
        assert!(batch.origin.is_none());
    }

    #[test]
    fn test_entry_json_shape() {
        let json = serde_json::to_value(Entry::new("v", 42)).unwrap();
        assert_eq!(json, serde_json::json!({ "value": "v", "expiry": 42 }));
    }
}
