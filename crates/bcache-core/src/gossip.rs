//! Gossip payload contract
//!
//! Batches travel between peers as postcard bytes. Transports also coalesce
//! pending payloads before sending, which is what [`GossipData::merge`] is for.

use crate::error::Result;
use crate::types::Batch;

/// Data the gossip transport can encode and coalesce
pub trait GossipData: Sized {
    /// Serialize for the wire
    fn encode(&self) -> Result<Vec<u8>>;

    /// Fold `other` into `self`. Entries from `other` replace ours.
    fn merge(&mut self, other: Self);
}

impl GossipData for Batch {
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(self)?)
    }

    fn merge(&mut self, other: Self) {
        if self.origin.is_none() {
            self.origin = other.origin;
        }
        self.entries.extend(other.entries);
    }
}

impl Batch {
    /// Inverse of [`GossipData::encode`]
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::{Entry, PeerName};

    #[test]
    fn test_encode_decode() {
        let origin = PeerName::from_nickname("a");
        let mut batch = Batch::new()
            .with("x", Entry::persistent("1"))
            .with("y", Entry::new("two", 1_700_000_000));
        batch.origin = Some(origin);

        let bytes = batch.encode().unwrap();
        assert_eq!(Batch::decode(&bytes).unwrap(), batch);
    }

    #[test]
    fn test_decode_garbage() {
        let result = Batch::decode(&[0xff, 0xff, 0xff]);
        assert!(matches!(result, Err(Error::Codec(_))));
    }

    #[test]
    fn test_merge_other_wins_and_origin_kept() {
        let a = PeerName::from_nickname("a");
        let b = PeerName::from_nickname("b");

        let mut pending = Batch::from_entries(a, Default::default())
            .with("x", Entry::persistent("1"))
            .with("y", Entry::persistent("1"));
        let newer = Batch::from_entries(b, Default::default()).with("x", Entry::new("2", 7));

        pending.merge(newer);
        assert_eq!(pending.origin, Some(a));
        assert_eq!(pending.len(), 2);
        assert_eq!(pending.get("x"), Some(&Entry::new("2", 7)));
    }

    #[test]
    fn test_merge_adopts_origin_when_missing() {
        let b = PeerName::from_nickname("b");
        let mut pending = Batch::new();
        pending.merge(Batch::from_entries(b, Default::default()));
        assert_eq!(pending.origin, Some(b));
    }
}
