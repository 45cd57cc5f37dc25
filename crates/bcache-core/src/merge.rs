//! Gossip merge engine
//!
//! Reconciles incoming batches against the local [`BoundedStore`] and computes
//! the delta worth propagating. Conflicts are resolved last-arrival-wins: any
//! incoming value that differs from the local one replaces it, whatever the
//! expiries say. Convergence only relies on peers eventually agreeing, not on
//! the surviving value being the most recent write.

use crate::store::BoundedStore;
use crate::types::{now_unix, Batch, PeerName};
use std::sync::Arc;
use tracing::debug;

/// Result of reconciling one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Entries that were new or changed, stamped with the local peer
    pub delta: Batch,
    /// Number of keys written to the store
    pub changed: usize,
}

/// Stateless reconciler bound to a store and the local peer identity
#[derive(Debug, Clone)]
pub struct MergeEngine {
    store: Arc<BoundedStore>,
    peer: PeerName,
}

impl MergeEngine {
    pub fn new(store: Arc<BoundedStore>, peer: PeerName) -> Self {
        Self { store, peer }
    }

    pub fn peer(&self) -> PeerName {
        self.peer
    }

    pub fn store(&self) -> &Arc<BoundedStore> {
        &self.store
    }

    /// Apply `incoming` to the store and return what was new.
    ///
    /// The store stays locked for the whole batch so concurrent merges cannot
    /// interleave their compare and overwrite steps.
    pub fn reconcile(&self, incoming: Batch) -> MergeOutcome {
        if incoming.is_empty() {
            return MergeOutcome {
                delta: Batch::new(),
                changed: 0,
            };
        }

        let source = incoming.origin;
        let received = incoming.len();
        let mut entries = incoming.entries;
        let mut changed = 0;

        {
            let mut store = self.store.lock();
            entries.retain(|key, entry| {
                // Value equality only; a differing expiry is still "already known"
                if store.value_of(key) == Some(entry.value.as_str()) {
                    return false;
                }
                store.set(key.clone(), entry.clone());
                changed += 1;
                true
            });
        }

        debug!(
            peer = %self.peer,
            source = ?source.map(|p| p.to_string()),
            received,
            changed,
            "reconciled batch"
        );

        MergeOutcome {
            delta: Batch::from_entries(self.peer, entries),
            changed,
        }
    }

    /// Reconcile and always hand back the delta, even when nothing changed
    pub fn merge_delta(&self, incoming: Batch) -> Batch {
        self.reconcile(incoming).delta
    }

    /// Reconcile and return the delta only if something changed.
    ///
    /// `None` tells the transport to stop flooding this batch.
    pub fn merge_new(&self, incoming: Batch) -> Option<Batch> {
        let outcome = self.reconcile(incoming);
        (outcome.changed > 0).then_some(outcome.delta)
    }

    /// Complete live state as a batch, for periodic anti-entropy rounds
    pub fn state(&self) -> Batch {
        self.state_at(now_unix())
    }

    pub fn state_at(&self, now: i64) -> Batch {
        Batch::from_entries(self.peer, self.store.snapshot(now))
    }
}
