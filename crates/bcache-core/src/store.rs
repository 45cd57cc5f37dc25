//! Bounded key/value store with LRU eviction and lazy expiration
//!
//! Eviction order is delegated to [`lru::LruCache`]. Expired entries are only
//! removed when a read touches them; there is no background sweep.

use crate::error::{Error, Result};
use crate::types::{now_unix, Entry};
use lru::LruCache;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use tracing::trace;

/// Capacity-limited cache shared by local writers and the merge engine
pub struct BoundedStore {
    cache: Mutex<LruCache<String, Entry>>,
}

impl BoundedStore {
    /// Create a store holding at most `max_keys` entries
    pub fn new(max_keys: usize) -> Result<Self> {
        let cap = NonZeroUsize::new(max_keys).ok_or(Error::InvalidCapacity(max_keys))?;
        Ok(Self {
            cache: Mutex::new(LruCache::new(cap)),
        })
    }

    /// Take exclusive access for a multi-step read-compare-write sequence
    pub fn lock(&self) -> StoreGuard<'_> {
        StoreGuard {
            cache: self.cache.lock(),
        }
    }

    /// Insert or overwrite `key`. Returns the key evicted to make room, if any.
    pub fn set(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        expiry: i64,
    ) -> Option<String> {
        self.lock().set(key.into(), Entry::new(value, expiry))
    }

    /// Read `key` against the system clock
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, now_unix())
    }

    /// Read `key` as of Unix time `now`. A stale entry is dropped and reported missing.
    pub fn get_at(&self, key: &str, now: i64) -> Option<String> {
        let mut cache = self.cache.lock();
        match cache.get(key) {
            None => return None,
            Some(entry) if !entry.is_expired_at(now) => return Some(entry.value.clone()),
            Some(_) => {}
        }
        cache.pop(key);
        trace!(key, now, "expired on read");
        None
    }

    /// All entries live at `now`. Recency order is left untouched.
    pub fn snapshot(&self, now: i64) -> HashMap<String, Entry> {
        self.cache
            .lock()
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }

    /// Presence check without recency update or expiry check
    pub fn contains(&self, key: &str) -> bool {
        self.cache.lock().contains(key)
    }

    /// Number of stored entries, including ones that expired but were not read yet
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cache.lock().cap().get()
    }
}

impl std::fmt::Debug for BoundedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.cache.lock();
        f.debug_struct("BoundedStore")
            .field("len", &cache.len())
            .field("capacity", &cache.cap())
            .finish()
    }
}

/// Exclusive handle on the store, held for the duration of a merge
pub struct StoreGuard<'a> {
    cache: MutexGuard<'a, LruCache<String, Entry>>,
}

impl StoreGuard<'_> {
    /// Current value for `key`, ignoring expiry. Counts as an access for LRU purposes.
    pub fn value_of(&mut self, key: &str) -> Option<&str> {
        self.cache.get(key).map(|entry| entry.value.as_str())
    }

    /// Insert or overwrite. Returns the unrelated key evicted to make room, if any.
    pub fn set(&mut self, key: String, entry: Entry) -> Option<String> {
        match self.cache.push(key, entry) {
            // push hands back the old pair on overwrite, and the LRU pair on eviction
            Some((old_key, _)) if !self.cache.contains(&old_key) => {
                trace!(key = %old_key, "evicted");
                Some(old_key)
            }
            _ => None,
        }
    }
}
