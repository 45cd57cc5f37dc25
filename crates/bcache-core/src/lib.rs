//! bcache Core Library
//!
//! This crate provides the reconciliation core of a peer-replicated,
//! TTL-aware key/value cache: a bounded LRU store with lazy expiration and
//! the merge engine that applies gossip batches to it.
//!
//! # Modules
//!
//! - [`types`]: Payload types (Entry, Batch, PeerName)
//! - [`store`]: Bounded store with LRU eviction and lazy expiration
//! - [`merge`]: Merge engine (`merge_delta` / `merge_new`)
//! - [`gossip`]: Payload encoding and coalescing
//! - [`error`]: Error types

pub mod error;
pub mod gossip;
pub mod merge;
pub mod store;
pub mod types;

pub use error::{Error, Result};
pub use gossip::GossipData;
pub use merge::{MergeEngine, MergeOutcome};
pub use store::{BoundedStore, StoreGuard};
pub use types::*;
