//! bcached - bcache replicated cache node
//!
//! This daemon provides:
//! - A bounded, TTL-aware local cache
//! - Periodic full-state gossip rounds to a random subset of peers
//! - Delta flooding that stops once a batch carries nothing new

pub mod config;
pub mod node;
pub mod server;

pub use config::Config;
pub use node::{Gossiper, Node};
pub use server::Server;
