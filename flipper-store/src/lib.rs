//! # flipper-store
//!
//! The two in-memory stores the rollout scheduler reads from, and the loop
//! that keeps them current.
//!
//! Each store is seeded once from a full listing, then mutated only by its
//! own [`feed::consume`] task reading change events off a channel. Readers
//! take [`PolicyIndex::snapshot`] / [`WorkloadCache::snapshot`], which copy
//! the contents out under the store's lock.

pub mod feed;
pub mod policy_index;
pub mod workload_cache;

pub use feed::{consume, EventStore};
pub use policy_index::{PolicyIndex, PolicyIndexView};
pub use workload_cache::WorkloadCache;
