//! In-memory indexed backend for the Vigil activity store.
//!
//! A primary table of snapshot-wrapped activities, seven secondary indexes
//! kept exactly consistent with it, a TTL read cache, and a repository
//! change feed. The store subscribes to the domain event bus and drops the
//! cache entry for any activity an event touches, whichever code path
//! produced the write.
//!
//! Process-lifetime only: nothing here survives a restart.

mod indexes;
mod store;

#[cfg(test)]
mod tests;

pub use store::{MemoryStore, StoreConfig};
