//! Read-through TTL cache with offline fallback.
//!
//! This module provides a portfolio-agnostic caching mechanism that:
//! - Stores JSON payloads with their write time in a persistent key-value store
//! - Serves entries younger than the TTL without touching the network
//! - Keeps expired entries around and serves them when the network fails
//! - Exposes explicit invalidation for write operations

mod keys;
mod layer;
mod storage;
mod traits;

pub use keys::{CacheKey, TOKEN_KEY};
pub use layer::{CacheLayer, CachedEntry, EntryStatus, DEFAULT_TTL_MILLIS};
pub use storage::{MemoryStore, SqliteStore};
pub use traits::{CacheResult, CacheSource, Clock, KeyValueStore, SystemClock};
#[cfg(test)]
pub use traits::ManualClock;
