//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{DateTime, Duration, TimeZone, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::traits::{CacheResult, Clock, KeyValueStore, SystemClock};

/// Format version written with every entry.
/// Entries without a version predate it and are still accepted.
const ENTRY_VERSION: u32 = 1;

/// One hour, for every namespace.
pub const DEFAULT_TTL_MILLIS: i64 = 3_600_000;

/// On-store record. `data` and `timestamp` are always written together.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry<T> {
  data: T,
  /// Write time, epoch milliseconds
  timestamp: i64,
  #[serde(default)]
  version: u32,
}

/// A decoded cache entry.
#[derive(Debug, Clone)]
pub struct CachedEntry<T> {
  pub data: T,
  pub stored_at: DateTime<Utc>,
}

/// Age and freshness of an entry, independent of its payload type.
#[derive(Debug, Clone)]
pub struct EntryStatus {
  pub stored_at: DateTime<Utc>,
  pub age: Duration,
  pub fresh: bool,
}

fn decode_entry<T: DeserializeOwned>(raw: &str) -> Result<CachedEntry<T>> {
  let entry: StoredEntry<T> =
    serde_json::from_str(raw).map_err(|e| eyre!("Failed to parse cache entry: {}", e))?;

  if entry.version > ENTRY_VERSION {
    return Err(eyre!("Unsupported cache entry version {}", entry.version));
  }

  let stored_at = Utc
    .timestamp_millis_opt(entry.timestamp)
    .single()
    .ok_or_else(|| eyre!("Invalid cache timestamp {}", entry.timestamp))?;

  Ok(CachedEntry {
    data: entry.data,
    stored_at,
  })
}

/// Read-through TTL cache over a [`KeyValueStore`].
///
/// Reads are cache-first: a fresh entry is returned without touching the
/// network. Expired entries are never evicted on read, so they stay available
/// as a fallback when the network fails. Store failures are logged and
/// swallowed; they never fail the caller.
pub struct CacheLayer<S: KeyValueStore> {
  storage: Arc<S>,
  clock: Arc<dyn Clock>,
  /// Maximum entry age still considered fresh
  ttl: Duration,
}

impl<S: KeyValueStore> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self::from_shared(Arc::new(storage))
  }

  /// Create a cache layer over a store that is also used elsewhere.
  pub fn from_shared(storage: Arc<S>) -> Self {
    Self {
      storage,
      clock: Arc::new(SystemClock),
      ttl: Duration::milliseconds(DEFAULT_TTL_MILLIS),
    }
  }

  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
    self.clock = Arc::new(clock);
    self
  }

  pub fn storage(&self) -> Arc<S> {
    Arc::clone(&self.storage)
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  fn is_fresh(&self, stored_at: DateTime<Utc>) -> bool {
    self.clock.now() - stored_at < self.ttl
  }

  /// Load and decode an entry regardless of age. Malformed means absent.
  fn read_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CachedEntry<T>> {
    let raw = match self.storage.get(key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return None,
      Err(e) => {
        warn!(key, error = %e, "Failed to read cache entry");
        return None;
      }
    };

    match decode_entry(&raw) {
      Ok(entry) => Some(entry),
      Err(e) => {
        warn!(key, error = %e, "Ignoring malformed cache entry");
        None
      }
    }
  }

  /// Return the entry under `key` if it is still fresh.
  ///
  /// An expired entry is a miss but is left in place.
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<CachedEntry<T>> {
    let entry = self.read_entry(key)?;
    if self.is_fresh(entry.stored_at) {
      debug!(key, "Cache hit");
      Some(entry)
    } else {
      debug!(key, stored_at = %entry.stored_at, "Cache entry expired");
      None
    }
  }

  /// Return the entry under `key` ignoring freshness.
  pub fn peek<T: DeserializeOwned>(&self, key: &str) -> Option<CachedEntry<T>> {
    self.read_entry(key)
  }

  /// Age and freshness of the entry under `key`, if it decodes.
  pub fn inspect(&self, key: &str) -> Option<EntryStatus> {
    let entry = self.read_entry::<serde_json::Value>(key)?;
    let age = self.clock.now() - entry.stored_at;
    Some(EntryStatus {
      stored_at: entry.stored_at,
      age,
      fresh: age < self.ttl,
    })
  }

  /// Store `payload` under `key`, stamped with the current time. Best effort.
  pub fn put<T: Serialize>(&self, key: &str, payload: &T) {
    let entry = StoredEntry {
      data: payload,
      timestamp: self.clock.now().timestamp_millis(),
      version: ENTRY_VERSION,
    };

    let result = serde_json::to_string(&entry)
      .map_err(|e| eyre!("Failed to serialize cache entry: {}", e))
      .and_then(|json| self.storage.set(key, &json));

    match result {
      Ok(()) => debug!(key, "Cache entry stored"),
      Err(e) => warn!(key, error = %e, "Failed to write cache entry"),
    }
  }

  /// Drop the entry under `key`. Absent keys are a no-op.
  pub fn invalidate(&self, key: &str) {
    match self.storage.remove(key) {
      Ok(()) => debug!(key, "Cache entry invalidated"),
      Err(e) => warn!(key, error = %e, "Failed to invalidate cache entry"),
    }
  }

  /// Drop every key in the store except those in `preserve`.
  pub fn invalidate_all_except(&self, preserve: &[&str]) {
    let keys = match self.storage.keys() {
      Ok(keys) => keys,
      Err(e) => {
        warn!(error = %e, "Failed to list cache keys, clearing store");
        self.clear_preserving(preserve);
        return;
      }
    };

    for key in keys.iter().filter(|k| !preserve.contains(&k.as_str())) {
      self.invalidate(key);
    }
  }

  /// Fallback when keys can't be listed: save, clear, restore.
  fn clear_preserving(&self, preserve: &[&str]) {
    let saved: Vec<(&str, String)> = preserve
      .iter()
      .filter_map(|key| match self.storage.get(key) {
        Ok(value) => value.map(|v| (*key, v)),
        Err(e) => {
          warn!(key, error = %e, "Failed to read preserved key");
          None
        }
      })
      .collect();

    if let Err(e) = self.storage.clear() {
      warn!(error = %e, "Failed to clear cache store");
      return;
    }

    for (key, value) in saved {
      if let Err(e) = self.storage.set(key, &value) {
        warn!(key, error = %e, "Failed to restore preserved key");
      }
    }
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Fresh cache entry: return it, no network call
  /// 2. Otherwise fetch from network and store the result
  /// 3. On network failure, return the expired entry (offline mode)
  /// 4. With no entry at all, the network error is returned
  pub async fn fetch_with_cache<T, F, Fut>(&self, key: &str, fetcher: F) -> Result<CacheResult<T>>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    if let Some(cached) = self.get::<T>(key) {
      return Ok(CacheResult::from_cache(cached.data, cached.stored_at));
    }

    match fetcher().await {
      Ok(data) => {
        self.put(key, &data);
        Ok(CacheResult::from_network(data))
      }
      Err(e) => match self.peek::<T>(key) {
        Some(stale) => {
          warn!(key, error = %e, "Fetch failed, serving stale cache");
          Ok(CacheResult::offline(stale.data, stale.stored_at))
        }
        None => Err(e),
      },
    }
  }
}

impl<S: KeyValueStore> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      clock: Arc::clone(&self.clock),
      ttl: self.ttl,
    }
  }
}
