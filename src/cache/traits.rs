//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use color_eyre::Result;
#[cfg(test)]
use chrono::{Duration, TimeZone};
#[cfg(test)]
use std::sync::atomic::{AtomicI64, Ordering};
#[cfg(test)]
use std::sync::Arc;

/// Synchronous, string-keyed persistent store the cache sits on.
///
/// The store has no notion of expiry. Freshness is decided entirely by the
/// cache layer above it. A single-key `get`/`set`/`remove` is expected to be
/// atomic.
pub trait KeyValueStore: Send + Sync {
  /// Read the raw value stored under `key`.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Write `value` under `key`, replacing any previous value.
  /// May fail, e.g. when a storage quota is exceeded.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Remove `key`. Removing an absent key is not an error.
  fn remove(&self, key: &str) -> Result<()>;

  /// All keys currently present.
  fn keys(&self) -> Result<Vec<String>>;

  /// Remove everything.
  fn clear(&self) -> Result<()>;
}

/// Source of "now" for freshness checks.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// Clock that only moves when told to. Clones share the same time.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
  millis: Arc<AtomicI64>,
}

#[cfg(test)]
impl ManualClock {
  pub fn at_millis(millis: i64) -> Self {
    Self {
      millis: Arc::new(AtomicI64::new(millis)),
    }
  }

  pub fn set_millis(&self, millis: i64) {
    self.millis.store(millis, Ordering::SeqCst);
  }

  pub fn advance(&self, by: Duration) {
    self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
  }
}

#[cfg(test)]
impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    let millis = self.millis.load(Ordering::SeqCst);
    Utc
      .timestamp_millis_opt(millis)
      .single()
      .unwrap_or(DateTime::<Utc>::MIN_UTC)
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from a fresh cache entry.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      cached_at: Some(cached_at),
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }

  /// Transform the payload, keeping source metadata.
  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      cached_at: self.cached_at,
    }
  }

  pub fn is_offline(&self) -> bool {
    self.source == CacheSource::Offline
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still within its TTL
  CacheFresh,
  /// Network unavailable, serving an expired entry
  Offline,
}
