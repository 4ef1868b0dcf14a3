//! Core traits and types for the caching system.

use chrono::{DateTime, Duration, Utc};

use crate::error::StorageError;

/// Durable string-keyed storage medium.
///
/// Anything offering get/set/remove on string keys can back the persistent
/// cache: a SQLite file, an in-memory map, a browser-style local store.
pub trait KeyValueStore: Send + Sync {
  /// Read a value. `Ok(None)` means the key is absent.
  fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

  /// Write a value, replacing any previous one.
  fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

  /// Remove a value. Removing an absent key is not an error.
  fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// A cached value and the moment it was stored.
///
/// Entries are replaced, never edited in place.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
  pub value: T,
  pub stored_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
  /// Wrap a value stamped with the current time.
  pub fn new(value: T) -> Self {
    Self {
      value,
      stored_at: Utc::now(),
    }
  }

  /// Time elapsed since the entry was stored.
  pub fn age(&self, now: DateTime<Utc>) -> Duration {
    now - self.stored_at
  }

  /// Fresh means strictly younger than the TTL.
  pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
    self.age(now) < ttl
  }
}
