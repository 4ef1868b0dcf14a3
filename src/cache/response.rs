//! Bounded in-memory response cache with per-entry TTL.
//!
//! Eviction is by insertion order (FIFO), not by access recency.

use chrono::{Duration, Utc};
use std::collections::{HashMap, VecDeque};

use super::traits::CacheEntry;

pub struct ResponseCache<T> {
  entries: HashMap<String, CacheEntry<T>>,
  /// Keys in insertion order, oldest first
  order: VecDeque<String>,
  ttl: Duration,
  max_size: usize,
}

impl<T: Clone> ResponseCache<T> {
  /// Create a cache holding at most `max_size` entries (at least one).
  pub fn new(ttl: Duration, max_size: usize) -> Self {
    Self {
      entries: HashMap::new(),
      order: VecDeque::new(),
      ttl,
      max_size: max_size.max(1),
    }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn contains(&self, key: &str) -> bool {
    self.entries.contains_key(key)
  }

  /// Return a fresh value. An expired entry is evicted and reported as a miss.
  pub fn get(&mut self, key: &str) -> Option<T> {
    let fresh = self.entries.get(key)?.is_fresh(self.ttl, Utc::now());
    if fresh {
      return self.entries.get(key).map(|entry| entry.value.clone());
    }
    self.remove(key);
    None
  }

  /// Store a value, evicting the earliest-inserted entry when full.
  ///
  /// Re-inserting an existing key replaces it and moves it to the back of
  /// the eviction order.
  pub fn insert(&mut self, key: String, value: T) {
    if self.entries.contains_key(&key) {
      self.order.retain(|k| k != &key);
    } else {
      while self.entries.len() >= self.max_size {
        match self.order.pop_front() {
          Some(oldest) => {
            self.entries.remove(&oldest);
          }
          None => break,
        }
      }
    }

    self.order.push_back(key.clone());
    self.entries.insert(key, CacheEntry::new(value));
  }

  pub fn remove(&mut self, key: &str) -> Option<T> {
    let entry = self.entries.remove(key)?;
    self.order.retain(|k| k != key);
    Some(entry.value)
  }

  pub fn clear(&mut self) {
    self.entries.clear();
    self.order.clear();
  }

  /// Drop every entry older than the TTL. Returns how many were removed.
  pub fn sweep_expired(&mut self) -> usize {
    let now = Utc::now();
    let ttl = self.ttl;
    let before = self.entries.len();

    self.entries.retain(|_, entry| entry.age(now) <= ttl);
    let entries = &self.entries;
    self.order.retain(|k| entries.contains_key(k));

    before - self.entries.len()
  }
}
