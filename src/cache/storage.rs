//! Key-value storage backends for the persistent cache.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::traits::KeyValueStore;
use crate::error::StorageError;

/// Storage that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn values(&self) -> MutexGuard<'_, HashMap<String, String>> {
    self.values.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl KeyValueStore for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    Ok(self.values().get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    self.values().insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StorageError> {
    self.values().remove(key);
    Ok(())
  }
}

/// SQLite-based key-value storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the storage at the default location.
  pub fn open() -> Result<Self, StorageError> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open (or create) the storage at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self, StorageError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        StorageError::Unavailable(format!("failed to create cache directory: {}", e))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      StorageError::Unavailable(format!(
        "failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> Result<Self, StorageError> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self, StorageError> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf, StorageError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| StorageError::Unavailable("could not determine data directory".into()))?;

    Ok(data_dir.join("dataloader").join("cache.db"))
  }

  fn conn(&self) -> MutexGuard<'_, Connection> {
    self.conn.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn run_migrations(&self) -> Result<(), StorageError> {
    self.conn().execute_batch(KV_SCHEMA)?;
    Ok(())
  }
}

const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl KeyValueStore for SqliteStorage {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    let value: Option<String> = self
      .conn()
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()?;
    Ok(value)
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    self.conn().execute(
      "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?, ?, datetime('now'))",
      params![key, value],
    )?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StorageError> {
    self
      .conn()
      .execute("DELETE FROM kv_store WHERE key = ?", params![key])?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn exercise(store: &dyn KeyValueStore) {
    assert_eq!(store.get("missing").unwrap(), None);

    store.set("k", "v1").unwrap();
    assert_eq!(store.get("k").unwrap().as_deref(), Some("v1"));

    store.set("k", "v2").unwrap();
    assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));

    store.remove("k").unwrap();
    assert_eq!(store.get("k").unwrap(), None);

    // Removing twice is fine
    store.remove("k").unwrap();
  }

  #[test]
  fn test_memory_storage_get_set_remove() {
    exercise(&MemoryStorage::new());
  }

  #[test]
  fn test_sqlite_in_memory_get_set_remove() {
    exercise(&SqliteStorage::open_in_memory().unwrap());
  }

  #[test]
  fn test_sqlite_survives_reopen() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let path = dir.path().join("nested").join("cache.db");

    {
      let store = SqliteStorage::open_at(&path).unwrap();
      store.set("snapshot", "{}").unwrap();
    }

    let reopened = SqliteStorage::open_at(&path).unwrap();
    assert_eq!(reopened.get("snapshot").unwrap().as_deref(), Some("{}"));
  }
}
