//! Cache storage trait and its SQLite, in-memory and no-op implementations.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::warn;

use super::traits::{Cacheable, Snapshot};

/// Trait for cache storage backends.
///
/// Backends are plain string key-value stores; snapshots are layered on top
/// as JSON so every backend shares one persisted format.
pub trait CacheStorage: Send + Sync + 'static {
  /// Read the raw value stored under `key`.
  fn get_item(&self, key: &str) -> Result<Option<String>>;

  /// Store `value` under `key`, replacing any previous value.
  fn set_item(&self, key: &str, value: &str) -> Result<()>;

  /// Remove the value stored under `key`. Missing keys are not an error.
  fn remove_item(&self, key: &str) -> Result<()>;

  /// Store a collection snapshot.
  fn store_snapshot<T: Cacheable>(&self, key: &str, snapshot: &Snapshot<T>) -> Result<()>
  where
    Self: Sized,
  {
    let json =
      serde_json::to_string(snapshot).map_err(|e| eyre!("Failed to serialize snapshot: {}", e))?;
    self.set_item(key, &json)
  }

  /// Get a collection snapshot.
  ///
  /// A value that no longer decodes is reported as a miss.
  fn get_snapshot<T: Cacheable>(&self, key: &str) -> Result<Option<Snapshot<T>>>
  where
    Self: Sized,
  {
    let Some(raw) = self.get_item(key)? else {
      return Ok(None);
    };

    match serde_json::from_str(&raw) {
      Ok(snapshot) => Ok(Some(snapshot)),
      Err(e) => {
        warn!(key, error = %e, "Discarding unreadable cache entry");
        Ok(None)
      }
    }
  }
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn get_item(&self, _key: &str) -> Result<Option<String>> {
    Ok(None) // Always miss
  }

  fn set_item(&self, _key: &str, _value: &str) -> Result<()> {
    Ok(()) // Discard
  }

  fn remove_item(&self, _key: &str) -> Result<()> {
    Ok(())
  }
}

/// In-memory storage backend.
///
/// Used by tests, and can simulate write failures to exercise the
/// memory-only degradation paths.
#[derive(Default)]
pub struct MemoryStorage {
  items: Mutex<HashMap<String, String>>,
  simulate_write_error: AtomicBool,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  /// Enable write error simulation for testing error handling.
  #[allow(dead_code)]
  pub fn set_simulate_write_error(&self, simulate: bool) {
    self.simulate_write_error.store(simulate, Ordering::SeqCst);
  }
}

impl CacheStorage for MemoryStorage {
  fn get_item(&self, key: &str) -> Result<Option<String>> {
    let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(items.get(key).cloned())
  }

  fn set_item(&self, key: &str, value: &str) -> Result<()> {
    if self.simulate_write_error.load(Ordering::SeqCst) {
      return Err(eyre!("Simulated write error"));
    }
    let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
    items.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove_item(&self, key: &str) -> Result<()> {
    if self.simulate_write_error.load(Ordering::SeqCst) {
      return Err(eyre!("Simulated write error"));
    }
    let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
    items.remove(key);
    Ok(())
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Create a new SQLite storage at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Create a new SQLite storage at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("lubd").join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per key; snapshots and client state are stored as text
CREATE TABLE IF NOT EXISTS kv_cache (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    written_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl CacheStorage for SqliteStorage {
  fn get_item(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT value FROM kv_cache WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry {}: {}", key, e))
  }

  fn set_item(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv_cache (key, value, written_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to store cache entry {}: {}", key, e))?;

    Ok(())
  }

  fn remove_item(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM kv_cache WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove cache entry {}: {}", key, e))?;

    Ok(())
  }
}

/// Storage selected at startup from configuration.
pub enum StorageBackend {
  Sqlite(SqliteStorage),
  /// Persistent storage was unavailable; state lives for this process only
  Memory(MemoryStorage),
  /// Caching disabled
  Disabled(NoopStorage),
}

impl StorageBackend {
  pub fn label(&self) -> &'static str {
    match self {
      StorageBackend::Sqlite(_) => "sqlite",
      StorageBackend::Memory(_) => "memory",
      StorageBackend::Disabled(_) => "disabled",
    }
  }
}

impl CacheStorage for StorageBackend {
  fn get_item(&self, key: &str) -> Result<Option<String>> {
    match self {
      StorageBackend::Sqlite(s) => s.get_item(key),
      StorageBackend::Memory(s) => s.get_item(key),
      StorageBackend::Disabled(s) => s.get_item(key),
    }
  }

  fn set_item(&self, key: &str, value: &str) -> Result<()> {
    match self {
      StorageBackend::Sqlite(s) => s.set_item(key, value),
      StorageBackend::Memory(s) => s.set_item(key, value),
      StorageBackend::Disabled(s) => s.set_item(key, value),
    }
  }

  fn remove_item(&self, key: &str) -> Result<()> {
    match self {
      StorageBackend::Sqlite(s) => s.remove_item(key),
      StorageBackend::Memory(s) => s.remove_item(key),
      StorageBackend::Disabled(s) => s.remove_item(key),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;
  use serde::{Deserialize, Serialize};

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Note {
    id: String,
  }

  impl Cacheable for Note {
    fn cache_key(&self) -> String {
      self.id.clone()
    }

    fn entity_type() -> &'static str {
      "note"
    }
  }

  fn notes(n: usize) -> Vec<Note> {
    (0..n)
      .map(|i| Note {
        id: format!("n{}", i),
      })
      .collect()
  }

  #[test]
  fn test_sqlite_snapshot_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let storage = SqliteStorage::open_at(&dir.path().join("cache.db")).unwrap();

    let snapshot = Snapshot::new(notes(3), Utc::now());
    storage.store_snapshot("notes_all", &snapshot).unwrap();

    let loaded: Snapshot<Note> = storage.get_snapshot("notes_all").unwrap().unwrap();
    assert_eq!(loaded, snapshot);
  }

  #[test]
  fn test_sqlite_overwrites_single_entry() {
    let dir = tempfile::tempdir().unwrap();
    let storage = SqliteStorage::open_at(&dir.path().join("cache.db")).unwrap();

    storage
      .store_snapshot("notes_all", &Snapshot::new(notes(5), Utc::now()))
      .unwrap();
    storage
      .store_snapshot("notes_all", &Snapshot::new(notes(2), Utc::now()))
      .unwrap();

    let loaded: Snapshot<Note> = storage.get_snapshot("notes_all").unwrap().unwrap();
    assert_eq!(loaded.data.len(), 2);
  }

  #[test]
  fn test_sqlite_remove_item() {
    let dir = tempfile::tempdir().unwrap();
    let storage = SqliteStorage::open_at(&dir.path().join("cache.db")).unwrap();

    storage.set_item("selectedPropertyId", "P1").unwrap();
    storage.remove_item("selectedPropertyId").unwrap();
    storage.remove_item("never-written").unwrap();

    assert_eq!(storage.get_item("selectedPropertyId").unwrap(), None);
  }

  #[test]
  fn test_sqlite_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    {
      let storage = SqliteStorage::open_at(&path).unwrap();
      storage.set_item("selectedPropertyId", "P7").unwrap();
    }

    let storage = SqliteStorage::open_at(&path).unwrap();
    assert_eq!(
      storage.get_item("selectedPropertyId").unwrap().as_deref(),
      Some("P7")
    );
  }

  #[test]
  fn test_unreadable_snapshot_is_a_miss() {
    let storage = MemoryStorage::new();
    storage.set_item("notes_all", "{not json").unwrap();

    let loaded: Option<Snapshot<Note>> = storage.get_snapshot("notes_all").unwrap();
    assert!(loaded.is_none());
  }

  #[test]
  fn test_memory_simulated_write_error() {
    let storage = MemoryStorage::new();
    storage.set_simulate_write_error(true);

    assert!(storage.set_item("k", "v").is_err());
    assert_eq!(storage.get_item("k").unwrap(), None);
  }

  #[test]
  fn test_noop_storage_always_misses() {
    let storage = NoopStorage;
    storage.set_item("k", "v").unwrap();
    assert_eq!(storage.get_item("k").unwrap(), None);
  }
}
