//! Key/value persistence used by the history manager.
//!
//! Provides the `KeyValueStore` trait, an in-memory implementation for tests
//! and short-lived sessions, and a JSON file implementation that survives
//! restarts.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Errors that can occur during key/value store operations.
#[derive(Debug, Error)]
pub enum KeyValueStoreError {
    /// Failed to acquire lock on the store.
    #[error("Failed to acquire lock on key/value store")]
    LockError,

    /// Reading or writing the backing file failed.
    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Generic key/value persistence.
///
/// Implementations must be thread-safe (Send + Sync).
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn get(&self, key: &str) -> Result<Option<Value>, KeyValueStoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn set(&self, key: &str, value: Value) -> Result<(), KeyValueStoreError>;

    /// Removes `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn delete(&self, key: &str) -> Result<(), KeyValueStoreError>;
}

/// In-memory key/value store.
///
/// **Note:** Data is not persisted across restarts.
///
/// # Example
///
/// ```
/// use engine::history::{InMemoryKeyValueStore, KeyValueStore};
/// use serde_json::json;
///
/// let store = InMemoryKeyValueStore::new();
/// store.set("answer", json!(42)).unwrap();
/// assert_eq!(store.get("answer").unwrap(), Some(json!(42)));
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyValueStore {
    entries: Arc<RwLock<HashMap<String, Value>>>,
}

impl InMemoryKeyValueStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new store wrapped in an Arc.
    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Value>, KeyValueStoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| KeyValueStoreError::LockError)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), KeyValueStoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| KeyValueStoreError::LockError)?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), KeyValueStoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| KeyValueStoreError::LockError)?;
        entries.remove(key);
        Ok(())
    }
}

/// Key/value store backed by a single JSON object file.
///
/// Every write rewrites the whole file through a sibling temporary file and
/// a rename, so readers never observe a half-written file.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileKeyValueStore {
    /// Creates a store for `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>, KeyValueStoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(Map::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, entries: &Map<String, Value>) -> Result<(), KeyValueStoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut Map<String, Value>),
    ) -> Result<(), KeyValueStoreError> {
        let _guard = self.lock.write().map_err(|_| KeyValueStoreError::LockError)?;
        let mut entries = self.read_all()?;
        apply(&mut entries);
        self.write_all(&entries)
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Value>, KeyValueStoreError> {
        let _guard = self.lock.read().map_err(|_| KeyValueStoreError::LockError)?;
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), KeyValueStoreError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    fn delete(&self, key: &str) -> Result<(), KeyValueStoreError> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_in_memory_set_get_delete() {
        let store = InMemoryKeyValueStore::new();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", json!(["a"])).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(json!(["a"])));

        store.delete("k").unwrap();
        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_in_memory_clones_share_entries() {
        let store = InMemoryKeyValueStore::new();
        let other = store.clone();
        store.set("k", json!(1)).unwrap();
        assert_eq!(other.get("k").unwrap(), Some(json!(1)));
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = FileKeyValueStore::new(&path);
        store.set("a", json!({"x": 1})).unwrap();
        store.set("b", json!("two")).unwrap();
        store.delete("b").unwrap();

        let reopened = FileKeyValueStore::new(&path);
        assert_eq!(reopened.get("a").unwrap(), Some(json!({"x": 1})));
        assert_eq!(reopened.get("b").unwrap(), None);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_file_store_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path().join("absent.json"));
        assert_eq!(store.get("anything").unwrap(), None);
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileKeyValueStore::new(&path);
        assert!(matches!(
            store.get("a"),
            Err(KeyValueStoreError::Serialization(_))
        ));
    }
}
