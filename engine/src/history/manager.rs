//! Bounded per-datasource query history.

use chrono::Utc;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use super::store::{KeyValueStore, KeyValueStoreError};
use crate::models::{HistoryItem, Query};

/// Maximum number of history entries kept per datasource.
pub const MAX_HISTORY_ITEMS: usize = 100;

/// Key prefix under which each datasource's history is persisted.
pub const HISTORY_KEY_PREFIX: &str = "grafana.explore.history";

/// Key under which the last used datasource name is persisted.
pub const LAST_USED_DATASOURCE_KEY: &str = "grafana.explore.datasource";

/// Returns the persistence key for a datasource's history.
#[must_use]
pub fn history_key(datasource_id: &str) -> String {
    format!("{HISTORY_KEY_PREFIX}.{datasource_id}")
}

/// Records, loads and clears query history in a [`KeyValueStore`].
///
/// The store is shared process-wide; every read-modify-write runs under the
/// manager's lock so concurrent recordings never lose entries.
///
/// # Example
///
/// ```
/// use engine::history::{HistoryManager, InMemoryKeyValueStore};
/// use engine::models::Query;
///
/// let manager = HistoryManager::new(InMemoryKeyValueStore::new_shared());
/// let history = manager.record(&[], "prom", &[Query::from_expr("up")]).unwrap();
///
/// assert_eq!(history.len(), 1);
/// assert_eq!(manager.load("prom").unwrap(), history);
/// ```
pub struct HistoryManager {
    store: Arc<dyn KeyValueStore>,
    max_items: usize,
    lock: Mutex<()>,
}

impl std::fmt::Debug for HistoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryManager")
            .field("max_items", &self.max_items)
            .finish_non_exhaustive()
    }
}

impl HistoryManager {
    /// Creates a manager keeping [`MAX_HISTORY_ITEMS`] entries per datasource.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_max_items(store, MAX_HISTORY_ITEMS)
    }

    /// Creates a manager with a custom cap.
    #[must_use]
    pub fn with_max_items(store: Arc<dyn KeyValueStore>, max_items: usize) -> Self {
        Self {
            store,
            max_items,
            lock: Mutex::new(()),
        }
    }

    /// Returns the configured cap.
    #[must_use]
    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Prepends one entry per query and persists the capped list.
    ///
    /// All entries of one call share a timestamp and keep the order of
    /// `queries`. Transport keys are stripped. The persisted list is the base
    /// when present, so recordings from other sessions are kept; `history`
    /// is used when nothing has been persisted yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub fn record(
        &self,
        history: &[HistoryItem],
        datasource_id: &str,
        queries: &[Query],
    ) -> Result<Vec<HistoryItem>, KeyValueStoreError> {
        let _guard = self.lock.lock().map_err(|_| KeyValueStoreError::LockError)?;

        let ts = Utc::now().timestamp_millis();
        let current = self
            .read(datasource_id)?
            .unwrap_or_else(|| history.to_vec());

        let mut updated: Vec<HistoryItem> = queries
            .iter()
            .map(|query| HistoryItem {
                query: query.without_keys(),
                ts,
            })
            .chain(current)
            .collect();
        updated.truncate(self.max_items);

        self.store
            .set(&history_key(datasource_id), serde_json::to_value(&updated)?)?;
        tracing::debug!(
            datasource_id,
            recorded = queries.len(),
            total = updated.len(),
            "History recorded"
        );
        Ok(updated)
    }

    /// Loads the persisted history of a datasource, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or holds malformed data.
    pub fn load(&self, datasource_id: &str) -> Result<Vec<HistoryItem>, KeyValueStoreError> {
        let _guard = self.lock.lock().map_err(|_| KeyValueStoreError::LockError)?;
        Ok(self.read(datasource_id)?.unwrap_or_default())
    }

    /// Deletes the persisted history of a datasource.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn clear(&self, datasource_id: &str) -> Result<(), KeyValueStoreError> {
        let _guard = self.lock.lock().map_err(|_| KeyValueStoreError::LockError)?;
        self.store.delete(&history_key(datasource_id))?;
        tracing::info!(datasource_id, "History cleared");
        Ok(())
    }

    /// Returns the name of the last used datasource.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn last_used_datasource(&self) -> Result<Option<String>, KeyValueStoreError> {
        Ok(self
            .store
            .get(LAST_USED_DATASOURCE_KEY)?
            .and_then(|value| value.as_str().map(str::to_string)))
    }

    /// Persists the name of the last used datasource.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn set_last_used_datasource(&self, name: &str) -> Result<(), KeyValueStoreError> {
        self.store
            .set(LAST_USED_DATASOURCE_KEY, Value::String(name.to_string()))
    }

    fn read(&self, datasource_id: &str) -> Result<Option<Vec<HistoryItem>>, KeyValueStoreError> {
        self.store
            .get(&history_key(datasource_id))?
            .map(serde_json::from_value)
            .transpose()
            .map_err(KeyValueStoreError::from)
    }
}
