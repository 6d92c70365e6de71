//! Query history.
//!
//! History is persisted through the [`KeyValueStore`] trait so that the
//! process-wide state is an explicit object passed to the engine rather than
//! a global.

mod manager;
mod store;

pub use manager::{
    history_key, HistoryManager, HISTORY_KEY_PREFIX, LAST_USED_DATASOURCE_KEY, MAX_HISTORY_ITEMS,
};
pub use store::{FileKeyValueStore, InMemoryKeyValueStore, KeyValueStore, KeyValueStoreError};
