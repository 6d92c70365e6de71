//! Data models for the explore engine.
//!
//! This module contains queries, time ranges, transactions, results and UI state.

pub mod query;
pub mod range;
pub mod result;
pub mod transaction;
pub mod ui;

use serde::{Deserialize, Serialize};

pub use query::{
    clear_query_keys, ensure_queries, generate_empty_query, generate_key, generate_ref_id,
    get_query_keys, has_non_empty_query, Query,
};
pub use range::{RawTimeRange, TimeRange, DEFAULT_RANGE_FROM, DEFAULT_RANGE_TO};
pub use result::{
    Datapoint, LogRow, LogStream, LogStreamEntry, LogsModel, QueryResult, TableColumn,
    TableMergeError, TableModel, TimeSeries,
};
pub use transaction::{
    DataQueryRequest, DataQueryTarget, IntervalValues, QueryOptions, QueryTransaction,
    ResultType, ScopedVar, TransactionError,
};
pub use ui::{DedupStrategy, UiState};

/// A previously run query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    /// The query as it was run, without transport keys.
    pub query: Query,
    /// When it was run, in epoch milliseconds.
    pub ts: i64,
}
