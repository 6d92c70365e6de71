//! Query transaction model.
//!
//! A transaction is one issued-and-tracked execution of a row's query for a
//! specific result type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::{Query, QueryResult, RawTimeRange, TimeRange};

/// The composite view a transaction feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResultType {
    /// Time series graph.
    Graph,
    /// Table.
    Table,
    /// Log stream.
    Logs,
}

impl ResultType {
    /// All result types in display order.
    pub const ALL: [ResultType; 3] = [Self::Graph, Self::Table, Self::Logs];
}

impl std::fmt::Display for ResultType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Graph => write!(f, "Graph"),
            Self::Table => write!(f, "Table"),
            Self::Logs => write!(f, "Logs"),
        }
    }
}

/// Sampling step for a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalValues {
    /// Step as text, e.g. `15s`.
    pub interval: String,
    /// Step in milliseconds.
    pub interval_ms: i64,
}

impl IntervalValues {
    /// Creates interval values.
    #[must_use]
    pub fn new(interval: impl Into<String>, interval_ms: i64) -> Self {
        Self {
            interval: interval.into(),
            interval_ms,
        }
    }
}

/// Result-type specific options merged into every target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    /// Rendering format requested from the datasource.
    pub format: String,

    /// Whether an instant (single point) query is wanted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instant: Option<bool>,

    /// Whether table values should be labelled with the row's `refId`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_with_ref_id: Option<bool>,
}

impl QueryOptions {
    /// Returns the options used for a result type.
    #[must_use]
    pub fn for_result_type(result_type: ResultType) -> Self {
        match result_type {
            ResultType::Graph => Self {
                format: "time_series".to_string(),
                instant: Some(false),
                value_with_ref_id: None,
            },
            ResultType::Table => Self {
                format: "table".to_string(),
                instant: Some(true),
                value_with_ref_id: Some(true),
            },
            ResultType::Logs => Self {
                format: "logs".to_string(),
                instant: None,
                value_with_ref_id: None,
            },
        }
    }
}

/// A template variable value visible to the datasource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedVar {
    /// Display text.
    pub text: String,
    /// Raw value.
    pub value: Value,
}

/// One query as sent to the datasource.
///
/// `ref_id` and `key` travel next to the model, never inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQueryTarget {
    /// Row label.
    #[serde(rename = "refId")]
    pub ref_id: String,
    /// Request key of the row query.
    pub key: String,
    /// Query fields merged with the result-type options.
    pub model: Map<String, Value>,
}

/// Request handed to a datasource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQueryRequest {
    /// Id of the transaction that issued the request.
    pub request_id: String,
    /// Cancellation id derived from the format and query key.
    pub panel_id: String,
    /// Step as text.
    pub interval: String,
    /// Step in milliseconds.
    pub interval_ms: i64,
    /// Queries to run.
    pub targets: Vec<DataQueryTarget>,
    /// Resolved range; `raw` keeps the typed form.
    pub range: TimeRange,
    /// Template variables.
    pub scoped_vars: BTreeMap<String, ScopedVar>,
}

/// Error payload of a failed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionError {
    /// Human readable message.
    pub message: String,
}

impl TransactionError {
    /// Creates an error payload.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TransactionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// A tracked unit of work for one row and one result type.
#[derive(Debug, Clone)]
pub struct QueryTransaction {
    /// Unique id, independent of `refId` and `key`.
    pub id: String,
    /// Deep copy of the row query at build time.
    pub query: Query,
    /// The view this transaction feeds.
    pub result_type: ResultType,
    /// Row position, re-indexed when rows are inserted or removed.
    pub row_index: usize,
    /// Frozen request options.
    pub options: DataQueryRequest,
    /// Issued by the scan controller.
    pub scanning: bool,
    /// Set on success or failure.
    pub done: bool,
    /// Payload of a successful completion.
    pub result: Option<QueryResult>,
    /// Payload of a failed completion.
    pub error: Option<TransactionError>,
    /// Time from issue to completion.
    pub latency: Duration,
    /// Supersession stamp assigned by the transaction store.
    pub generation: u64,
    /// When the transaction was built.
    pub issued_at: Instant,
}

impl QueryTransaction {
    /// Returns the `(row_index, result_type)` pair this transaction occupies.
    #[must_use]
    pub fn pair(&self) -> (usize, ResultType) {
        (self.row_index, self.result_type)
    }

    /// Returns true while no response has been accepted.
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.done
    }

    /// Returns true if the transaction completed with a result.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.done && self.result.is_some()
    }

    /// Returns the raw range the transaction was issued for.
    #[must_use]
    pub fn raw_range(&self) -> &RawTimeRange {
        &self.options.range.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_options_per_result_type() {
        let graph = serde_json::to_value(QueryOptions::for_result_type(ResultType::Graph)).unwrap();
        let table = serde_json::to_value(QueryOptions::for_result_type(ResultType::Table)).unwrap();
        let logs = serde_json::to_value(QueryOptions::for_result_type(ResultType::Logs)).unwrap();

        assert_eq!(graph, json!({"format": "time_series", "instant": false}));
        assert_eq!(
            table,
            json!({"format": "table", "instant": true, "valueWithRefId": true})
        );
        assert_eq!(logs, json!({"format": "logs"}));
    }

    #[test]
    fn test_result_type_display() {
        assert_eq!(ResultType::Graph.to_string(), "Graph");
        assert_eq!(ResultType::ALL.len(), 3);
    }
}
