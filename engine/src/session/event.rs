//! Events applied to an explore pane.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::datasource::DataSource;
use crate::models::{
    HistoryItem, Query, QueryResult, QueryTransaction, RawTimeRange, TransactionError, UiState,
};
use crate::scan::RangeScanner;
use crate::url::ExploreUrlState;

/// A change applied to one or all row queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryModification {
    /// Fields merged into the query; `null` removes a field.
    pub fields: Map<String, Value>,
    /// Keep the row's transactions so its results stay visible.
    pub prevent_submit: bool,
}

impl QueryModification {
    /// Creates a modification that sets one field.
    #[must_use]
    pub fn set(name: impl Into<String>, value: Value) -> Self {
        let mut fields = Map::new();
        fields.insert(name.into(), value);
        Self {
            fields,
            prevent_submit: false,
        }
    }

    /// Applies the modification to a copy of `query`.
    #[must_use]
    pub fn apply(&self, query: &Query) -> Query {
        let mut next = query.clone();
        for (name, value) in &self.fields {
            if value.is_null() {
                next.model.remove(name);
            } else {
                next.model.insert(name.clone(), value.clone());
            }
        }
        next
    }
}

/// Everything that can happen to an explore pane.
#[derive(Debug, Clone)]
pub enum ExploreEvent {
    /// Inserts an empty row after `index`.
    AddQueryRow {
        /// Row after which to insert.
        index: usize,
    },
    /// Replaces the query of a row; `None` resets it.
    ChangeQuery {
        /// Row to change.
        index: usize,
        /// New query.
        query: Option<Query>,
    },
    /// The result area was resized.
    ChangeSize {
        /// New width in pixels.
        width: u32,
        /// Reference time for relative ranges.
        now: DateTime<Utc>,
    },
    /// The user picked a new time range.
    ChangeTime {
        /// New range.
        range: RawTimeRange,
    },
    /// Resets the rows to one empty row.
    ClearQueries,
    /// Initializes the pane.
    Initialize {
        /// Initial rows.
        queries: Vec<Query>,
        /// Initial range.
        range: RawTimeRange,
        /// Initial UI flags.
        ui: UiState,
        /// Initial width.
        container_width: u32,
    },
    /// Loading a datasource started.
    LoadDatasourcePending {
        /// Name of the datasource being loaded.
        requested_datasource_name: String,
    },
    /// The datasource could not be loaded.
    LoadDatasourceFailure {
        /// Why loading failed.
        error: String,
    },
    /// No datasource is available.
    LoadDatasourceMissing,
    /// A datasource was loaded for the pane.
    LoadDatasourceSuccess {
        /// The datasource.
        datasource: Arc<dyn DataSource>,
        /// Its persisted history.
        history: Vec<HistoryItem>,
        /// Reference time for relative ranges.
        now: DateTime<Utc>,
    },
    /// Modifies one row, or every row when `index` is `None`.
    ModifyQueries {
        /// Row to modify.
        index: Option<usize>,
        /// The change.
        modification: QueryModification,
    },
    /// Rows were imported from another datasource.
    QueriesImported {
        /// Imported rows.
        queries: Vec<Query>,
    },
    /// A transaction was issued.
    QueryTransactionStart {
        /// The transaction.
        transaction: Box<QueryTransaction>,
    },
    /// A transaction completed.
    QueryTransactionSuccess {
        /// Transaction id.
        id: String,
        /// Its result.
        result: QueryResult,
    },
    /// A transaction failed.
    QueryTransactionFailure {
        /// Transaction id.
        id: String,
        /// The failure.
        error: TransactionError,
    },
    /// Removes a row.
    RemoveQueryRow {
        /// Row to remove.
        index: usize,
    },
    /// A run was requested without any non-empty query.
    RunQueriesEmpty,
    /// Starts a scan.
    ScanStart {
        /// Range producer.
        scanner: Arc<dyn RangeScanner>,
    },
    /// A scan step moved to a new range.
    ScanRange {
        /// The new range.
        range: RawTimeRange,
    },
    /// Stops a scan.
    ScanStop,
    /// Replaces all rows.
    SetQueries {
        /// New rows.
        queries: Vec<Query>,
    },
    /// Toggles the graph view.
    ToggleGraph,
    /// Toggles the logs view.
    ToggleLogs,
    /// Toggles the table view.
    ToggleTable,
    /// Swaps the datasource instance without reloading it.
    UpdateDatasourceInstance {
        /// The datasource.
        datasource: Arc<dyn DataSource>,
    },
    /// Replaces the UI flags.
    UpdateUi {
        /// New flags.
        ui: UiState,
    },
    /// Replaces the history after a run was recorded.
    UpdateHistory {
        /// New history.
        history: Vec<HistoryItem>,
    },
    /// Forgets the history.
    ClearHistory,
}

impl ExploreEvent {
    /// Builds the initialization event for state decoded from a URL.
    #[must_use]
    pub fn initialize_from_url(state: ExploreUrlState, container_width: u32) -> Self {
        Self::Initialize {
            queries: state.queries,
            range: state.range,
            ui: state.ui,
            container_width,
        }
    }

    /// Returns the event's name for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddQueryRow { .. } => "add_query_row",
            Self::ChangeQuery { .. } => "change_query",
            Self::ChangeSize { .. } => "change_size",
            Self::ChangeTime { .. } => "change_time",
            Self::ClearQueries => "clear_queries",
            Self::Initialize { .. } => "initialize",
            Self::LoadDatasourcePending { .. } => "load_datasource_pending",
            Self::LoadDatasourceFailure { .. } => "load_datasource_failure",
            Self::LoadDatasourceMissing => "load_datasource_missing",
            Self::LoadDatasourceSuccess { .. } => "load_datasource_success",
            Self::ModifyQueries { .. } => "modify_queries",
            Self::QueriesImported { .. } => "queries_imported",
            Self::QueryTransactionStart { .. } => "query_transaction_start",
            Self::QueryTransactionSuccess { .. } => "query_transaction_success",
            Self::QueryTransactionFailure { .. } => "query_transaction_failure",
            Self::RemoveQueryRow { .. } => "remove_query_row",
            Self::RunQueriesEmpty => "run_queries_empty",
            Self::ScanStart { .. } => "scan_start",
            Self::ScanRange { .. } => "scan_range",
            Self::ScanStop => "scan_stop",
            Self::SetQueries { .. } => "set_queries",
            Self::ToggleGraph => "toggle_graph",
            Self::ToggleLogs => "toggle_logs",
            Self::ToggleTable => "toggle_table",
            Self::UpdateDatasourceInstance { .. } => "update_datasource_instance",
            Self::UpdateUi { .. } => "update_ui",
            Self::UpdateHistory { .. } => "update_history",
            Self::ClearHistory => "clear_history",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_modification_sets_and_removes_fields() {
        let query = Query::from_expr("up").with_field("step", json!(10));
        let mut modification = QueryModification::set("expr", json!("rate(up[5m])"));
        modification.fields.insert("step".to_string(), Value::Null);

        let next = modification.apply(&query);
        assert_eq!(next.expr(), Some("rate(up[5m])"));
        assert!(!next.model.contains_key("step"));
        // The original is untouched.
        assert_eq!(query.expr(), Some("up"));
    }

    #[test]
    fn test_initialize_from_url() {
        let url_state = ExploreUrlState {
            queries: vec![Query::from_expr("up")],
            ..ExploreUrlState::default()
        };
        let ExploreEvent::Initialize {
            queries,
            range,
            container_width,
            ..
        } = ExploreEvent::initialize_from_url(url_state, 800)
        else {
            panic!("expected initialize");
        };
        assert_eq!(queries, vec![Query::from_expr("up")]);
        assert_eq!(range, RawTimeRange::default());
        assert_eq!(container_width, 800);
    }
}
