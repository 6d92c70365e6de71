//! State of one explore pane.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::{EngineConfig, DEFAULT_MAX_ROWS};
use crate::datasource::{DataSource, DataSourceCapabilities};
use crate::models::{
    get_query_keys, HistoryItem, IntervalValues, Query, RawTimeRange, ResultType, UiState,
};
use crate::scan::ScanController;
use crate::time::{get_intervals, seconds_to_hms, IntervalError};
use crate::transaction::{calculate_results_from_transactions, ComposedResults, TransactionStore};

/// Interval used before the first run, in milliseconds.
pub const DEFAULT_GRAPH_INTERVAL_MS: i64 = 15_000;

/// Everything one explore pane owns.
#[derive(Debug, Clone)]
pub struct ExploreSessionState {
    /// Active datasource.
    pub datasource: Option<Arc<dyn DataSource>>,
    /// Name of the active datasource.
    pub datasource_name: Option<String>,
    /// Identifier scoping the datasource's history.
    pub datasource_id: Option<String>,
    /// Result views the datasource can feed.
    pub capabilities: DataSourceCapabilities,
    /// Name of the datasource last requested.
    pub requested_datasource_name: Option<String>,
    /// True while a datasource is loading.
    pub datasource_loading: bool,
    /// Why the last datasource load failed.
    pub datasource_error: Option<String>,
    /// True when no datasource is available.
    pub datasource_missing: bool,
    /// Set once the pane has been initialized.
    pub initialized: bool,
    /// Row queries in display order.
    pub queries: Vec<Query>,
    /// Per-row rendering keys.
    pub query_keys: Vec<String>,
    /// Issued transactions.
    pub transactions: TransactionStore,
    /// Raw time range.
    pub range: RawTimeRange,
    /// Width of the result area in pixels, used as the interval resolution.
    pub container_width: u32,
    /// Intervals of the latest run.
    pub query_intervals: IntervalValues,
    /// Scan state.
    pub scan: ScanController,
    /// UI visibility flags.
    pub ui: UiState,
    /// Query history of the active datasource, newest first.
    pub history: Vec<HistoryItem>,
    /// Composite results of the current transactions.
    pub results: ComposedResults,
    /// Maximum number of rows.
    pub max_rows: usize,
}

impl Default for ExploreSessionState {
    fn default() -> Self {
        Self {
            datasource: None,
            datasource_name: None,
            datasource_id: None,
            capabilities: DataSourceCapabilities::default(),
            requested_datasource_name: None,
            datasource_loading: false,
            datasource_error: None,
            datasource_missing: false,
            initialized: false,
            queries: Vec::new(),
            query_keys: Vec::new(),
            transactions: TransactionStore::new(),
            range: RawTimeRange::default(),
            container_width: 0,
            query_intervals: IntervalValues::new("15s", DEFAULT_GRAPH_INTERVAL_MS),
            scan: ScanController::new(),
            ui: UiState::default(),
            history: Vec::new(),
            results: ComposedResults::default(),
            max_rows: DEFAULT_MAX_ROWS,
        }
    }
}

impl ExploreSessionState {
    /// Creates a fresh pane state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh pane state using the configured limits.
    #[must_use]
    pub fn with_config(config: &EngineConfig) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let seconds = config.graph_interval_ms as f64 / 1000.0;
        Self {
            query_intervals: IntervalValues::new(seconds_to_hms(seconds), config.graph_interval_ms),
            max_rows: config.max_rows,
            ..Self::default()
        }
    }

    /// Returns true while a scan is in progress.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.scan.is_scanning()
    }

    /// Returns whether queries of `result_type` should be issued.
    #[must_use]
    pub fn wants(&self, result_type: ResultType) -> bool {
        self.ui.is_showing(result_type) && self.capabilities.supports(result_type)
    }

    /// Recomputes the query intervals from the range, width and datasource floor.
    ///
    /// # Errors
    ///
    /// Returns an error if the range or the datasource interval is invalid;
    /// the previous intervals are kept.
    pub fn refresh_intervals(&mut self, now: DateTime<Utc>) -> Result<(), IntervalError> {
        let floor = self.datasource.as_ref().and_then(|ds| ds.interval());
        self.query_intervals = get_intervals(&self.range, floor, self.container_width, now)?;
        Ok(())
    }

    /// Recomputes the composite results from the current transactions.
    pub fn refresh_results(&mut self) {
        self.results = calculate_results_from_transactions(
            self.transactions.transactions(),
            self.datasource.as_deref(),
            self.query_intervals.interval_ms,
        );
    }

    /// Recomputes the per-row rendering keys.
    pub fn refresh_query_keys(&mut self) {
        self.query_keys = get_query_keys(&self.queries, self.datasource_name.as_deref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::TestDataSource;
    use chrono::TimeZone;

    #[test]
    fn test_default_state() {
        let state = ExploreSessionState::new();
        assert!(!state.initialized);
        assert_eq!(state.range, RawTimeRange::new("now-6h", "now"));
        assert_eq!(state.query_intervals.interval_ms, 15_000);
        assert!(state.ui.showing_graph && state.ui.showing_logs && state.ui.showing_table);
        assert!(!state.is_scanning());
    }

    #[test]
    fn test_with_config() {
        let config = EngineConfig {
            graph_interval_ms: 60_000,
            max_rows: 3,
            ..EngineConfig::default()
        };
        let state = ExploreSessionState::with_config(&config);
        assert_eq!(state.query_intervals, IntervalValues::new("1m", 60_000));
        assert_eq!(state.max_rows, 3);
    }

    #[test]
    fn test_wants_requires_ui_and_capability() {
        let mut state = ExploreSessionState::new();
        assert!(!state.wants(ResultType::Logs));

        state.capabilities.supports_logs = true;
        assert!(state.wants(ResultType::Logs));

        state.ui.showing_logs = false;
        assert!(!state.wants(ResultType::Logs));
    }

    #[test]
    fn test_refresh_intervals_uses_datasource_floor() {
        let now = Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap();
        let mut state = ExploreSessionState {
            datasource: Some(Arc::new(TestDataSource::new("t").with_interval("1m"))),
            range: RawTimeRange::new("now-1h", "now"),
            container_width: 1000,
            ..ExploreSessionState::default()
        };

        state.refresh_intervals(now).unwrap();
        assert_eq!(state.query_intervals, IntervalValues::new("1m", 60_000));
    }

    #[test]
    fn test_refresh_intervals_keeps_previous_on_error() {
        let mut state = ExploreSessionState {
            range: RawTimeRange::new("later", "now"),
            container_width: 1000,
            ..ExploreSessionState::default()
        };

        assert!(state.refresh_intervals(Utc::now()).is_err());
        assert_eq!(state.query_intervals.interval_ms, DEFAULT_GRAPH_INTERVAL_MS);
    }
}
