//! Built-in test datasource.
//!
//! Produces deterministic series, tables and log streams from a query's
//! `expr`, with optional latency, per-expression failures and a data window
//! outside of which nothing is returned.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use super::{
    DataQueryResponse, DataSource, DataSourceCapabilities, DataSourceError, ResponseData,
};
use crate::models::{
    DataQueryRequest, DataQueryTarget, LogStream, LogStreamEntry, LogsModel, TableModel,
    TimeSeries,
};

/// Upper bound on points generated per target.
const DEFAULT_MAX_POINTS: usize = 1_000;

/// In-process datasource for development, the CLI and tests.
///
/// # Example
///
/// ```
/// use engine::datasource::{DataSource, TestDataSource};
///
/// let datasource = TestDataSource::new("testdata").with_interval("15s");
/// assert_eq!(datasource.name(), "testdata");
/// assert_eq!(datasource.interval(), Some("15s"));
/// ```
#[derive(Debug, Clone)]
pub struct TestDataSource {
    name: String,
    interval: Option<String>,
    delay: Duration,
    failing: HashSet<String>,
    data_window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    max_points: usize,
}

impl TestDataSource {
    /// Creates a datasource that answers immediately.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interval: None,
            delay: Duration::ZERO,
            failing: HashSet::new(),
            data_window: None,
            max_points: DEFAULT_MAX_POINTS,
        }
    }

    /// Sets the minimum query interval.
    #[must_use]
    pub fn with_interval(mut self, interval: impl Into<String>) -> Self {
        self.interval = Some(interval.into());
        self
    }

    /// Delays every response.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fails every query whose `expr` equals `expr`.
    #[must_use]
    pub fn with_failure(mut self, expr: impl Into<String>) -> Self {
        self.failing.insert(expr.into());
        self
    }

    /// Only returns data points inside `[from, to)`.
    #[must_use]
    pub fn with_data_window(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.data_window = Some((from, to));
        self
    }

    /// Caps the number of points per target.
    #[must_use]
    pub fn with_max_points(mut self, max_points: usize) -> Self {
        self.max_points = max_points.max(1);
        self
    }

    fn timestamps(&self, request: &DataQueryRequest) -> Vec<DateTime<Utc>> {
        let span = request.range.span_ms();
        let max_points = i64::try_from(self.max_points).unwrap_or(i64::MAX);
        let step = request.interval_ms.max(1).max(span / max_points);

        let mut timestamps = Vec::new();
        let mut ts = request.range.from;
        while ts <= request.range.to && timestamps.len() < self.max_points {
            let inside = self
                .data_window
                .map_or(true, |(from, to)| ts >= from && ts < to);
            if inside {
                timestamps.push(ts);
            }
            ts += ChronoDuration::milliseconds(step);
        }
        timestamps
    }

    fn frames(
        &self,
        target: &DataQueryTarget,
        request: &DataQueryRequest,
    ) -> Result<Vec<ResponseData>, DataSourceError> {
        let expr = target
            .model
            .get("expr")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        if self.failing.contains(expr) {
            return Err(DataSourceError::QueryFailed(format!(
                "expression '{expr}' failed"
            )));
        }
        if expr.is_empty() {
            return Ok(Vec::new());
        }

        let seed: u64 = expr.bytes().map(u64::from).sum();
        let value_at = |i: usize| {
            #[allow(clippy::cast_precision_loss)]
            let v = ((seed + i as u64) % 100) as f64;
            v
        };
        let timestamps = self.timestamps(request);
        let format = target
            .model
            .get("format")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("time_series");

        match format {
            "time_series" => {
                let datapoints = timestamps
                    .iter()
                    .enumerate()
                    .map(|(i, ts)| (value_at(i), ts.timestamp_millis()))
                    .collect();
                Ok(vec![ResponseData::Series(TimeSeries::new(expr, datapoints))])
            }
            "table" => {
                let instant = target
                    .model
                    .get("instant")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);
                let skip = if instant {
                    timestamps.len().saturating_sub(1)
                } else {
                    0
                };
                let mut table = TableModel::with_columns(["Time", "Metric", "Value"]);
                for (i, ts) in timestamps.iter().enumerate().skip(skip) {
                    table.rows.push(vec![
                        ts.timestamp_millis().into(),
                        expr.into(),
                        value_at(i).into(),
                    ]);
                }
                Ok(vec![ResponseData::Table(table)])
            }
            "logs" => {
                let entries = timestamps
                    .iter()
                    .enumerate()
                    .map(|(i, ts)| LogStreamEntry {
                        ts: *ts,
                        line: format!("{expr} line {i}"),
                    })
                    .collect();
                let labels = BTreeMap::from([("expr".to_string(), expr.to_string())]);
                Ok(vec![ResponseData::Stream(LogStream { labels, entries })])
            }
            other => Err(DataSourceError::MalformedResponse(format!(
                "unknown format '{other}'"
            ))),
        }
    }
}

#[async_trait]
impl DataSource for TestDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> Option<&str> {
        self.interval.as_deref()
    }

    fn capabilities(&self) -> DataSourceCapabilities {
        DataSourceCapabilities {
            supports_graph: true,
            supports_table: true,
            supports_logs: true,
        }
    }

    async fn query(&self, request: DataQueryRequest) -> Result<DataQueryResponse, DataSourceError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut data = Vec::new();
        for target in &request.targets {
            data.extend(self.frames(target, &request)?);
        }

        tracing::debug!(
            datasource = %self.name,
            request_id = %request.request_id,
            frames = data.len(),
            "Test datasource answered"
        );
        Ok(DataQueryResponse { data })
    }

    fn merge_streams(&self, streams: &[LogStream], interval_ms: i64) -> Option<LogsModel> {
        Some(LogsModel::from_streams(streams, interval_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IntervalValues, Query, QueryOptions, RawTimeRange, ResultType};
    use crate::transaction::build_query_transaction;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap()
    }

    fn request(expr: &str, result_type: ResultType) -> DataQueryRequest {
        build_query_transaction(
            &Query::from_expr(expr).with_ref_id("A").with_key("k"),
            0,
            result_type,
            &QueryOptions::for_result_type(result_type),
            &RawTimeRange::new("now-1h", "now"),
            &IntervalValues::new("10m", 600_000),
            false,
            now(),
        )
        .unwrap()
        .options
    }

    #[tokio::test]
    async fn test_series_cover_range_at_interval() {
        let ds = TestDataSource::new("testdata");
        let response = ds.query(request("up", ResultType::Graph)).await.unwrap();

        let ResponseData::Series(series) = &response.data[0] else {
            panic!("expected series");
        };
        assert_eq!(series.target, "up");
        assert_eq!(series.datapoints.len(), 7);
    }

    #[tokio::test]
    async fn test_instant_table_has_one_row() {
        let ds = TestDataSource::new("testdata");
        let response = ds.query(request("up", ResultType::Table)).await.unwrap();

        let ResponseData::Table(table) = &response.data[0] else {
            panic!("expected table");
        };
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.columns.len(), 3);
    }

    #[tokio::test]
    async fn test_logs_stream_is_labelled() {
        let ds = TestDataSource::new("testdata");
        let response = ds.query(request("app", ResultType::Logs)).await.unwrap();

        let ResponseData::Stream(stream) = &response.data[0] else {
            panic!("expected stream");
        };
        assert_eq!(stream.labels["expr"], "app");
        assert_eq!(stream.entries[0].line, "app line 0");
    }

    #[tokio::test]
    async fn test_failing_expression() {
        let ds = TestDataSource::new("testdata").with_failure("bad");
        let err = ds.query(request("bad", ResultType::Graph)).await.unwrap_err();
        assert!(matches!(err, DataSourceError::QueryFailed(_)));
    }

    #[tokio::test]
    async fn test_data_window_filters_points() {
        let ds = TestDataSource::new("testdata")
            .with_data_window(now() - ChronoDuration::days(2), now() - ChronoDuration::days(1));
        let response = ds.query(request("up", ResultType::Graph)).await.unwrap();

        let ResponseData::Series(series) = &response.data[0] else {
            panic!("expected series");
        };
        assert!(series.datapoints.is_empty());
    }

    #[tokio::test]
    async fn test_empty_expression_returns_nothing() {
        let ds = TestDataSource::new("testdata");
        let response = ds.query(request("", ResultType::Graph)).await.unwrap();
        assert!(response.data.is_empty());
    }
}
