//! Query result payloads: time series, tables and log streams.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::ResultType;

/// A single datapoint: `(value, timestamp in epoch milliseconds)`.
pub type Datapoint = (f64, i64);

/// A named time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Series name as reported by the datasource.
    pub target: String,

    /// Datapoints in time order.
    #[serde(default)]
    pub datapoints: Vec<Datapoint>,

    /// Optional display unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl TimeSeries {
    /// Creates a series with the given name and points.
    #[must_use]
    pub fn new(target: impl Into<String>, datapoints: Vec<Datapoint>) -> Self {
        Self {
            target: target.into(),
            datapoints,
            unit: None,
        }
    }
}

/// A table column header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumn {
    /// Column title.
    pub text: String,
}

impl TableColumn {
    /// Creates a column with the given title.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Errors raised while merging tables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableMergeError {
    /// The column sets of two tables differ.
    #[error("table columns [{found}] do not match [{expected}]")]
    ColumnMismatch {
        /// Column titles of the composite table.
        expected: String,
        /// Column titles of the rejected table.
        found: String,
    },
}

/// A table of rows sharing one column set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableModel {
    /// Column headers.
    #[serde(default)]
    pub columns: Vec<TableColumn>,

    /// Rows, one value per column.
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl TableModel {
    /// Creates a table with the given column titles and no rows.
    #[must_use]
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(TableColumn::new).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row.
    #[must_use]
    pub fn with_row(mut self, row: Vec<serde_json::Value>) -> Self {
        self.rows.push(row);
        self
    }

    /// Returns true if the table has neither columns nor rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.rows.is_empty()
    }

    /// Appends the rows of `other` if it has the same column set.
    ///
    /// An empty composite adopts the columns of the first table merged into it.
    ///
    /// # Errors
    ///
    /// Returns [`TableMergeError::ColumnMismatch`] if the columns differ; the
    /// composite is left unchanged in that case.
    pub fn merge(&mut self, other: &TableModel) -> Result<(), TableMergeError> {
        if self.columns.is_empty() {
            self.columns.clone_from(&other.columns);
        } else if self.columns != other.columns {
            return Err(TableMergeError::ColumnMismatch {
                expected: column_titles(&self.columns),
                found: column_titles(&other.columns),
            });
        }
        self.rows.extend(other.rows.iter().cloned());
        Ok(())
    }
}

fn column_titles(columns: &[TableColumn]) -> String {
    columns
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// One line of a log stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogStreamEntry {
    /// When the line was logged.
    pub ts: DateTime<Utc>,
    /// The raw log line.
    pub line: String,
}

/// A labelled stream of log lines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogStream {
    /// Stream labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Lines in the stream.
    #[serde(default)]
    pub entries: Vec<LogStreamEntry>,
}

/// A log line in the merged logs view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRow {
    /// When the line was logged.
    pub ts: DateTime<Utc>,
    /// The raw log line.
    pub line: String,
    /// Labels of the stream the line came from.
    pub labels: BTreeMap<String, String>,
}

/// Merged logs view: rows newest first plus a log volume series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogsModel {
    /// All log lines, newest first.
    pub rows: Vec<LogRow>,

    /// Line counts per `interval_ms` bucket.
    pub series: Vec<TimeSeries>,
}

impl LogsModel {
    /// Merges streams into one view, bucketing line counts by `interval_ms`.
    ///
    /// A non-positive interval yields rows without a volume series.
    #[must_use]
    pub fn from_streams(streams: &[LogStream], interval_ms: i64) -> Self {
        let mut rows: Vec<LogRow> = streams
            .iter()
            .flat_map(|stream| {
                stream.entries.iter().map(|entry| LogRow {
                    ts: entry.ts,
                    line: entry.line.clone(),
                    labels: stream.labels.clone(),
                })
            })
            .collect();
        rows.sort_by(|a, b| b.ts.cmp(&a.ts));

        let series = if interval_ms > 0 && !rows.is_empty() {
            let mut buckets: BTreeMap<i64, f64> = BTreeMap::new();
            for row in &rows {
                let ts = row.ts.timestamp_millis();
                let bucket = ts - ts.rem_euclid(interval_ms);
                *buckets.entry(bucket).or_insert(0.0) += 1.0;
            }
            let datapoints = buckets.into_iter().map(|(ts, count)| (count, ts)).collect();
            vec![TimeSeries::new("logs", datapoints)]
        } else {
            Vec::new()
        };

        Self { rows, series }
    }
}

/// The payload of a completed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum QueryResult {
    /// Time series for the graph view.
    Graph(Vec<TimeSeries>),
    /// A table for the table view.
    Table(TableModel),
    /// Raw log streams, merged later by the datasource.
    Logs(Vec<LogStream>),
}

impl QueryResult {
    /// Returns the result type this payload belongs to.
    #[must_use]
    pub fn result_type(&self) -> ResultType {
        match self {
            Self::Graph(_) => ResultType::Graph,
            Self::Table(_) => ResultType::Table,
            Self::Logs(_) => ResultType::Logs,
        }
    }

    /// Returns true if the payload contains no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Graph(series) => series.iter().all(|s| s.datapoints.is_empty()),
            Self::Table(table) => table.rows.is_empty(),
            Self::Logs(streams) => streams.iter().all(|s| s.entries.is_empty()),
        }
    }
}
