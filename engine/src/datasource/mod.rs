//! Datasource contract.
//!
//! The engine never talks to a backend directly; it issues
//! [`DataQueryRequest`]s through the [`DataSource`] trait and folds the
//! responses into transactions.

mod testdata;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{
    DataQueryRequest, LogStream, LogsModel, Query, QueryResult, ResultType, TableModel,
    TimeSeries,
};
use crate::url::ExploreUrlState;

pub use testdata::TestDataSource;

/// Errors reported by a datasource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataSourceError {
    /// The backend rejected or failed the query.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// The backend did not answer in time.
    #[error("Query timed out after {0} ms")]
    Timeout(u64),

    /// The datasource cannot produce this result type.
    #[error("Datasource does not support {0} queries")]
    Unsupported(ResultType),

    /// The response does not fit the requested result type.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// One frame of a datasource response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResponseData {
    /// A time series.
    Series(TimeSeries),
    /// A table.
    Table(TableModel),
    /// A log stream.
    Stream(LogStream),
}

/// Response of a datasource query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQueryResponse {
    /// Response frames.
    pub data: Vec<ResponseData>,
}

/// Which result views a datasource can feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceCapabilities {
    /// Time series for graphs.
    pub supports_graph: bool,
    /// Tables.
    pub supports_table: bool,
    /// Log streams.
    pub supports_logs: bool,
}

impl DataSourceCapabilities {
    /// Returns whether the datasource can feed `result_type`.
    #[must_use]
    pub fn supports(&self, result_type: ResultType) -> bool {
        match result_type {
            ResultType::Graph => self.supports_graph,
            ResultType::Table => self.supports_table,
            ResultType::Logs => self.supports_logs,
        }
    }
}

impl Default for DataSourceCapabilities {
    fn default() -> Self {
        Self {
            supports_graph: true,
            supports_table: true,
            supports_logs: false,
        }
    }
}

/// A pluggable datasource.
///
/// Only [`DataSource::name`] and [`DataSource::query`] are required; the
/// remaining methods are optional capabilities with conservative defaults.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Display name, also used in URLs.
    fn name(&self) -> &str;

    /// Identifier used to scope persisted history.
    fn id(&self) -> &str {
        self.name()
    }

    /// Minimum query interval, e.g. `15s`.
    fn interval(&self) -> Option<&str> {
        None
    }

    /// Result views this datasource can feed.
    fn capabilities(&self) -> DataSourceCapabilities {
        DataSourceCapabilities::default()
    }

    /// Runs a query.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails; the error is recorded on the
    /// transaction that issued the request.
    async fn query(&self, request: DataQueryRequest) -> Result<DataQueryResponse, DataSourceError>;

    /// Merges log streams into one logs view, bucketing volume by `interval_ms`.
    ///
    /// Datasources without log support return `None`.
    fn merge_streams(&self, _streams: &[LogStream], _interval_ms: i64) -> Option<LogsModel> {
        None
    }

    /// Builds explore URL state from panel targets.
    ///
    /// Returning `None` lets the caller build a plain state from the targets.
    fn explore_state(&self, _targets: &[Query]) -> Option<ExploreUrlState> {
        None
    }
}

impl std::fmt::Debug for dyn DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("name", &self.name())
            .field("id", &self.id())
            .finish_non_exhaustive()
    }
}

/// Extracts the payload for `result_type` from a response.
///
/// # Errors
///
/// Returns [`DataSourceError::MalformedResponse`] if the tables of a table
/// response do not share one column set.
pub fn result_from_response(
    result_type: ResultType,
    response: DataQueryResponse,
) -> Result<QueryResult, DataSourceError> {
    match result_type {
        ResultType::Graph => Ok(QueryResult::Graph(
            response
                .data
                .into_iter()
                .filter_map(|frame| match frame {
                    ResponseData::Series(series) => Some(series),
                    _ => None,
                })
                .collect(),
        )),
        ResultType::Table => {
            let mut table = TableModel::default();
            for frame in &response.data {
                if let ResponseData::Table(frame) = frame {
                    table
                        .merge(frame)
                        .map_err(|e| DataSourceError::MalformedResponse(e.to_string()))?;
                }
            }
            Ok(QueryResult::Table(table))
        }
        ResultType::Logs => Ok(QueryResult::Logs(
            response
                .data
                .into_iter()
                .filter_map(|frame| match frame {
                    ResponseData::Stream(stream) => Some(stream),
                    _ => None,
                })
                .collect(),
        )),
    }
}
