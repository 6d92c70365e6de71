//! Folds completed transactions into one composite result per result type.

use serde::Serialize;
use thiserror::Error;

use crate::datasource::DataSource;
use crate::models::{
    LogStream, LogsModel, QueryResult, QueryTransaction, TableMergeError, TableModel, TimeSeries,
};

/// Warnings attached to a composite result.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum AggregationError {
    /// A table could not be merged into the composite table.
    #[error("Table result of row {row_index} skipped: {reason}")]
    TableShapeMismatch {
        /// Row of the rejected table.
        row_index: usize,
        /// Why the table was rejected.
        reason: String,
    },
}

/// The merged table plus any tables that had to be left out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableResult {
    /// Merged table.
    pub model: TableModel,
    /// One entry per rejected table.
    pub warnings: Vec<AggregationError>,
}

/// Composite results for rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComposedResults {
    /// All graph series, in transaction order.
    pub graph_result: Vec<TimeSeries>,
    /// Merged table.
    pub table_result: TableResult,
    /// Logs merged by the datasource; `None` if it cannot merge streams.
    pub logs_result: Option<LogsModel>,
}

impl ComposedResults {
    /// Returns true if no composite holds any data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph_result.iter().all(|s| s.datapoints.is_empty())
            && self.table_result.model.rows.is_empty()
            && self.logs_result.as_ref().map_or(true, |logs| logs.rows.is_empty())
    }
}

/// Computes the composite results from the current transactions.
///
/// Only completed transactions with a result are considered; failed and
/// pending transactions are skipped, so partially completed runs render what
/// has arrived so far. The store is not modified.
#[must_use]
pub fn calculate_results_from_transactions(
    transactions: &[QueryTransaction],
    datasource: Option<&dyn DataSource>,
    graph_interval_ms: i64,
) -> ComposedResults {
    let completed = || {
        transactions
            .iter()
            .filter(|qt| qt.done)
            .filter_map(|qt| qt.result.as_ref().map(|result| (qt.row_index, result)))
    };

    let graph_result: Vec<TimeSeries> = completed()
        .filter_map(|(_, result)| match result {
            QueryResult::Graph(series) => Some(series.iter().cloned()),
            _ => None,
        })
        .flatten()
        .collect();

    let mut table_result = TableResult::default();
    for (row_index, result) in completed() {
        if let QueryResult::Table(table) = result {
            if let Err(TableMergeError::ColumnMismatch { expected, found }) =
                table_result.model.merge(table)
            {
                let warning = AggregationError::TableShapeMismatch {
                    row_index,
                    reason: format!("columns [{found}] do not match [{expected}]"),
                };
                tracing::warn!(%warning, "Table result not merged");
                table_result.warnings.push(warning);
            }
        }
    }

    let logs_result = datasource.and_then(|ds| {
        let streams: Vec<LogStream> = completed()
            .filter_map(|(_, result)| match result {
                QueryResult::Logs(streams) => Some(streams.iter().cloned()),
                _ => None,
            })
            .flatten()
            .collect();
        ds.merge_streams(&streams, graph_interval_ms)
    });

    ComposedResults {
        graph_result,
        table_result,
        logs_result,
    }
}
