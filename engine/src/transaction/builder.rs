//! Builds immutable transaction descriptors from row queries.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::models::{
    generate_key, DataQueryRequest, DataQueryTarget, IntervalValues, Query, QueryOptions,
    QueryTransaction, RawTimeRange, ResultType, ScopedVar,
};
use crate::time::DateMathError;

/// Returns the cancellation id shared by all requests for one query instance
/// rendered in one format.
#[must_use]
pub fn panel_id(format: &str, query_key: &str) -> String {
    format!("{format}-{query_key}")
}

/// Builds a transaction for one row and one result type.
///
/// The query is deep-copied, so later edits to the live row do not reach the
/// in-flight request. The target model holds the query fields merged with the
/// result-type options; `refId` and `key` are carried next to it.
///
/// # Errors
///
/// Returns an error if the range cannot be resolved.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use engine::models::{IntervalValues, Query, QueryOptions, RawTimeRange, ResultType};
/// use engine::transaction::build_query_transaction;
///
/// let query = Query::from_expr("up").with_ref_id("A").with_key("Q-1");
/// let tx = build_query_transaction(
///     &query,
///     0,
///     ResultType::Graph,
///     &QueryOptions::for_result_type(ResultType::Graph),
///     &RawTimeRange::default(),
///     &IntervalValues::new("15s", 15_000),
///     false,
///     Utc::now(),
/// )
/// .unwrap();
///
/// assert!(!tx.done);
/// assert_eq!(tx.options.panel_id, "time_series-Q-1");
/// ```
#[allow(clippy::too_many_arguments)]
pub fn build_query_transaction(
    query: &Query,
    row_index: usize,
    result_type: ResultType,
    query_options: &QueryOptions,
    range: &RawTimeRange,
    intervals: &IntervalValues,
    scanning: bool,
    now: DateTime<Utc>,
) -> Result<QueryTransaction, DateMathError> {
    let id = generate_key(row_index);

    let mut model: Map<String, Value> = query.model.clone();
    if let Ok(Value::Object(options)) = serde_json::to_value(query_options) {
        model.extend(options);
    }

    let target = DataQueryTarget {
        ref_id: query.ref_id.clone(),
        key: query.key.clone(),
        model,
    };

    let scoped_vars = BTreeMap::from([
        (
            "__interval".to_string(),
            ScopedVar {
                text: intervals.interval.clone(),
                value: Value::String(intervals.interval.clone()),
            },
        ),
        (
            "__interval_ms".to_string(),
            ScopedVar {
                text: intervals.interval_ms.to_string(),
                value: Value::from(intervals.interval_ms),
            },
        ),
    ]);

    let options = DataQueryRequest {
        request_id: id.clone(),
        panel_id: panel_id(&query_options.format, &query.key),
        interval: intervals.interval.clone(),
        interval_ms: intervals.interval_ms,
        targets: vec![target],
        range: range.resolve(now)?,
        scoped_vars,
    };

    tracing::trace!(
        id = %id,
        row_index,
        result_type = %result_type,
        scanning,
        "Built query transaction"
    );

    Ok(QueryTransaction {
        id,
        query: query.clone(),
        result_type,
        row_index,
        options,
        scanning,
        done: false,
        result: None,
        error: None,
        latency: Duration::ZERO,
        generation: 0,
        issued_at: Instant::now(),
    })
}
