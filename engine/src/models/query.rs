//! Row query model.
//!
//! A `Query` is an opaque, datasource-specific JSON object that carries two
//! transport fields: `refId` (the row label) and `key` (a unique request key).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Letters used for `refId` generation.
const REF_ID_LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A single row query.
///
/// Everything except `refId` and `key` is kept verbatim in [`Query::model`]
/// and passed to the datasource untouched.
///
/// # Example
///
/// ```
/// use engine::models::Query;
///
/// let query = Query::from_expr("rate(http_requests_total[5m])");
/// assert_eq!(query.expr(), Some("rate(http_requests_total[5m])"));
/// assert!(query.ref_id.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Stable per-row label ("A", "B", ...).
    #[serde(rename = "refId", default, skip_serializing_if = "String::is_empty")]
    pub ref_id: String,

    /// Globally unique request key.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,

    /// Datasource-specific query fields.
    #[serde(flatten)]
    pub model: Map<String, Value>,
}

impl Query {
    /// Creates an empty query with no fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query whose only field is `expr`.
    #[must_use]
    pub fn from_expr(expr: impl Into<String>) -> Self {
        Self::new().with_field("expr", Value::String(expr.into()))
    }

    /// Sets a datasource-specific field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.model.insert(name.into(), value);
        self
    }

    /// Sets the row label.
    #[must_use]
    pub fn with_ref_id(mut self, ref_id: impl Into<String>) -> Self {
        self.ref_id = ref_id.into();
        self
    }

    /// Sets the request key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Returns the `expr` field if it is a string.
    #[must_use]
    pub fn expr(&self) -> Option<&str> {
        self.model.get("expr").and_then(Value::as_str)
    }

    /// Returns a copy of this query without its transport fields.
    #[must_use]
    pub fn without_keys(&self) -> Self {
        Self {
            ref_id: String::new(),
            key: String::new(),
            model: self.model.clone(),
        }
    }

    /// Returns true if at least one datasource field holds a non-empty value.
    #[must_use]
    pub fn is_non_empty(&self) -> bool {
        self.model.values().any(is_truthy)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Generates a practically unique request key.
///
/// Keys combine the current time in milliseconds, a random component and the
/// row index: `Q-<millis>-<random>-<index>`.
#[must_use]
pub fn generate_key(index: usize) -> String {
    format!(
        "Q-{}-{}-{index}",
        Utc::now().timestamp_millis(),
        rand::random::<u32>()
    )
}

/// Returns the first `refId` not used by any of `queries`.
///
/// Letters `A..Z` are tried in order; once they are exhausted the letters are
/// reused with a numeric suffix (`A1`, `B1`, ...).
#[must_use]
pub fn generate_ref_id(queries: &[Query]) -> String {
    let is_used = |candidate: &str| queries.iter().any(|q| q.ref_id == candidate);

    for round in 0usize.. {
        for letter in REF_ID_LETTERS.chars() {
            let candidate = if round == 0 {
                letter.to_string()
            } else {
                format!("{letter}{round}")
            };
            if !is_used(&candidate) {
                return candidate;
            }
        }
    }
    unreachable!("refId search is unbounded")
}

/// Creates an empty row query with a fresh `refId` and `key`.
#[must_use]
pub fn generate_empty_query(existing: &[Query], index: usize) -> Query {
    Query {
        ref_id: generate_ref_id(existing),
        key: generate_key(index),
        model: Map::new(),
    }
}

/// Ensures at least one row exists and that every row has unique transport keys.
///
/// Existing `refId`s are kept when they are unique; duplicates and missing
/// labels get the next free letter. Every row receives a new `key`.
#[must_use]
pub fn ensure_queries(queries: &[Query]) -> Vec<Query> {
    if queries.is_empty() {
        return vec![generate_empty_query(&[], 0)];
    }

    let mut ensured: Vec<Query> = Vec::with_capacity(queries.len());
    for (index, query) in queries.iter().enumerate() {
        let taken = query.ref_id.is_empty() || ensured.iter().any(|q| q.ref_id == query.ref_id);
        let ref_id = if taken {
            // Reserve labels of later rows so they keep their own.
            let mut reserved = ensured.clone();
            reserved.extend(queries[index + 1..].iter().cloned());
            generate_ref_id(&reserved)
        } else {
            query.ref_id.clone()
        };
        ensured.push(Query {
            ref_id,
            key: generate_key(index),
            model: query.model.clone(),
        });
    }
    ensured
}

/// Strips the transport fields of a query before it is stored or shared.
#[must_use]
pub fn clear_query_keys(query: &Query) -> Query {
    query.without_keys()
}

/// Returns true if any row carries a non-empty datasource field.
#[must_use]
pub fn has_non_empty_query(queries: &[Query]) -> bool {
    queries.iter().any(Query::is_non_empty)
}

/// Returns the per-row rendering keys for a datasource.
///
/// The datasource name is the primary key when known, the query key otherwise.
#[must_use]
pub fn get_query_keys(queries: &[Query], datasource_name: Option<&str>) -> Vec<String> {
    queries
        .iter()
        .enumerate()
        .map(|(index, query)| {
            let primary = datasource_name.unwrap_or(&query.key);
            format!("{primary}-{index}")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_serializes_transport_fields_in_camel_case() {
        let query = Query::from_expr("up").with_ref_id("A").with_key("Q-1");
        let value = serde_json::to_value(&query).unwrap();

        assert_eq!(value, json!({"refId": "A", "key": "Q-1", "expr": "up"}));
    }

    #[test]
    fn test_query_deserializes_unknown_fields_into_model() {
        let query: Query =
            serde_json::from_value(json!({"refId": "B", "expr": "up", "step": 15})).unwrap();

        assert_eq!(query.ref_id, "B");
        assert!(query.key.is_empty());
        assert_eq!(query.model.get("step"), Some(&json!(15)));
        assert_eq!(query.expr(), Some("up"));
    }

    #[test]
    fn test_without_keys_strips_transport_fields() {
        let query = Query::from_expr("up").with_ref_id("A").with_key("Q-1");
        let stripped = query.without_keys();

        assert!(stripped.ref_id.is_empty());
        assert!(stripped.key.is_empty());
        assert_eq!(stripped.model, query.model);
    }

    #[test]
    fn test_generate_key_is_unique() {
        let a = generate_key(0);
        let b = generate_key(0);

        assert!(a.starts_with("Q-"));
        assert!(a.ends_with("-0"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_generate_ref_id_picks_first_free_letter() {
        let queries = vec![
            Query::new().with_ref_id("A"),
            Query::new().with_ref_id("C"),
        ];

        assert_eq!(generate_ref_id(&[]), "A");
        assert_eq!(generate_ref_id(&queries), "B");
    }

    #[test]
    fn test_generate_ref_id_wraps_after_z() {
        let queries: Vec<Query> = REF_ID_LETTERS
            .chars()
            .map(|c| Query::new().with_ref_id(c.to_string()))
            .collect();

        assert_eq!(generate_ref_id(&queries), "A1");
    }

    #[test]
    fn test_ensure_queries_adds_empty_row() {
        let queries = ensure_queries(&[]);

        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].ref_id, "A");
        assert!(!queries[0].key.is_empty());
    }

    #[test]
    fn test_ensure_queries_keeps_unique_ref_ids_and_fixes_duplicates() {
        let queries = vec![
            Query::from_expr("a").with_ref_id("B"),
            Query::from_expr("b").with_ref_id("B"),
            Query::from_expr("c"),
        ];

        let ensured = ensure_queries(&queries);
        let ref_ids: Vec<&str> = ensured.iter().map(|q| q.ref_id.as_str()).collect();

        assert_eq!(ref_ids, vec!["B", "A", "C"]);
        assert!(ensured.iter().all(|q| !q.key.is_empty()));
    }

    #[test]
    fn test_has_non_empty_query() {
        assert!(!has_non_empty_query(&[Query::new().with_ref_id("A").with_key("k")]));
        assert!(!has_non_empty_query(&[Query::from_expr("")]));
        assert!(has_non_empty_query(&[Query::new(), Query::from_expr("up")]));
    }

    #[test]
    fn test_get_query_keys_prefers_datasource_name() {
        let queries = vec![Query::new().with_key("k1"), Query::new().with_key("k2")];

        assert_eq!(
            get_query_keys(&queries, Some("prom")),
            vec!["prom-0", "prom-1"]
        );
        assert_eq!(get_query_keys(&queries, None), vec!["k1-0", "k2-1"]);
    }
}
