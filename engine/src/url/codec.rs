//! Session state to URL parameter coding.
//!
//! Two forms are supported:
//!
//! - verbose: `{"datasource":..,"queries":[..],"range":{..},"ui":{..}}`
//! - compact: `[from, to, datasource, ...queries, {"ui":[graph, logs, table, dedup]}]`
//!
//! Both are URI-component-encoded JSON.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::models::{DedupStrategy, Query, RawTimeRange, UiState};

/// Index of the range start in the compact form.
const COMPACT_FROM: usize = 0;
/// Index of the range end in the compact form.
const COMPACT_TO: usize = 1;
/// Index of the datasource name in the compact form.
const COMPACT_DATASOURCE: usize = 2;
/// Index of the first query or UI segment in the compact form.
const COMPACT_SEGMENTS_START: usize = 3;
/// Minimum number of elements of a compact state.
const COMPACT_MIN_LEN: usize = 4;

/// Key marking the UI segment of the compact form.
const UI_MARKER: &str = "ui";

/// Keys that mark a compact segment as a query.
const QUERY_KEYS: [&str; 4] = ["expr", "expression", "query", "target"];

/// Errors raised while decoding URL state.
///
/// These never reach callers of [`parse_url_state`]; they are logged and the
/// default state is used instead. [`try_parse_url_state`] exposes them.
#[derive(Debug, Error)]
pub enum UrlStateError {
    /// The parameter is not valid percent-encoded UTF-8.
    #[error("Invalid URL encoding: {0}")]
    InvalidEncoding(String),

    /// The parameter is not valid JSON, or the JSON does not fit the state.
    #[error("Invalid URL state JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The compact form has too few elements.
    #[error("Compact URL state needs at least {COMPACT_MIN_LEN} elements, got {0}")]
    TooFewSegments(usize),

    /// A compact segment is neither a query nor the UI marker, or a range
    /// bound or datasource segment has the wrong type.
    #[error("Invalid segment at position {index}: {reason}")]
    InvalidSegment {
        /// Position in the compact array.
        index: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// The JSON is neither an object nor an array.
    #[error("URL state must be a JSON object or array")]
    UnexpectedShape,
}

/// The part of a session that is stored in the URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExploreUrlState {
    /// Datasource name; `None` falls back to the last used datasource.
    pub datasource: Option<String>,
    /// Row queries without transport keys.
    pub queries: Vec<Query>,
    /// Raw time range.
    pub range: RawTimeRange,
    /// UI visibility flags.
    pub ui: UiState,
}

impl Default for ExploreUrlState {
    fn default() -> Self {
        Self {
            datasource: None,
            queries: Vec::new(),
            range: RawTimeRange::default(),
            ui: UiState::default(),
        }
    }
}

/// Decodes a URL parameter into state, falling back to defaults.
///
/// A missing or empty parameter yields the default state silently; malformed
/// input is logged and also yields the default state.
///
/// # Example
///
/// ```
/// use engine::url::parse_url_state;
///
/// let state = parse_url_state(Some(r#"["now-1h","now","ds1",{"expr":"up"},{"ui":[true,true,false,"none"]}]"#));
/// assert_eq!(state.datasource.as_deref(), Some("ds1"));
/// assert_eq!(state.queries.len(), 1);
/// assert!(!state.ui.showing_table);
///
/// let fallback = parse_url_state(Some("%7Bnot json"));
/// assert_eq!(fallback, Default::default());
/// ```
#[must_use]
pub fn parse_url_state(raw: Option<&str>) -> ExploreUrlState {
    let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) else {
        return ExploreUrlState::default();
    };

    match try_parse_url_state(raw) {
        Ok(state) => state,
        Err(error) => {
            tracing::warn!(%error, raw, "Malformed explore URL state, using defaults");
            ExploreUrlState::default()
        }
    }
}

/// Alias of [`parse_url_state`] for a present parameter.
#[must_use]
pub fn decode(raw: &str) -> ExploreUrlState {
    parse_url_state(Some(raw))
}

/// Decodes a URL parameter into state.
///
/// # Errors
///
/// Returns an error if the parameter cannot be decoded.
pub fn try_parse_url_state(raw: &str) -> Result<ExploreUrlState, UrlStateError> {
    let decoded =
        urlencoding::decode(raw).map_err(|e| UrlStateError::InvalidEncoding(e.to_string()))?;

    match serde_json::from_str::<Value>(&decoded)? {
        Value::Array(segments) => parse_compact(&segments),
        value @ Value::Object(_) => Ok(serde_json::from_value(value)?),
        _ => Err(UrlStateError::UnexpectedShape),
    }
}

fn parse_compact(segments: &[Value]) -> Result<ExploreUrlState, UrlStateError> {
    if segments.len() < COMPACT_MIN_LEN {
        return Err(UrlStateError::TooFewSegments(segments.len()));
    }

    let range = RawTimeRange::new(
        range_part(&segments[COMPACT_FROM], COMPACT_FROM)?,
        range_part(&segments[COMPACT_TO], COMPACT_TO)?,
    );
    let datasource = match &segments[COMPACT_DATASOURCE] {
        Value::Null => None,
        Value::String(name) => Some(name.clone()),
        other => {
            return Err(UrlStateError::InvalidSegment {
                index: COMPACT_DATASOURCE,
                reason: format!("datasource must be a string, got {other}"),
            })
        }
    };

    let mut queries: Vec<Query> = Vec::new();
    let mut ui = None;
    for (index, segment) in segments.iter().enumerate().skip(COMPACT_SEGMENTS_START) {
        let Value::Object(fields) = segment else {
            return Err(UrlStateError::InvalidSegment {
                index,
                reason: format!("expected an object, got {segment}"),
            });
        };

        // Any object with a `ui` key is the marker, wherever it appears.
        if let Some(flags) = fields.get(UI_MARKER) {
            if ui.is_none() {
                ui = Some(parse_ui_flags(flags, index)?);
            }
        } else if is_query_segment(fields) {
            queries.push(serde_json::from_value(segment.clone())?);
        } else {
            return Err(UrlStateError::InvalidSegment {
                index,
                reason: format!("expected a query or the ui marker, got {segment}"),
            });
        }
    }

    Ok(ExploreUrlState {
        datasource,
        queries,
        range,
        ui: ui.unwrap_or_default(),
    })
}

fn is_query_segment(fields: &serde_json::Map<String, Value>) -> bool {
    QUERY_KEYS.iter().any(|key| fields.contains_key(*key))
}

fn range_part(value: &Value, index: usize) -> Result<String, UrlStateError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(millis) => Ok(millis.to_string()),
        other => Err(UrlStateError::InvalidSegment {
            index,
            reason: format!("range bound must be a string or number, got {other}"),
        }),
    }
}

fn parse_ui_flags(flags: &Value, index: usize) -> Result<UiState, UrlStateError> {
    let invalid = |reason: String| UrlStateError::InvalidSegment { index, reason };

    let Value::Array(flags) = flags else {
        return Err(invalid(format!("ui marker must hold an array, got {flags}")));
    };
    let defaults = UiState::default();
    let flag = |i: usize, default: bool| match flags.get(i) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(invalid(format!("ui flag {i} must be a boolean, got {other}"))),
    };

    let dedup_strategy = match flags.get(3) {
        None | Some(Value::Null) => DedupStrategy::default(),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| invalid(format!("dedup strategy: {e}")))?,
    };

    Ok(UiState {
        showing_graph: flag(0, defaults.showing_graph)?,
        showing_logs: flag(1, defaults.showing_logs)?,
        showing_table: flag(2, defaults.showing_table)?,
        dedup_strategy,
    })
}

/// Encodes state as a URI-component-encoded URL parameter.
///
/// The compact form only holds queries with a query key; other rows are
/// left out.
///
/// # Errors
///
/// Returns an error if a query cannot be serialized.
pub fn serialize_state_to_url_param(
    state: &ExploreUrlState,
    compact: bool,
) -> Result<String, UrlStateError> {
    let value = if compact {
        let mut segments = vec![
            json!(state.range.from),
            json!(state.range.to),
            json!(state.datasource),
        ];
        for query in &state.queries {
            let Value::Object(fields) = serde_json::to_value(query)? else {
                continue;
            };
            if is_query_segment(&fields) {
                segments.push(Value::Object(fields));
            }
        }
        segments.push(json!({
            UI_MARKER: [
                state.ui.showing_graph,
                state.ui.showing_logs,
                state.ui.showing_table,
                state.ui.dedup_strategy,
            ]
        }));
        Value::Array(segments)
    } else {
        serde_json::to_value(state)?
    };

    Ok(urlencoding::encode(&value.to_string()).into_owned())
}

/// Alias of [`serialize_state_to_url_param`].
///
/// # Errors
///
/// Returns an error if a query cannot be serialized.
pub fn encode(state: &ExploreUrlState, compact: bool) -> Result<String, UrlStateError> {
    serialize_state_to_url_param(state, compact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_state() -> ExploreUrlState {
        ExploreUrlState {
            datasource: Some("prometheus".to_string()),
            queries: vec![
                Query::from_expr("rate(http_requests_total[5m])"),
                Query::from_expr("up{job=\"api\"}").with_field("legendFormat", json!("{{instance}}")),
            ],
            range: RawTimeRange::new("now-1h", "now"),
            ui: UiState {
                showing_graph: true,
                showing_logs: false,
                showing_table: true,
                dedup_strategy: DedupStrategy::Numbers,
            },
        }
    }

    #[test]
    fn test_decode_compact_example() {
        let state = parse_url_state(Some(
            r#"["now-1h","now","ds1",{"expr":"up"},{"ui":[true,true,false,0]}]"#,
        ));

        assert_eq!(
            state,
            ExploreUrlState {
                datasource: Some("ds1".to_string()),
                queries: vec![Query::from_expr("up")],
                range: RawTimeRange::new("now-1h", "now"),
                ui: UiState {
                    showing_graph: true,
                    showing_logs: true,
                    showing_table: false,
                    dedup_strategy: DedupStrategy::None,
                },
            }
        );
    }

    #[test]
    fn test_round_trip_compact() {
        let state = sample_state();
        let encoded = serialize_state_to_url_param(&state, true).unwrap();
        assert_eq!(parse_url_state(Some(&encoded)), state);
    }

    #[test]
    fn test_round_trip_verbose() {
        let state = sample_state();
        let encoded = serialize_state_to_url_param(&state, false).unwrap();
        assert_eq!(parse_url_state(Some(&encoded)), state);
    }

    #[test]
    fn test_round_trip_default_state() {
        let state = ExploreUrlState::default();
        for compact in [true, false] {
            let encoded = encode(&state, compact).unwrap();
            assert_eq!(decode(&encoded), state);
        }
    }

    #[test]
    fn test_encoded_param_is_uri_component_safe() {
        let encoded = serialize_state_to_url_param(&sample_state(), true).unwrap();
        assert!(!encoded.contains(['"', '{', '[', ' ', '&', '=']));
        assert!(encoded.starts_with("%5B%22now-1h%22"));
    }

    #[test]
    fn test_verbose_form_shape() {
        let encoded = serialize_state_to_url_param(&sample_state(), false).unwrap();
        let value: Value = serde_json::from_str(&urlencoding::decode(&encoded).unwrap()).unwrap();
        assert_eq!(value["datasource"], "prometheus");
        assert_eq!(value["range"]["from"], "now-1h");
        assert_eq!(value["ui"]["dedupStrategy"], "numbers");
    }

    #[test]
    fn test_missing_or_empty_param_gives_defaults() {
        assert_eq!(parse_url_state(None), ExploreUrlState::default());
        assert_eq!(parse_url_state(Some("")), ExploreUrlState::default());
    }

    #[test]
    fn test_malformed_input_falls_back_to_defaults() {
        for raw in [
            "{not json",
            "42",
            r#"["now-1h","now","ds1"]"#,
            r#"["now-1h","now","ds1","oops"]"#,
            r#"["now-1h","now","ds1",{"ui":"yes"}]"#,
            r#"["now-1h","now",7,{"expr":"up"}]"#,
            r#"{"queries":"up"}"#,
        ] {
            assert_eq!(parse_url_state(Some(raw)), ExploreUrlState::default(), "{raw}");
        }
    }

    #[test]
    fn test_object_without_query_key_is_rejected() {
        let raw = r#"["now-1h","now","ds1",{"foo":1},{"ui":[true,true,false,0]}]"#;
        let err = try_parse_url_state(raw).unwrap_err();
        assert!(matches!(err, UrlStateError::InvalidSegment { index: 3, .. }));
        assert_eq!(parse_url_state(Some(raw)), ExploreUrlState::default());

        let err = try_parse_url_state(r#"["now-1h","now","ds1",{}]"#).unwrap_err();
        assert!(matches!(err, UrlStateError::InvalidSegment { index: 3, .. }));
    }

    #[test]
    fn test_query_keys_other_than_expr_are_accepted() {
        let state = parse_url_state(Some(
            r#"["now-1h","now","ds1",{"target":"a.b"},{"query":"{app=\"x\"}","refId":"B"}]"#,
        ));
        assert_eq!(state.queries.len(), 2);
        assert_eq!(state.queries[1].ref_id, "B");
    }

    #[test]
    fn test_compact_form_leaves_out_rows_without_query_key() {
        let mut state = sample_state();
        state.queries.push(Query::new().with_field("hide", json!(true)));

        let encoded = serialize_state_to_url_param(&state, true).unwrap();
        assert_eq!(parse_url_state(Some(&encoded)), sample_state());

        let verbose = serialize_state_to_url_param(&state, false).unwrap();
        assert_eq!(parse_url_state(Some(&verbose)), state);
    }

    #[test]
    fn test_too_few_segments_is_reported() {
        let err = try_parse_url_state(r#"["now-1h","now","ds1"]"#).unwrap_err();
        assert!(matches!(err, UrlStateError::TooFewSegments(3)));
    }

    #[test]
    fn test_compact_without_ui_marker_uses_default_ui() {
        let state = parse_url_state(Some(r#"["now-1h","now",null,{"expr":"up"}]"#));
        assert_eq!(state.datasource, None);
        assert_eq!(state.ui, UiState::default());
        assert_eq!(state.queries, vec![Query::from_expr("up")]);
    }

    #[test]
    fn test_compact_accepts_numeric_range_bounds() {
        let state = parse_url_state(Some(r#"[1500000000000,1500000360000,"ds1",{"expr":"up"}]"#));
        assert_eq!(state.range, RawTimeRange::new("1500000000000", "1500000360000"));
    }

    #[test]
    fn test_ui_key_marks_ui_segment_even_mid_array() {
        // A query that carries a `ui` field is taken as the UI marker; the
        // queries around it are kept.
        let state = parse_url_state(Some(
            r#"["now-1h","now","ds1",{"expr":"a"},{"expr":"b","ui":[false,true,true]},{"expr":"c"}]"#,
        ));

        let exprs: Vec<_> = state.queries.iter().filter_map(Query::expr).collect();
        assert_eq!(exprs, vec!["a", "c"]);
        assert!(!state.ui.showing_graph);
    }

    #[test]
    fn test_partial_ui_flags_default_to_shown() {
        let state = parse_url_state(Some(r#"["now-1h","now","ds1",{"ui":[false]}]"#));
        assert!(!state.ui.showing_graph);
        assert!(state.ui.showing_logs && state.ui.showing_table);
        assert!(state.queries.is_empty());
    }
}
