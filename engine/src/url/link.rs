//! Explore links built from pane states and panels.

use crate::datasource::DataSource;
use crate::models::{clear_query_keys, Query, RawTimeRange, UiState};
use crate::session::ExploreSessionState;

use super::codec::{parse_url_state, serialize_state_to_url_param, ExploreUrlState, UrlStateError};

/// Path of the explore view.
pub const EXPLORE_PATH: &str = "/explore";

/// URL parameter of the left pane.
pub const LEFT_PARAM: &str = "left";

/// URL parameter of the right pane.
pub const RIGHT_PARAM: &str = "right";

impl ExploreUrlState {
    /// Captures the URL-relevant part of a session, without transport keys
    /// and empty rows.
    #[must_use]
    pub fn from_session(session: &ExploreSessionState) -> Self {
        Self {
            datasource: session.datasource_name.clone(),
            queries: session
                .queries
                .iter()
                .filter(|query| query.is_non_empty())
                .map(clear_query_keys)
                .collect(),
            range: session.range.clone(),
            ui: session.ui,
        }
    }
}

/// Renders `/explore?left=...` with an optional right pane.
///
/// # Errors
///
/// Returns an error if a pane state cannot be serialized.
pub fn explore_url(
    left: &ExploreUrlState,
    right: Option<&ExploreUrlState>,
    compact: bool,
) -> Result<String, UrlStateError> {
    let mut url = format!(
        "{EXPLORE_PATH}?{LEFT_PARAM}={}",
        serialize_state_to_url_param(left, compact)?
    );
    if let Some(right) = right {
        url.push('&');
        url.push_str(RIGHT_PARAM);
        url.push('=');
        url.push_str(&serialize_state_to_url_param(right, compact)?);
    }
    Ok(url)
}

/// Decoded pane parameters of an explore URL.
#[derive(Debug, Clone, PartialEq)]
pub struct PaneStates {
    /// Left pane; defaults when the parameter is absent.
    pub left: ExploreUrlState,
    /// Right pane, present when the view is split.
    pub right: Option<ExploreUrlState>,
}

/// Parses the `left` and `right` parameters of an explore URL or query string.
///
/// Unknown parameters are ignored; malformed pane states fall back to
/// defaults like [`parse_url_state`].
#[must_use]
pub fn parse_pane_params(url: &str) -> PaneStates {
    let query = url.split_once('?').map_or(url, |(_, query)| query);
    let query = query.split_once('#').map_or(query, |(query, _)| query);

    let mut left = None;
    let mut right = None;
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some((LEFT_PARAM, value)) => left = Some(value),
            Some((RIGHT_PARAM, value)) => right = Some(value),
            _ => {}
        }
    }

    PaneStates {
        left: parse_url_state(left),
        right: right.map(|value| parse_url_state(Some(value))),
    }
}

/// Builds an explore link for a panel's targets.
///
/// The datasource's own explore state is used when it provides one;
/// otherwise the targets are carried over as queries.
///
/// # Errors
///
/// Returns an error if the state cannot be serialized.
pub fn panel_explore_url(
    datasource: &dyn DataSource,
    targets: &[Query],
    range: &RawTimeRange,
) -> Result<String, UrlStateError> {
    let mut state = datasource
        .explore_state(targets)
        .unwrap_or_else(|| ExploreUrlState {
            datasource: None,
            queries: targets.iter().map(clear_query_keys).collect(),
            range: range.clone(),
            ui: UiState::default(),
        });
    state.datasource.get_or_insert_with(|| datasource.name().to_string());
    state.range = range.clone();

    explore_url(&state, None, true)
}
