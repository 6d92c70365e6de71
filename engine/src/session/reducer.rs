//! Pane and split-view reducers.
//!
//! `reduce` applies one [`ExploreEvent`] to a pane and returns the new pane.
//! Results are recomputed after every change to the transactions.

use serde::{Deserialize, Serialize};

use super::event::ExploreEvent;
use super::state::ExploreSessionState;
use crate::models::{ensure_queries, generate_empty_query, generate_key, ResultType};

/// Applies one event to a pane.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn reduce(mut state: ExploreSessionState, event: ExploreEvent) -> ExploreSessionState {
    tracing::trace!(event = event.name(), "Reducing explore event");

    match event {
        ExploreEvent::AddQueryRow { index } => {
            if state.queries.len() >= state.max_rows {
                tracing::warn!(max_rows = state.max_rows, "Row limit reached, not adding a row");
                return state;
            }
            let at = (index + 1).min(state.queries.len());
            let query = generate_empty_query(&state.queries, at);
            state.queries.insert(at, query);
            state.transactions.remap_row_indices(at, 1);
            state.refresh_query_keys();
        }

        ExploreEvent::ChangeQuery { index, query } => {
            let Some(row) = state.queries.get_mut(index) else {
                tracing::warn!(index, "Ignoring change of unknown row");
                return state;
            };
            let mut next = query.unwrap_or_default();
            next.ref_id = std::mem::take(&mut row.ref_id);
            next.key = generate_key(index);
            *row = next;

            state.transactions.discard_for_row(index);
            state.refresh_query_keys();
            state.refresh_results();
        }

        ExploreEvent::ChangeSize { width, now } => {
            state.container_width = width;
            if let Err(error) = state.refresh_intervals(now) {
                tracing::warn!(%error, "Keeping previous query intervals");
            }
        }

        ExploreEvent::ChangeTime { range } => {
            if state.is_scanning() {
                state.scan.stop_scanning(&mut state.transactions);
            }
            state.range = range;
            state.refresh_results();
        }

        ExploreEvent::ClearQueries => {
            state.queries = ensure_queries(&[]);
            state.transactions.clear();
            state.refresh_query_keys();
            state.refresh_results();
        }

        ExploreEvent::Initialize {
            queries,
            range,
            ui,
            container_width,
        } => {
            state.queries = ensure_queries(&queries);
            state.range = range;
            state.ui = ui;
            state.container_width = container_width;
            state.initialized = true;
            state.refresh_query_keys();
        }

        ExploreEvent::LoadDatasourcePending {
            requested_datasource_name,
        } => {
            state.datasource_loading = true;
            state.requested_datasource_name = Some(requested_datasource_name);
        }

        ExploreEvent::LoadDatasourceFailure { error } => {
            tracing::warn!(%error, "Datasource failed to load");
            state.datasource_error = Some(error);
            state.datasource_loading = false;
        }

        ExploreEvent::LoadDatasourceMissing => {
            state.datasource_missing = true;
            state.datasource_loading = false;
        }

        ExploreEvent::LoadDatasourceSuccess {
            datasource,
            history,
            now,
        } => {
            state.datasource_name = Some(datasource.name().to_string());
            state.datasource_id = Some(datasource.id().to_string());
            state.capabilities = datasource.capabilities();
            state.datasource_loading = false;
            state.datasource_missing = false;
            state.datasource_error = None;
            state.datasource = Some(datasource);
            state.history = history;
            state.transactions.clear();
            if let Err(error) = state.refresh_intervals(now) {
                tracing::warn!(%error, "Keeping previous query intervals");
            }
            state.refresh_query_keys();
            state.refresh_results();
        }

        ExploreEvent::ModifyQueries {
            index,
            modification,
        } => {
            match index {
                None => {
                    for (i, query) in state.queries.iter_mut().enumerate() {
                        let mut next = modification.apply(query);
                        next.key = generate_key(i);
                        *query = next;
                    }
                    state.transactions.clear();
                }
                Some(index) => {
                    let Some(query) = state.queries.get_mut(index) else {
                        tracing::warn!(index, "Ignoring modification of unknown row");
                        return state;
                    };
                    let mut next = modification.apply(query);
                    next.key = generate_key(index);
                    *query = next;
                    if !modification.prevent_submit {
                        state.transactions.discard_for_row(index);
                    }
                }
            }
            state.refresh_query_keys();
            state.refresh_results();
        }

        ExploreEvent::QueriesImported { queries } => {
            state.queries = queries;
            state.refresh_query_keys();
        }

        ExploreEvent::QueryTransactionStart { transaction } => {
            state.transactions.start(*transaction);
            state.refresh_results();
        }

        ExploreEvent::QueryTransactionSuccess { id, result } => {
            if state.transactions.succeed(&id, result) {
                state.refresh_results();
            }
        }

        ExploreEvent::QueryTransactionFailure { id, error } => {
            if state.transactions.fail(&id, error) {
                state.refresh_results();
            }
        }

        ExploreEvent::RemoveQueryRow { index } => {
            if state.queries.len() <= 1 || index >= state.queries.len() {
                return state;
            }
            state.queries.remove(index);
            if index < state.query_keys.len() {
                state.query_keys.remove(index);
            }

            state.transactions.discard_for_row(index);
            state.transactions.retain_rows(&state.queries);
            state.transactions.remap_row_indices(index + 1, -1);
            state.refresh_results();
        }

        ExploreEvent::RunQueriesEmpty => {
            state.transactions.clear();
            state.refresh_results();
        }

        ExploreEvent::ScanStart { scanner } => {
            state.scan.start_scanning(scanner);
        }

        ExploreEvent::ScanRange { range } => {
            state.scan.set_scan_range(range.clone());
            state.range = range;
        }

        ExploreEvent::ScanStop => {
            state.scan.stop_scanning(&mut state.transactions);
            state.refresh_results();
        }

        ExploreEvent::SetQueries { queries } => {
            state.queries = queries;
            state.refresh_query_keys();
        }

        ExploreEvent::ToggleGraph => {
            state.ui.showing_graph = !state.ui.showing_graph;
            hide_if_off(&mut state, ResultType::Graph);
        }

        ExploreEvent::ToggleLogs => {
            state.ui.showing_logs = !state.ui.showing_logs;
            hide_if_off(&mut state, ResultType::Logs);
        }

        ExploreEvent::ToggleTable => {
            state.ui.showing_table = !state.ui.showing_table;
            hide_if_off(&mut state, ResultType::Table);
        }

        ExploreEvent::UpdateDatasourceInstance { datasource } => {
            state.datasource_name = Some(datasource.name().to_string());
            state.datasource_id = Some(datasource.id().to_string());
            state.datasource = Some(datasource);
            state.refresh_query_keys();
        }

        ExploreEvent::UpdateUi { ui } => {
            state.ui = ui;
            for result_type in ResultType::ALL {
                hide_if_off(&mut state, result_type);
            }
        }

        ExploreEvent::UpdateHistory { history } => {
            state.history = history;
        }

        ExploreEvent::ClearHistory => {
            state.history.clear();
        }
    }

    state
}

/// Discards the transactions of a hidden result view.
fn hide_if_off(state: &mut ExploreSessionState, result_type: ResultType) {
    if !state.ui.is_showing(result_type) && state.transactions.discard_by_result_type(result_type) > 0
    {
        state.refresh_results();
    }
}

impl ExploreSessionState {
    /// Applies an event in place.
    pub fn apply(&mut self, event: ExploreEvent) {
        let state = std::mem::take(self);
        *self = reduce(state, event);
    }
}

/// One side of the split view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExploreId {
    /// The left, primary pane.
    Left,
    /// The right pane of a split view.
    Right,
}

/// Both panes of the explore view.
#[derive(Debug, Clone, Default)]
pub struct ExploreState {
    /// True while the right pane is shown.
    pub split: bool,
    /// Left pane.
    pub left: ExploreSessionState,
    /// Right pane.
    pub right: ExploreSessionState,
}

impl ExploreState {
    /// Returns a pane.
    #[must_use]
    pub fn pane(&self, explore_id: ExploreId) -> &ExploreSessionState {
        match explore_id {
            ExploreId::Left => &self.left,
            ExploreId::Right => &self.right,
        }
    }

    fn pane_mut(&mut self, explore_id: ExploreId) -> &mut ExploreSessionState {
        match explore_id {
            ExploreId::Left => &mut self.left,
            ExploreId::Right => &mut self.right,
        }
    }
}

/// Actions of the split view.
#[derive(Debug, Clone)]
pub enum ExploreAction {
    /// An event for one pane.
    Pane {
        /// Target pane.
        explore_id: ExploreId,
        /// The event.
        event: ExploreEvent,
    },
    /// Opens the right pane with the given state.
    SplitOpen {
        /// Initial state of the right pane.
        item_state: Box<ExploreSessionState>,
    },
    /// Closes the right pane.
    SplitClose,
    /// Resets both panes.
    Reset,
}

/// Applies one action to the split view.
#[must_use]
pub fn explore_reducer(mut state: ExploreState, action: ExploreAction) -> ExploreState {
    match action {
        ExploreAction::Pane { explore_id, event } => {
            let pane = state.pane_mut(explore_id);
            pane.apply(event);
            state
        }
        ExploreAction::SplitOpen { item_state } => ExploreState {
            split: true,
            right: *item_state,
            ..state
        },
        ExploreAction::SplitClose => ExploreState {
            split: false,
            ..state
        },
        ExploreAction::Reset => ExploreState::default(),
    }
}
