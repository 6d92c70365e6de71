//! Explore pane sessions.
//!
//! [`ExploreSessionState`] holds everything one pane owns. It only changes
//! through [`ExploreEvent`]s applied by [`reduce`]; [`explore_reducer`] routes
//! events to the left or right pane of an [`ExploreState`]. [`QueryRunner`]
//! executes the queries of a pane against a datasource.

mod event;
mod reducer;
mod runner;
mod state;

pub use event::{ExploreEvent, QueryModification};
pub use reducer::{explore_reducer, reduce, ExploreAction, ExploreId, ExploreState};
pub use runner::{PendingRun, QueryRunner, RunSummary, RunnerError};
pub use state::{ExploreSessionState, DEFAULT_GRAPH_INTERVAL_MS};
