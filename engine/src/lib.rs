//! Explore Query Transaction Engine
//!
//! This crate turns the rows of an explore pane into query transactions,
//! tracks them until they complete, and composes their results into graph,
//! table and logs views. It also keeps per-datasource query history, encodes
//! pane state into URLs, and scans backwards through time for data.
//!
//! # Modules
//!
//! - [`models`] - Queries, time ranges, transactions, results and UI flags
//! - [`time`] - Date math and query interval calculation
//! - [`transaction`] - Transaction building, tracking and result aggregation
//! - [`datasource`] - The datasource seam and a synthetic implementation
//! - [`history`] - Persisted query history
//! - [`url`] - URL state encoding and explore links
//! - [`scan`] - Backward scanning through time
//! - [`session`] - Pane state, events and the async query runner
//! - [`config`] - Environment configuration
//!
//! # Example
//!
//! ```
//! use engine::models::{Query, ResultType};
//! use engine::session::{reduce, ExploreEvent, ExploreSessionState};
//!
//! let state = reduce(
//!     ExploreSessionState::new(),
//!     ExploreEvent::SetQueries {
//!         queries: vec![Query::from_expr("rate(http_requests_total[5m])")],
//!     },
//! );
//!
//! assert_eq!(state.query_keys.len(), 1);
//! assert!(state.ui.is_showing(ResultType::Graph));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod datasource;
pub mod history;
pub mod models;
pub mod scan;
pub mod session;
pub mod time;
pub mod transaction;
pub mod url;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde;
pub use serde_json;
pub use validator;
