//! URL state of explore panes.
//!
//! Each pane is stored in one URL parameter (`left`, `right`) holding either
//! the compact array form or the verbose object form.

mod codec;
mod link;

pub use codec::{
    decode, encode, parse_url_state, serialize_state_to_url_param, try_parse_url_state,
    ExploreUrlState, UrlStateError,
};
pub use link::{
    explore_url, panel_explore_url, parse_pane_params, PaneStates, EXPLORE_PATH, LEFT_PARAM,
    RIGHT_PARAM,
};
