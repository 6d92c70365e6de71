//! UI visibility state of an explore pane.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How repeated log lines are collapsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "DedupStrategyRepr")]
pub enum DedupStrategy {
    /// No deduplication.
    #[default]
    None,
    /// Identical lines.
    Exact,
    /// Lines that differ only in numbers.
    Numbers,
    /// Lines with the same token signature.
    Signature,
}

impl DedupStrategy {
    const ORDER: [DedupStrategy; 4] = [Self::None, Self::Exact, Self::Numbers, Self::Signature];
}

impl std::fmt::Display for DedupStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Exact => write!(f, "exact"),
            Self::Numbers => write!(f, "numbers"),
            Self::Signature => write!(f, "signature"),
        }
    }
}

/// Error for an unknown dedup strategy.
#[derive(Debug, Error)]
#[error("Unknown dedup strategy: {0}")]
pub struct UnknownDedupStrategy(String);

/// Dedup strategies are accepted by name or by position.
#[derive(Deserialize)]
#[serde(untagged)]
enum DedupStrategyRepr {
    Index(u64),
    Name(String),
}

impl TryFrom<DedupStrategyRepr> for DedupStrategy {
    type Error = UnknownDedupStrategy;

    fn try_from(repr: DedupStrategyRepr) -> Result<Self, Self::Error> {
        match repr {
            DedupStrategyRepr::Index(index) => usize::try_from(index)
                .ok()
                .and_then(|i| Self::ORDER.get(i).copied())
                .ok_or_else(|| UnknownDedupStrategy(index.to_string())),
            DedupStrategyRepr::Name(name) => Self::ORDER
                .into_iter()
                .find(|s| s.to_string() == name)
                .ok_or(UnknownDedupStrategy(name)),
        }
    }
}

/// Which result views are visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UiState {
    /// Graph view visible.
    pub showing_graph: bool,
    /// Logs view visible.
    pub showing_logs: bool,
    /// Table view visible.
    pub showing_table: bool,
    /// Log deduplication.
    pub dedup_strategy: DedupStrategy,
}

impl UiState {
    /// Returns whether the view for `result_type` is visible.
    #[must_use]
    pub fn is_showing(&self, result_type: super::ResultType) -> bool {
        match result_type {
            super::ResultType::Graph => self.showing_graph,
            super::ResultType::Table => self.showing_table,
            super::ResultType::Logs => self.showing_logs,
        }
    }
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            showing_graph: true,
            showing_logs: true,
            showing_table: true,
            dedup_strategy: DedupStrategy::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dedup_strategy_accepts_index_and_name() {
        let by_index: DedupStrategy = serde_json::from_value(json!(0)).unwrap();
        let by_name: DedupStrategy = serde_json::from_value(json!("numbers")).unwrap();

        assert_eq!(by_index, DedupStrategy::None);
        assert_eq!(by_name, DedupStrategy::Numbers);
        assert_eq!(serde_json::to_value(DedupStrategy::Exact).unwrap(), json!("exact"));
    }

    #[test]
    fn test_dedup_strategy_rejects_unknown() {
        assert!(serde_json::from_value::<DedupStrategy>(json!(9)).is_err());
        assert!(serde_json::from_value::<DedupStrategy>(json!("fuzzy")).is_err());
    }

    #[test]
    fn test_ui_state_missing_fields_default() {
        let ui: UiState = serde_json::from_value(json!({"showingTable": false})).unwrap();
        assert!(ui.showing_graph && ui.showing_logs);
        assert!(!ui.showing_table);
    }

    #[test]
    fn test_ui_state_defaults_show_everything() {
        let ui = UiState::default();
        assert!(ui.showing_graph && ui.showing_logs && ui.showing_table);
        assert_eq!(ui.dedup_strategy, DedupStrategy::None);
    }
}
