//! Time range models.

use crate::time::datemath::{self, DateMathError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default range start for a fresh explore pane.
pub const DEFAULT_RANGE_FROM: &str = "now-6h";

/// Default range end for a fresh explore pane.
pub const DEFAULT_RANGE_TO: &str = "now";

/// A time range as the user typed it (`now-6h`, epoch millis, RFC 3339).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTimeRange {
    /// Range start expression.
    pub from: String,
    /// Range end expression.
    pub to: String,
}

impl RawTimeRange {
    /// Creates a raw range from two expressions.
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Creates an absolute raw range from two instants, encoded as epoch millis.
    #[must_use]
    pub fn absolute(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self::new(
            from.timestamp_millis().to_string(),
            to.timestamp_millis().to_string(),
        )
    }

    /// Resolves the range against `now`.
    ///
    /// `from` is rounded down and `to` is rounded up when the expression
    /// contains a rounding unit.
    ///
    /// # Errors
    ///
    /// Returns an error if either side is not a valid date math expression.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<TimeRange, DateMathError> {
        Ok(TimeRange {
            from: datemath::parse(&self.from, false, now)?,
            to: datemath::parse(&self.to, true, now)?,
            raw: self.clone(),
        })
    }
}

impl Default for RawTimeRange {
    fn default() -> Self {
        Self::new(DEFAULT_RANGE_FROM, DEFAULT_RANGE_TO)
    }
}

/// A resolved time range that still remembers its raw form for redisplay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Resolved start (floor semantics).
    pub from: DateTime<Utc>,
    /// Resolved end (ceiling semantics).
    pub to: DateTime<Utc>,
    /// The range as typed.
    pub raw: RawTimeRange,
}

impl TimeRange {
    /// Returns the span of the range in milliseconds (never negative).
    #[must_use]
    pub fn span_ms(&self) -> i64 {
        (self.to - self.from).num_milliseconds().max(0)
    }
}
