//! Query interval calculation.
//!
//! Derives a sampling step from a time range, a resolution (pixels or point
//! count) and an optional datasource floor such as `15s` or `>10s`.

use chrono::{DateTime, Utc};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1},
    combinator::{all_consuming, map_res, opt, recognize, value},
    sequence::pair,
    IResult, Parser,
};
use thiserror::Error;

use super::datemath::DateMathError;
use crate::models::{IntervalValues, RawTimeRange, TimeRange};

/// Interval used when no resolution is known.
pub const DEFAULT_INTERVAL: &str = "1s";

/// [`DEFAULT_INTERVAL`] in milliseconds.
pub const DEFAULT_INTERVAL_MS: i64 = 1000;

const SECOND: f64 = 1.0;
const MINUTE: f64 = 60.0 * SECOND;
const HOUR: f64 = 60.0 * MINUTE;
const DAY: f64 = 24.0 * HOUR;
const WEEK: f64 = 7.0 * DAY;
const MONTH: f64 = 30.0 * DAY;
const YEAR: f64 = 365.0 * DAY;

/// Rounding ladder: `(upper bound exclusive, rounded interval)` in milliseconds.
const LADDER: [(i64, i64); 28] = [
    (15, 10),
    (35, 20),
    (75, 50),
    (150, 100),
    (350, 200),
    (750, 500),
    (1_500, 1_000),
    (3_500, 2_000),
    (7_500, 5_000),
    (12_500, 10_000),
    (17_500, 15_000),
    (25_000, 20_000),
    (45_000, 30_000),
    (90_000, 60_000),
    (210_000, 120_000),
    (450_000, 300_000),
    (750_000, 600_000),
    (1_050_000, 900_000),
    (1_500_000, 1_200_000),
    (2_700_000, 1_800_000),
    (5_400_000, 3_600_000),
    (9_000_000, 7_200_000),
    (16_200_000, 10_800_000),
    (32_400_000, 21_600_000),
    (86_400_000, 43_200_000),
    (604_800_000, 86_400_000),
    (1_814_400_000, 604_800_000),
    (3_628_800_000, 2_592_000_000),
];

/// Rounded interval above the last ladder step: one year.
const LADDER_TOP_MS: i64 = 31_536_000_000;

/// Errors that can occur while calculating intervals.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntervalError {
    /// The interval text is not `<number><unit>`.
    #[error("Invalid interval: '{0}'")]
    InvalidInterval(String),

    /// The range could not be resolved.
    #[error("Invalid range: {0}")]
    InvalidRange(#[from] DateMathError),
}

/// Calculates the interval for a raw range resolved against `now`.
///
/// A zero resolution short-circuits to the 1s default before anything is
/// parsed, so the floor and range text are not validated in that case.
///
/// # Errors
///
/// Returns an error if the range or the floor cannot be parsed.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use engine::models::RawTimeRange;
/// use engine::time::interval::get_intervals;
///
/// let values = get_intervals(&RawTimeRange::default(), Some("15s"), 0, Utc::now()).unwrap();
/// assert_eq!(values.interval, "1s");
/// assert_eq!(values.interval_ms, 1000);
/// ```
pub fn get_intervals(
    range: &RawTimeRange,
    floor: Option<&str>,
    resolution: u32,
    now: DateTime<Utc>,
) -> Result<IntervalValues, IntervalError> {
    if resolution == 0 {
        return Ok(IntervalValues::new(DEFAULT_INTERVAL, DEFAULT_INTERVAL_MS));
    }
    let range = range.resolve(now)?;
    calculate_interval(&range, resolution, floor)
}

/// Calculates the interval for a resolved range.
///
/// # Errors
///
/// Returns an error if `floor` is not a valid interval.
pub fn calculate_interval(
    range: &TimeRange,
    resolution: u32,
    floor: Option<&str>,
) -> Result<IntervalValues, IntervalError> {
    if resolution == 0 {
        return Ok(IntervalValues::new(DEFAULT_INTERVAL, DEFAULT_INTERVAL_MS));
    }

    let floor_ms = floor
        .map(|text| interval_to_ms(text.trim_start_matches('>')))
        .transpose()?;

    let mut interval_ms = round_interval(range.span_ms() / i64::from(resolution));
    if let Some(floor_ms) = floor_ms {
        interval_ms = interval_ms.max(floor_ms);
    }

    #[allow(clippy::cast_precision_loss)]
    let interval = seconds_to_hms(interval_ms as f64 / 1000.0);
    Ok(IntervalValues::new(interval, interval_ms))
}

/// Rounds a raw interval to the nearest step of the ladder.
#[must_use]
pub fn round_interval(interval_ms: i64) -> i64 {
    LADDER
        .iter()
        .find(|(bound, _)| interval_ms < *bound)
        .map_or(LADDER_TOP_MS, |(_, rounded)| *rounded)
}

/// Formats seconds with the largest fitting unit (`1y`, `7d`, `2h`, `5m`, `15s`, `500ms`).
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn seconds_to_hms(seconds: f64) -> String {
    let years = (seconds / YEAR).floor();
    if years >= 1.0 {
        return format!("{}y", years as i64);
    }
    let days = ((seconds % YEAR) / DAY).floor();
    if days >= 1.0 {
        return format!("{}d", days as i64);
    }
    let hours = ((seconds % DAY) / HOUR).floor();
    if hours >= 1.0 {
        return format!("{}h", hours as i64);
    }
    let minutes = ((seconds % HOUR) / MINUTE).floor();
    if minutes >= 1.0 {
        return format!("{}m", minutes as i64);
    }
    let secs = (seconds % MINUTE).floor();
    if secs >= 1.0 {
        return format!("{}s", secs as i64);
    }
    let millis = (seconds * 1000.0).floor();
    if millis >= 1.0 {
        return format!("{}ms", millis as i64);
    }
    "less than a millisecond".to_string()
}

/// Parses an interval such as `15s`, `1.5h` or `500ms` into milliseconds.
///
/// # Errors
///
/// Returns [`IntervalError::InvalidInterval`] if the text is malformed.
#[allow(clippy::cast_possible_truncation)]
pub fn interval_to_ms(text: &str) -> Result<i64, IntervalError> {
    let trimmed = text.trim();
    let (_, (amount, unit_seconds)) = all_consuming(pair(number, interval_unit))
        .parse(trimmed)
        .map_err(|_| IntervalError::InvalidInterval(text.to_string()))?;
    Ok((amount * unit_seconds * 1000.0).round() as i64)
}

fn number(input: &str) -> IResult<&str, f64> {
    map_res(recognize(pair(digit1, opt(pair(char('.'), digit1)))), str::parse::<f64>)
        .parse(input)
}

fn interval_unit(input: &str) -> IResult<&str, f64> {
    alt((
        value(0.001, tag("ms")),
        value(SECOND, char('s')),
        value(MINUTE, char('m')),
        value(HOUR, char('h')),
        value(DAY, char('d')),
        value(WEEK, char('w')),
        value(MONTH, char('M')),
        value(YEAR, char('y')),
    ))
    .parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_zero_resolution_returns_default() {
        let values = get_intervals(&RawTimeRange::default(), Some("garbage"), 0, now()).unwrap();
        assert_eq!(values, IntervalValues::new("1s", 1000));
    }

    #[test]
    fn test_calculate_table() {
        let cases = [
            // (from, to, resolution, floor, interval, interval_ms)
            ("now-6h", "now", 1000, None, "20s", 20_000),
            ("now-1h", "now", 1000, None, "5s", 5_000),
            ("now-1h", "now", 1000, Some("15s"), "15s", 15_000),
            ("now-1h", "now", 1000, Some(">30s"), "30s", 30_000),
            ("now-24h", "now", 1000, Some("15s"), "1m", 60_000),
            ("now-7d", "now", 100, None, "2h", 7_200_000),
            ("now-30d", "now", 10, None, "1d", 86_400_000),
            ("now-1m", "now", 1000, None, "50ms", 50),
            ("now-5y", "now", 1, None, "1y", LADDER_TOP_MS),
        ];

        for (from, to, resolution, floor, interval, interval_ms) in cases {
            let values =
                get_intervals(&RawTimeRange::new(from, to), floor, resolution, now()).unwrap();
            assert_eq!(
                values,
                IntervalValues::new(interval, interval_ms),
                "range {from}..{to} at {resolution}"
            );
        }
    }

    #[test]
    fn test_calculate_is_deterministic() {
        let range = RawTimeRange::new("now-3h", "now");
        let a = get_intervals(&range, Some("10s"), 800, now()).unwrap();
        let b = get_intervals(&range, Some("10s"), 800, now()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_floor_is_an_error() {
        let err = get_intervals(&RawTimeRange::default(), Some("soon"), 100, now()).unwrap_err();
        assert_eq!(err, IntervalError::InvalidInterval("soon".to_string()));
    }

    #[test]
    fn test_invalid_range_is_an_error() {
        let err = get_intervals(&RawTimeRange::new("x", "now"), None, 100, now()).unwrap_err();
        assert!(matches!(err, IntervalError::InvalidRange(_)));
    }

    #[test]
    fn test_interval_to_ms() {
        assert_eq!(interval_to_ms("500ms").unwrap(), 500);
        assert_eq!(interval_to_ms("15s").unwrap(), 15_000);
        assert_eq!(interval_to_ms("1.5h").unwrap(), 5_400_000);
        assert_eq!(interval_to_ms("1w").unwrap(), 604_800_000);
        assert!(interval_to_ms("15").is_err());
        assert!(interval_to_ms("s").is_err());
    }

    #[test]
    fn test_seconds_to_hms() {
        assert_eq!(seconds_to_hms(0.5), "500ms");
        assert_eq!(seconds_to_hms(15.0), "15s");
        assert_eq!(seconds_to_hms(300.0), "5m");
        assert_eq!(seconds_to_hms(7200.0), "2h");
        assert_eq!(seconds_to_hms(604_800.0), "7d");
        assert_eq!(seconds_to_hms(0.0), "less than a millisecond");
    }

    #[test]
    fn test_round_interval_ladder_edges() {
        assert_eq!(round_interval(0), 10);
        assert_eq!(round_interval(14), 10);
        assert_eq!(round_interval(15), 20);
        assert_eq!(round_interval(21_600_000), 21_600_000);
        assert_eq!(round_interval(i64::MAX), LADDER_TOP_MS);
    }
}
