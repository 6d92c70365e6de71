//! Date math parser using nom.
//!
//! Parses range expressions like:
//! - `now`, `now-6h`, `now+1d`
//! - `now-1d/d` (rounded to a unit)
//! - `1700000000000` (epoch milliseconds)
//! - `2024-03-01T12:00:00Z` (RFC 3339)

use chrono::{
    DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc,
};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1},
    combinator::{all_consuming, map, map_res, opt, value},
    multi::many0,
    sequence::preceded,
    IResult, Parser,
};
use thiserror::Error;

/// Errors that can occur while evaluating date math.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateMathError {
    /// The expression is empty.
    #[error("Empty date expression")]
    Empty,

    /// The expression could not be parsed.
    #[error("Invalid date expression: '{0}'")]
    Invalid(String),

    /// The result is outside the representable range.
    #[error("Date expression out of range: '{0}'")]
    OutOfRange(String),
}

/// Calendar unit used in date math.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// `s`
    Second,
    /// `m`
    Minute,
    /// `h`
    Hour,
    /// `d`
    Day,
    /// `w`
    Week,
    /// `M`
    Month,
    /// `y`
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add(i64, Unit),
    Sub(i64, Unit),
    Round(Unit),
}

/// Returns true if the expression is relative to `now`.
#[must_use]
pub fn is_relative(text: &str) -> bool {
    text.trim().starts_with("now")
}

/// Evaluates a date math expression against `now`.
///
/// With `round_up` set, rounding operations (`/d`) snap to the last
/// millisecond of the unit instead of its start.
///
/// # Errors
///
/// Returns an error if the expression is empty, malformed or overflows.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use engine::time::datemath::parse;
///
/// let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
/// let start = parse("now-1d/d", false, now).unwrap();
/// assert_eq!(start, Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap());
/// ```
pub fn parse(text: &str, round_up: bool, now: DateTime<Utc>) -> Result<DateTime<Utc>, DateMathError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(DateMathError::Empty);
    }

    if is_relative(text) {
        let (_, ops) = all_consuming(relative)
            .parse(text)
            .map_err(|_| DateMathError::Invalid(text.to_string()))?;
        return ops.into_iter().try_fold(now, |acc, op| {
            apply(acc, op, round_up).ok_or_else(|| DateMathError::OutOfRange(text.to_string()))
        });
    }

    parse_absolute(text).ok_or_else(|| DateMathError::Invalid(text.to_string()))
}

fn parse_absolute(text: &str) -> Option<DateTime<Utc>> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.bytes().all(|b| b.is_ascii_digit()) {
        return text
            .parse::<i64>()
            .ok()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

// ============================================================================
// Parsers
// ============================================================================

fn relative(input: &str) -> IResult<&str, Vec<Op>> {
    preceded(tag("now"), many0(alt((shift, round)))).parse(input)
}

fn shift(input: &str) -> IResult<&str, Op> {
    let (input, sign) = alt((char('+'), char('-'))).parse(input)?;
    let (input, amount) = opt(amount).parse(input)?;
    let (input, unit) = unit(input)?;
    let amount = amount.unwrap_or(1);

    let op = if sign == '+' {
        Op::Add(amount, unit)
    } else {
        Op::Sub(amount, unit)
    };
    Ok((input, op))
}

fn round(input: &str) -> IResult<&str, Op> {
    map(preceded(char('/'), unit), Op::Round).parse(input)
}

fn amount(input: &str) -> IResult<&str, i64> {
    map_res(digit1, str::parse::<i64>).parse(input)
}

fn unit(input: &str) -> IResult<&str, Unit> {
    alt((
        value(Unit::Second, char('s')),
        value(Unit::Minute, char('m')),
        value(Unit::Hour, char('h')),
        value(Unit::Day, char('d')),
        value(Unit::Week, char('w')),
        value(Unit::Month, char('M')),
        value(Unit::Year, char('y')),
    ))
    .parse(input)
}

// ============================================================================
// Evaluation
// ============================================================================

fn apply(dt: DateTime<Utc>, op: Op, round_up: bool) -> Option<DateTime<Utc>> {
    match op {
        Op::Add(n, unit) => add_units(dt, n, unit),
        Op::Sub(n, unit) => add_units(dt, n.checked_neg()?, unit),
        Op::Round(unit) if round_up => end_of(dt, unit),
        Op::Round(unit) => start_of(dt, unit),
    }
}

fn add_units(dt: DateTime<Utc>, n: i64, unit: Unit) -> Option<DateTime<Utc>> {
    let fixed = |d: Option<Duration>| d.and_then(|d| dt.checked_add_signed(d));
    match unit {
        Unit::Second => fixed(Duration::try_seconds(n)),
        Unit::Minute => fixed(Duration::try_minutes(n)),
        Unit::Hour => fixed(Duration::try_hours(n)),
        Unit::Day => fixed(Duration::try_days(n)),
        Unit::Week => fixed(Duration::try_weeks(n)),
        Unit::Month => add_months(dt, n),
        Unit::Year => add_months(dt, n.checked_mul(12)?),
    }
}

fn add_months(dt: DateTime<Utc>, n: i64) -> Option<DateTime<Utc>> {
    let months = Months::new(u32::try_from(n.unsigned_abs()).ok()?);
    if n >= 0 {
        dt.checked_add_months(months)
    } else {
        dt.checked_sub_months(months)
    }
}

fn start_of(dt: DateTime<Utc>, unit: Unit) -> Option<DateTime<Utc>> {
    let date = dt.date_naive();
    let midnight = |d: NaiveDate| d.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
    match unit {
        Unit::Second => dt.with_nanosecond(0),
        Unit::Minute => dt.with_nanosecond(0)?.with_second(0),
        Unit::Hour => dt.with_nanosecond(0)?.with_second(0)?.with_minute(0),
        Unit::Day => midnight(date),
        Unit::Week => {
            let back = i64::from(date.weekday().num_days_from_monday());
            midnight(date.checked_sub_signed(Duration::try_days(back)?)?)
        }
        Unit::Month => midnight(date.with_day(1)?),
        Unit::Year => midnight(NaiveDate::from_ymd_opt(date.year(), 1, 1)?),
    }
}

fn end_of(dt: DateTime<Utc>, unit: Unit) -> Option<DateTime<Utc>> {
    let start = start_of(dt, unit)?;
    add_units(start, 1, unit)?.checked_sub_signed(Duration::milliseconds(1))
}
