//! Time math: date math expressions and query interval calculation.

pub mod datemath;
pub mod interval;

pub use datemath::DateMathError;
pub use interval::{
    calculate_interval, get_intervals, interval_to_ms, round_interval, seconds_to_hms,
    IntervalError, DEFAULT_INTERVAL, DEFAULT_INTERVAL_MS,
};
