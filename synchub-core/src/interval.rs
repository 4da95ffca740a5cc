//! Provider interval specs: `manual` or `<N>[s|m|h|d]`.
//!
//! A bare number is minutes. Anything unparseable falls back to five minutes
//! rather than disabling the provider.

use std::time::Duration;

pub const MANUAL: &str = "manual";
pub const DEFAULT_INTERVAL_SPEC: &str = "5m";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Parsed form of a record's `interval` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    /// Only runs on explicit request.
    Manual,
    Every(Duration),
}

impl Interval {
    pub fn parse(spec: &str) -> Self {
        if spec.trim().eq_ignore_ascii_case(MANUAL) {
            return Interval::Manual;
        }
        Interval::Every(Duration::from_millis(parse_interval_ms(spec)))
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, Interval::Manual)
    }

    pub fn period(&self) -> Option<Duration> {
        match self {
            Interval::Manual => None,
            Interval::Every(period) => Some(*period),
        }
    }
}

/// Parse an interval spec into milliseconds.
///
/// `"manual"` is not a duration and yields the default like any other
/// unrecognized spec; callers that care use [`Interval::parse`].
pub fn parse_interval_ms(spec: &str) -> u64 {
    parse_duration(spec)
        .and_then(|d| u64::try_from(d.as_millis()).ok())
        .unwrap_or(DEFAULT_INTERVAL.as_millis() as u64)
}

fn parse_duration(spec: &str) -> Option<Duration> {
    let spec = spec.trim();
    let digits_end = spec
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(spec.len());
    let (digits, unit) = spec.split_at(digits_end);
    if digits.is_empty() {
        return None;
    }
    let value: u64 = digits.parse().ok()?;
    let unit_secs: u64 = match unit {
        "s" => 1,
        "" | "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return None,
    };
    value.checked_mul(unit_secs).map(Duration::from_secs)
}
