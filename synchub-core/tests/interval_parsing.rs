//! Interval spec parsing tests for `synchub-core`.
//!
//! Each `#[case]` is isolated; no shared state.

use std::time::Duration;

use rstest::rstest;
use synchub_core::interval::{parse_interval_ms, Interval, DEFAULT_INTERVAL};

// ---------------------------------------------------------------------------
// Millisecond conversion
// ---------------------------------------------------------------------------

#[rstest]
#[case("30s", 30_000)]
#[case("5m", 300_000)]
#[case("2h", 7_200_000)]
#[case("1d", 86_400_000)]
#[case("10", 600_000)]
#[case(" 45s ", 45_000)]
fn known_specs_parse(#[case] spec: &str, #[case] expected: u64) {
    assert_eq!(parse_interval_ms(spec), expected);
}

#[rstest]
#[case("xyz")]
#[case("")]
#[case("5x")]
#[case("m5")]
#[case("-5m")]
#[case("5 m")]
#[case("1.5h")]
#[case("manual")]
fn malformed_specs_fall_back_to_five_minutes(#[case] spec: &str) {
    assert_eq!(parse_interval_ms(spec), 300_000);
}

// ---------------------------------------------------------------------------
// Interval enum
// ---------------------------------------------------------------------------

#[test]
fn manual_never_has_a_period() {
    let interval = Interval::parse("manual");
    assert!(interval.is_manual());
    assert_eq!(interval.period(), None);
}

#[test]
fn garbage_is_scheduled_at_default_rather_than_manual() {
    let interval = Interval::parse("every tuesday");
    assert_eq!(interval, Interval::Every(DEFAULT_INTERVAL));
}

#[test]
fn periodic_interval_exposes_duration() {
    assert_eq!(Interval::parse("90s").period(), Some(Duration::from_secs(90)));
}
