//! Human-facing time formatting shared by the CLI and status payloads.

use chrono::{DateTime, Utc};

/// Compact age such as `just now`, `5m ago`, `2h ago`, `3d ago`; `never` for `None`.
pub fn format_relative_time(now: DateTime<Utc>, then: Option<DateTime<Utc>>) -> String {
    let Some(then) = then else {
        return "never".to_string();
    };
    let seconds = now.signed_duration_since(then).num_seconds().max(0);
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if seconds < 60 {
        "just now".to_string()
    } else if minutes < 60 {
        format!("{minutes}m ago")
    } else if hours < 24 {
        format!("{hours}h ago")
    } else {
        format!("{days}d ago")
    }
}

/// Journal page key for `now`: `YYYYMMDD`.
pub fn journal_day(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn relative_time_buckets() {
        let now = Utc::now();
        assert_eq!(format_relative_time(now, None), "never");
        assert_eq!(format_relative_time(now, Some(now)), "just now");
        assert_eq!(format_relative_time(now, Some(now - Duration::seconds(310))), "5m ago");
        assert_eq!(format_relative_time(now, Some(now - Duration::hours(2))), "2h ago");
        assert_eq!(format_relative_time(now, Some(now - Duration::days(3))), "3d ago");
        assert_eq!(format_relative_time(now, Some(now + Duration::hours(1))), "just now");
    }

    #[test]
    fn journal_day_is_compact_date() {
        let ts = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 0).unwrap();
        assert_eq!(journal_day(ts), "20251231");
    }
}
