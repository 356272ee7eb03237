//! Elapsed-day computation and date arithmetic shared by every scorer.
//!
//! All functions take `now` explicitly so callers (and tests) control the clock.

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Whole days elapsed from `from` to `to`, truncated toward zero.
///
/// Negative when `to` precedes `from`.
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    to.signed_duration_since(from).num_days()
}

/// Whole days since `then`, clamped at zero for timestamps in the future.
pub fn days_since(then: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    days_between(then, now).max(0)
}

/// Calendar days `today` is past `due`. Zero or negative means not yet overdue.
pub fn days_past(due: NaiveDate, today: NaiveDate) -> i64 {
    today.signed_duration_since(due).num_days()
}

/// `date + days`, or `None` when the result leaves chrono's supported range.
pub fn add_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    Duration::try_days(days).and_then(|d| date.checked_add_signed(d))
}

/// Start of a trailing window of `days` ending at `now`.
pub fn window_start(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    Duration::try_days(i64::from(days))
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn partial_days_truncate() {
        assert_eq!(days_between(at(2024, 3, 1, 12), at(2024, 3, 2, 11)), 0);
        assert_eq!(days_between(at(2024, 3, 1, 12), at(2024, 3, 2, 12)), 1);
        assert_eq!(days_between(at(2024, 3, 10, 0), at(2024, 3, 1, 0)), -9);
    }

    #[test]
    fn days_since_never_negative() {
        assert_eq!(days_since(at(2024, 3, 10, 0), at(2024, 3, 1, 0)), 0);
        assert_eq!(days_since(at(2024, 2, 1, 0), at(2024, 3, 1, 0)), 29);
    }

    #[test]
    fn days_past_counts_calendar_days() {
        let due = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(days_past(due, NaiveDate::from_ymd_opt(2024, 2, 20).unwrap()), 20);
        assert_eq!(days_past(due, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()), -30);
    }

    #[test]
    fn add_days_handles_overflow() {
        let d = NaiveDate::from_ymd_opt(2024, 2, 27).unwrap();
        assert_eq!(add_days(d, 3), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(add_days(d, i64::MAX), None);
    }

    #[test]
    fn window_start_subtracts_days() {
        assert_eq!(window_start(at(2024, 3, 31, 6), 60), at(2024, 1, 31, 6));
    }
}
