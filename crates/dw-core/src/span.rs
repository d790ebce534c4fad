//! Saturating time arithmetic for configured durations.
//!
//! Durations arrive from config as raw seconds and may exceed what chrono
//! represents. Results clamp to the representable range instead of
//! panicking, so an oversized lookback covers all history and an
//! oversized interval is never reached.

use chrono::{DateTime, TimeDelta, Utc};

/// `secs` as a `TimeDelta`, clamped to the representable range.
pub fn seconds(secs: i64) -> TimeDelta {
    TimeDelta::try_seconds(secs).unwrap_or(if secs < 0 { TimeDelta::MIN } else { TimeDelta::MAX })
}

/// `at - secs`, clamped to the earliest representable instant.
pub fn before(at: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
    at.checked_sub_signed(seconds(secs)).unwrap_or(if secs < 0 {
        DateTime::<Utc>::MAX_UTC
    } else {
        DateTime::<Utc>::MIN_UTC
    })
}

/// `at + secs`, clamped to the latest representable instant.
pub fn after(at: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
    at.checked_add_signed(seconds(secs)).unwrap_or(if secs < 0 {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// True once at least `secs` have passed between `since` and `now`.
pub fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>, secs: i64) -> bool {
    now.signed_duration_since(since) >= seconds(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    #[test]
    fn in_range_arithmetic_is_exact() {
        assert_eq!(before(t0(), 3_600), Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap());
        assert_eq!(after(t0(), 60), Utc.with_ymd_and_hms(2026, 3, 2, 9, 1, 0).unwrap());
        assert!(elapsed(t0(), after(t0(), 300), 300));
        assert!(!elapsed(t0(), after(t0(), 299), 300));
    }

    #[test]
    fn extreme_values_clamp() {
        assert_eq!(seconds(i64::MAX), TimeDelta::MAX);
        assert_eq!(seconds(i64::MIN), TimeDelta::MIN);
        assert_eq!(before(t0(), i64::MAX), DateTime::<Utc>::MIN_UTC);
        assert_eq!(after(t0(), i64::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(before(t0(), i64::MIN), DateTime::<Utc>::MAX_UTC);
        assert!(!elapsed(t0(), after(t0(), 86_400 * 365 * 1_000), i64::MAX));
    }

    #[test]
    fn large_but_representable_delta_clamps_at_the_date_range() {
        // Fits in a TimeDelta but not in a DateTime offset from 2026.
        let secs = 400_000 * 365 * 86_400;
        assert_eq!(before(t0(), secs), DateTime::<Utc>::MIN_UTC);
        assert_eq!(after(t0(), secs), DateTime::<Utc>::MAX_UTC);
    }
}
