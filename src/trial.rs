//! Remaining-trial-day arithmetic.

use chrono::{DateTime, Utc};

/// Milliseconds per day, used for calendar-independent elapsed-time
/// arithmetic. Calendar-day subtraction would report a trial ending in
/// 23h59m as 0 days; the product wants it reported as 1.
pub const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Sentinel meaning "no active trial".
pub const NO_ACTIVE_TRIAL: i64 = -1;

/// Whole days remaining in a trial, ceiling-rounded.
///
/// Returns [`NO_ACTIVE_TRIAL`] when `trial_ends_at` is absent or not
/// strictly in the future.
#[must_use]
pub fn remaining_trial_days(trial_ends_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    match trial_ends_at {
        Some(ends_at) if ends_at > now => {
            let remaining_ms = (ends_at - now).num_milliseconds();
            (remaining_ms + MS_PER_DAY - 1) / MS_PER_DAY
        }
        _ => NO_ACTIVE_TRIAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        "2025-03-14T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_no_trial_end_is_sentinel() {
        assert_eq!(remaining_trial_days(None, now()), NO_ACTIVE_TRIAL);
    }

    #[test]
    fn test_past_trial_is_sentinel() {
        let just_ended = now() - Duration::milliseconds(1);
        assert_eq!(remaining_trial_days(Some(just_ended), now()), NO_ACTIVE_TRIAL);

        // ending exactly now is not strictly in the future
        assert_eq!(remaining_trial_days(Some(now()), now()), NO_ACTIVE_TRIAL);
    }

    #[test]
    fn test_sub_day_remainder_rounds_up() {
        // 23h59m59.999s left still reports one full day
        let ends_at = now() + Duration::milliseconds(MS_PER_DAY - 1);
        assert_eq!(remaining_trial_days(Some(ends_at), now()), 1);

        let ends_at = now() + Duration::milliseconds(1);
        assert_eq!(remaining_trial_days(Some(ends_at), now()), 1);
    }

    #[test]
    fn test_exact_day_boundaries() {
        let ends_at = now() + Duration::milliseconds(MS_PER_DAY);
        assert_eq!(remaining_trial_days(Some(ends_at), now()), 1);

        let ends_at = now() + Duration::milliseconds(MS_PER_DAY + 1);
        assert_eq!(remaining_trial_days(Some(ends_at), now()), 2);

        let ends_at = now() + Duration::days(7);
        assert_eq!(remaining_trial_days(Some(ends_at), now()), 7);
    }
}
