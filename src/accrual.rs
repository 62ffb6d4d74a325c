//! Passive ORE accrual from auto-tap entitlements.
//!
//! An auto-tap entitlement simulates one tap every `interval` seconds until
//! it expires. Simulated taps earn the current tap power and do not spend
//! energy. Accrual is evaluated lazily from a persisted baseline, the same way
//! energy regeneration is, so a user returning after hours catches up in one
//! step.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::core_types::Ore;

/// Result of an accrual evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accrual {
    pub taps: u64,
    pub earned: Ore,
    /// New accrual baseline; the unfinished interval is carried forward.
    pub accrued_until: Option<DateTime<Utc>>,
}

impl Accrual {
    fn none(baseline: Option<DateTime<Utc>>) -> Self {
        Self { taps: 0, earned: Ore::zero(), accrued_until: baseline }
    }
}

/// Evaluate simulated taps between `last_accrual` and `min(now, expires_at)`.
pub fn accrue(
    expires_at: Option<DateTime<Utc>>,
    last_accrual: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    tap_power: Ore,
    interval_secs: u32,
) -> Accrual {
    let (expires_at, last) = match (expires_at, last_accrual) {
        (Some(e), Some(l)) => (e, l),
        _ => return Accrual::none(last_accrual),
    };

    let interval = i64::from(interval_secs.max(1));
    let window_end = now.min(expires_at);
    let window = (window_end - last).num_seconds().max(0);
    let taps = window / interval;
    if taps == 0 {
        return Accrual::none(Some(last));
    }

    Accrual {
        taps: taps as u64,
        earned: tap_power * taps as u64,
        accrued_until: Some(last + Duration::seconds(taps * interval)),
    }
}

/// Whether an entitlement is running at `now`.
pub fn is_active(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.map(|e| e > now).unwrap_or(false)
}

/// Expiry after buying `duration_secs` more auto-tap time.
///
/// Time stacks on top of an unexpired entitlement; an expired or absent one
/// restarts from `now`.
pub fn extend(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>, duration_secs: u32) -> DateTime<Utc> {
    let start = match expires_at {
        Some(e) if e > now => e,
        _ => now,
    };
    start + Duration::seconds(i64::from(duration_secs))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().expect("test: valid date")
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(secs)
    }

    #[test]
    fn no_entitlement_earns_nothing() {
        let a = accrue(None, Some(t0()), at(3600), Ore::whole(2), 5);
        assert_eq!(a.taps, 0);
        assert!(a.earned.is_zero());
        assert_eq!(a.accrued_until, Some(t0()));
    }

    #[test]
    fn accrues_whole_intervals_and_carries_remainder() {
        let a = accrue(Some(at(3600)), Some(t0()), at(23), Ore::whole(3), 5);
        assert_eq!(a.taps, 4);
        assert_eq!(a.earned, Ore::whole(12));
        assert_eq!(a.accrued_until, Some(at(20)));
    }

    #[test]
    fn stops_at_expiry() {
        let a = accrue(Some(at(100)), Some(t0()), at(10_000), Ore::whole(1), 5);
        assert_eq!(a.taps, 20);
        assert_eq!(a.accrued_until, Some(at(100)));

        // Nothing more after expiry.
        let again = accrue(Some(at(100)), a.accrued_until, at(20_000), Ore::whole(1), 5);
        assert_eq!(again.taps, 0);
    }

    #[test]
    fn clock_skew_earns_nothing() {
        let a = accrue(Some(at(3600)), Some(at(60)), t0(), Ore::whole(1), 5);
        assert_eq!(a.taps, 0);
    }

    #[test]
    fn extend_stacks_on_active_entitlement() {
        assert_eq!(extend(Some(at(500)), at(100), 1000), at(1500));
        assert_eq!(extend(Some(at(50)), at(100), 1000), at(1100));
        assert_eq!(extend(None, at(100), 1000), at(1100));
    }

    #[test]
    fn activity_window() {
        assert!(is_active(Some(at(10)), t0()));
        assert!(!is_active(Some(at(10)), at(10)));
        assert!(!is_active(None, t0()));
    }
}
