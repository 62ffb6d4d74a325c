//! Adapter layer: converts between the JS world (`f64` numbers, epoch
//! milliseconds) and the core's `Decimal` / `DateTime<Utc>` types.

use chrono::{DateTime, Utc};
use num_traits::ToPrimitive;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::core_types::{Bio, Ore};

/// Convert f64 to Decimal. Non-finite input maps to zero.
pub fn to_decimal(v: f64) -> Decimal {
    Decimal::from_f64(v).unwrap_or(Decimal::ZERO)
}

/// Convert Decimal to f64 (lossy, display only).
pub fn from_decimal(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

pub fn ore_to_f64(ore: Ore) -> f64 {
    from_decimal(ore.0)
}

pub fn bio_to_f64(bio: Bio) -> f64 {
    from_decimal(bio.0)
}

/// ORE amount typed into the UI. Fractions below 1e-8 are dropped.
pub fn ore_from_f64(v: f64) -> Ore {
    Ore(to_decimal(v).round_dp(8))
}

/// `Date.now()` style milliseconds → UTC timestamp.
pub fn from_millis(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(ms.trunc() as i64)
}

pub fn to_millis(t: DateTime<Utc>) -> f64 {
    t.timestamp_millis() as f64
}

/// Timestamp from the host, falling back to the local clock for bad input.
pub fn now_or_clock(ms: f64) -> DateTime<Utc> {
    from_millis(ms).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn millis_round_trip_whole_ms() {
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("test: date");
        let ms = to_millis(t);
        assert_eq!(ms, 1_772_366_400_000.0);
        assert_eq!(from_millis(ms), Some(t));
        assert_eq!(from_millis(ms + 0.9), Some(t));
    }

    #[test]
    fn bad_millis_rejected() {
        assert_eq!(from_millis(f64::NAN), None);
        assert_eq!(from_millis(f64::INFINITY), None);
    }

    #[test]
    fn decimal_conversions() {
        assert_eq!(ore_to_f64(Ore(dec!(12.5))), 12.5);
        assert_eq!(ore_from_f64(1500.0), Ore(dec!(1500)));
        assert_eq!(to_decimal(f64::NAN), Decimal::ZERO);
    }
}
