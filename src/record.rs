//! User-record contract with the external store.
//!
//! [`UserRecordDto`] mirrors the row exactly as the backend returns it.
//! [`UserRecord`] is the validated in-memory model; converting between them
//! fails fast on anything out of range instead of falling back to defaults.
//! Writes go out as a [`UserPatch`] holding only the fields that changed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{Bio, Ore, UserId};
use crate::energy::EnergyState;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed user record: {0}")]
    Malformed(String),

    #[error("field `{field}` out of range: {value}")]
    OutOfRange { field: &'static str, value: String },

    #[error("max_energy must be positive")]
    ZeroCapacity,

    #[error("energy {energy} exceeds max_energy {max_energy}")]
    EnergyAboveCapacity { energy: u32, max_energy: u32 },
}

// ---------------------------------------------------------------------------
// Wire shape
// ---------------------------------------------------------------------------

/// User row as serialized by the backend. Every column is required; nullable
/// columns are `Option` but must still be present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserRecordDto {
    pub id: String,
    pub energy: i64,
    pub max_energy: i64,
    pub last_energy_update: Option<DateTime<Utc>>,
    pub ore_balance: Decimal,
    pub bio_balance: Decimal,
    pub total_taps: i64,
    pub tap_power_level: i64,
    pub capacity_level: i64,
    pub auto_tap_expires_at: Option<DateTime<Utc>>,
    pub last_auto_tap_accrual: Option<DateTime<Utc>>,
    pub version: i64,
}

impl UserRecordDto {
    pub fn from_json(json: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(json).map_err(|e| DecodeError::Malformed(e.to_string()))
    }

    /// Row for a brand-new account with full energy.
    pub fn new_account(id: &str, capacity: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            energy: i64::from(capacity),
            max_energy: i64::from(capacity),
            last_energy_update: Some(now),
            ore_balance: Decimal::ZERO,
            bio_balance: Decimal::ZERO,
            total_taps: 0,
            tap_power_level: 0,
            capacity_level: 0,
            auto_tap_expires_at: None,
            last_auto_tap_accrual: None,
            version: 0,
        }
    }

    /// Apply a partial update in place (what the backend does on write).
    pub fn apply(&mut self, patch: &UserPatch) {
        if let Some(v) = patch.energy {
            self.energy = i64::from(v);
        }
        if let Some(v) = patch.max_energy {
            self.max_energy = i64::from(v);
        }
        if let Some(v) = patch.last_energy_update {
            self.last_energy_update = Some(v);
        }
        if let Some(v) = patch.ore_balance {
            self.ore_balance = v.0;
        }
        if let Some(v) = patch.bio_balance {
            self.bio_balance = v.0;
        }
        if let Some(v) = patch.total_taps {
            self.total_taps = v as i64;
        }
        if let Some(v) = patch.tap_power_level {
            self.tap_power_level = i64::from(v);
        }
        if let Some(v) = patch.capacity_level {
            self.capacity_level = i64::from(v);
        }
        if let Some(v) = patch.auto_tap_expires_at {
            self.auto_tap_expires_at = Some(v);
        }
        if let Some(v) = patch.last_auto_tap_accrual {
            self.last_auto_tap_accrual = Some(v);
        }
    }
}

fn to_u32(field: &'static str, value: i64) -> Result<u32, DecodeError> {
    u32::try_from(value).map_err(|_| DecodeError::OutOfRange { field, value: value.to_string() })
}

fn to_u64(field: &'static str, value: i64) -> Result<u64, DecodeError> {
    u64::try_from(value).map_err(|_| DecodeError::OutOfRange { field, value: value.to_string() })
}

fn non_negative(field: &'static str, value: Decimal) -> Result<Decimal, DecodeError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(DecodeError::OutOfRange { field, value: value.to_string() });
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Validated model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub id: UserId,
    pub energy: EnergyState,
    pub ore: Ore,
    pub bio: Bio,
    pub total_taps: u64,
    pub tap_power_level: u32,
    pub capacity_level: u32,
    pub auto_tap_expires_at: Option<DateTime<Utc>>,
    pub last_auto_tap_accrual: Option<DateTime<Utc>>,
    pub version: u64,
}

impl TryFrom<UserRecordDto> for UserRecord {
    type Error = DecodeError;

    fn try_from(dto: UserRecordDto) -> Result<Self, Self::Error> {
        if dto.id.trim().is_empty() {
            return Err(DecodeError::Malformed("empty user id".to_string()));
        }
        let energy = to_u32("energy", dto.energy)?;
        let max_energy = to_u32("max_energy", dto.max_energy)?;
        if max_energy == 0 {
            return Err(DecodeError::ZeroCapacity);
        }
        if energy > max_energy {
            return Err(DecodeError::EnergyAboveCapacity { energy, max_energy });
        }

        Ok(UserRecord {
            id: UserId(dto.id),
            energy: EnergyState {
                energy,
                max_energy,
                last_update: dto.last_energy_update,
            },
            ore: Ore(non_negative("ore_balance", dto.ore_balance)?),
            bio: Bio(non_negative("bio_balance", dto.bio_balance)?),
            total_taps: to_u64("total_taps", dto.total_taps)?,
            tap_power_level: to_u32("tap_power_level", dto.tap_power_level)?,
            capacity_level: to_u32("capacity_level", dto.capacity_level)?,
            auto_tap_expires_at: dto.auto_tap_expires_at,
            last_auto_tap_accrual: dto.last_auto_tap_accrual,
            version: to_u64("version", dto.version)?,
        })
    }
}

impl UserRecord {
    pub fn from_json(json: &str) -> Result<Self, DecodeError> {
        UserRecordDto::from_json(json)?.try_into()
    }

    /// Encode back to the wire shape.
    pub fn to_dto(&self) -> UserRecordDto {
        UserRecordDto {
            id: self.id.0.clone(),
            energy: i64::from(self.energy.energy),
            max_energy: i64::from(self.energy.max_energy),
            last_energy_update: self.energy.last_update,
            ore_balance: self.ore.0,
            bio_balance: self.bio.0,
            total_taps: self.total_taps as i64,
            tap_power_level: i64::from(self.tap_power_level),
            capacity_level: i64::from(self.capacity_level),
            auto_tap_expires_at: self.auto_tap_expires_at,
            last_auto_tap_accrual: self.last_auto_tap_accrual,
            version: self.version as i64,
        }
    }
}

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// Partial update; `None` fields are left untouched by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_energy: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_energy_update: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ore_balance: Option<Ore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio_balance: Option<Bio>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_taps: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tap_power_level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_tap_expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_auto_tap_accrual: Option<DateTime<Utc>>,
}

impl UserPatch {
    /// Fields that differ between `before` and `after`.
    ///
    /// Energy and its baseline always travel together so the backend never
    /// holds an energy value paired with a stale baseline.
    pub fn diff(before: &UserRecord, after: &UserRecord) -> Self {
        let mut patch = UserPatch::default();
        if before.energy.energy != after.energy.energy
            || before.energy.last_update != after.energy.last_update
        {
            patch.energy = Some(after.energy.energy);
            patch.last_energy_update = after.energy.last_update;
        }
        if before.energy.max_energy != after.energy.max_energy {
            patch.max_energy = Some(after.energy.max_energy);
        }
        if before.ore != after.ore {
            patch.ore_balance = Some(after.ore);
        }
        if before.bio != after.bio {
            patch.bio_balance = Some(after.bio);
        }
        if before.total_taps != after.total_taps {
            patch.total_taps = Some(after.total_taps);
        }
        if before.tap_power_level != after.tap_power_level {
            patch.tap_power_level = Some(after.tap_power_level);
        }
        if before.capacity_level != after.capacity_level {
            patch.capacity_level = Some(after.capacity_level);
        }
        if before.auto_tap_expires_at != after.auto_tap_expires_at {
            patch.auto_tap_expires_at = after.auto_tap_expires_at;
        }
        if before.last_auto_tap_accrual != after.last_auto_tap_accrual {
            patch.last_auto_tap_accrual = after.last_auto_tap_accrual;
        }
        patch
    }

    pub fn is_empty(&self) -> bool {
        *self == UserPatch::default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    const ROW: &str = r#"{
        "id": "u-1",
        "energy": 42,
        "max_energy": 100,
        "last_energy_update": "2026-03-01T12:00:00Z",
        "ore_balance": "1250.5",
        "bio_balance": 0,
        "total_taps": 1250,
        "tap_power_level": 0,
        "capacity_level": 0,
        "auto_tap_expires_at": null,
        "last_auto_tap_accrual": null,
        "version": 7
    }"#;

    #[test]
    fn decodes_valid_row() {
        let record = UserRecord::from_json(ROW).expect("test: valid row");
        assert_eq!(record.id, UserId::from("u-1"));
        assert_eq!(record.energy.energy, 42);
        assert_eq!(record.ore, Ore(dec!(1250.5)));
        assert_eq!(record.version, 7);
        assert_eq!(
            record.energy.last_update,
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single()
        );
    }

    #[test]
    fn missing_field_fails_fast() {
        let json = ROW.replace("\"total_taps\": 1250,", "");
        let err = UserRecord::from_json(&json);
        assert!(matches!(err, Err(DecodeError::Malformed(_))), "got {err:?}");
    }

    #[test]
    fn unknown_field_rejected() {
        let json = ROW.replace("\"version\": 7", "\"version\": 7, \"coins\": 3");
        assert!(matches!(UserRecord::from_json(&json), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn negative_energy_rejected() {
        let json = ROW.replace("\"energy\": 42", "\"energy\": -1");
        assert!(matches!(
            UserRecord::from_json(&json),
            Err(DecodeError::OutOfRange { field: "energy", .. })
        ));
    }

    #[test]
    fn energy_above_capacity_rejected() {
        let json = ROW.replace("\"energy\": 42", "\"energy\": 101");
        assert_eq!(
            UserRecord::from_json(&json),
            Err(DecodeError::EnergyAboveCapacity { energy: 101, max_energy: 100 })
        );
    }

    #[test]
    fn zero_capacity_rejected() {
        let json = ROW
            .replace("\"energy\": 42", "\"energy\": 0")
            .replace("\"max_energy\": 100", "\"max_energy\": 0");
        assert_eq!(UserRecord::from_json(&json), Err(DecodeError::ZeroCapacity));
    }

    #[test]
    fn negative_balance_rejected() {
        let json = ROW.replace("\"1250.5\"", "\"-3\"");
        assert!(matches!(
            UserRecord::from_json(&json),
            Err(DecodeError::OutOfRange { field: "ore_balance", .. })
        ));
    }

    #[test]
    fn diff_carries_energy_with_baseline() {
        let before = UserRecord::from_json(ROW).expect("test: valid row");
        let mut after = before.clone();
        after.energy.energy -= 1;
        after.ore = Ore(dec!(1251.5));

        let patch = UserPatch::diff(&before, &after);
        assert_eq!(patch.energy, Some(41));
        assert_eq!(patch.last_energy_update, before.energy.last_update);
        assert_eq!(patch.ore_balance, Some(Ore(dec!(1251.5))));
        assert_eq!(patch.total_taps, None);
        assert!(UserPatch::diff(&before, &before).is_empty());
    }

    #[test]
    fn patch_serializes_only_changes() {
        let patch = UserPatch { energy: Some(9), ..UserPatch::default() };
        let json = serde_json::to_string(&patch).expect("test: serialize");
        assert_eq!(json, r#"{"energy":9}"#);
    }

    #[test]
    fn apply_then_decode_round() {
        let mut dto = UserRecordDto::from_json(ROW).expect("test: dto");
        dto.apply(&UserPatch { energy: Some(10), total_taps: Some(1300), ..UserPatch::default() });
        let record = UserRecord::try_from(dto).expect("test: still valid");
        assert_eq!(record.energy.energy, 10);
        assert_eq!(record.total_taps, 1300);
    }
}
