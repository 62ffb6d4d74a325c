//! JS-facing view types returned from the wasm session.

use serde::{Deserialize, Serialize};

use crate::adapter;
use crate::backend::BackendError;
use crate::core_types::UserId;
use crate::energy::EnergyPhase;
use crate::record::UserPatch;
use crate::store::{MiningStore, PendingWrite, StoreError, WriteKind};

// ─── SessionSnapshot ─────────────────────────────────────────────────────────

/// Everything the mining view renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub user_id: String,
    pub energy: u32,
    pub max_energy: u32,
    /// `"REGENERATING"` or `"FULL"`.
    pub phase: String,
    /// `None` while the view is suspended or energy is full.
    pub seconds_until_next_tick: Option<u32>,
    pub ore_balance: f64,
    pub bio_balance: f64,
    pub total_taps: u64,
    pub tap_power: f64,
    pub tap_power_level: u32,
    pub capacity_level: u32,
    pub auto_tap_expires_at_ms: Option<f64>,
    pub pending_writes: usize,
    pub version: u64,
    pub needs_refresh: bool,
    pub active: bool,
}

impl SessionSnapshot {
    pub fn of(store: &MiningStore, countdown: Option<u32>, active: bool) -> Self {
        let record = store.record();
        let phase = record.energy.phase();
        Self {
            user_id: record.id.0.clone(),
            energy: record.energy.energy,
            max_energy: record.energy.max_energy,
            phase: phase.label().to_string(),
            seconds_until_next_tick: match phase {
                EnergyPhase::Full => None,
                EnergyPhase::Regenerating => countdown,
            },
            ore_balance: adapter::ore_to_f64(record.ore),
            bio_balance: adapter::bio_to_f64(record.bio),
            total_taps: record.total_taps,
            tap_power: adapter::ore_to_f64(store.tap_power()),
            tap_power_level: record.tap_power_level,
            capacity_level: record.capacity_level,
            auto_tap_expires_at_ms: record.auto_tap_expires_at.map(adapter::to_millis),
            pending_writes: store.pending_count(),
            version: record.version,
            needs_refresh: store.needs_refresh(),
            active,
        }
    }
}

// ─── ActionOutcome ───────────────────────────────────────────────────────────

/// Result of a user action (tap, purchase, conversion) or a write settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub accepted: bool,
    /// Machine-readable refusal code, e.g. `INSUFFICIENT_ENERGY`.
    pub error_code: Option<String>,
    /// Text for the transient notification.
    pub message: Option<String>,
    pub snapshot: SessionSnapshot,
}

impl ActionOutcome {
    pub fn accepted(snapshot: SessionSnapshot) -> Self {
        Self { accepted: true, error_code: None, message: None, snapshot }
    }

    pub fn refused(err: &StoreError, snapshot: SessionSnapshot) -> Self {
        Self {
            accepted: false,
            error_code: Some(err.code().to_string()),
            message: Some(err.to_string()),
            snapshot,
        }
    }

    /// Refusal for input that never reached the store.
    pub fn invalid(code: &str, message: String, snapshot: SessionSnapshot) -> Self {
        Self {
            accepted: false,
            error_code: Some(code.to_string()),
            message: Some(message),
            snapshot,
        }
    }
}

// ─── TickResult ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickResult {
    pub energy: u32,
    pub max_energy: u32,
    pub seconds_until_next_tick: Option<u32>,
    /// True when this tick produced a write (energy regenerated or auto-tap accrued).
    pub changed: bool,
    pub ore_balance: f64,
    pub active: bool,
    pub needs_refresh: bool,
}

// ─── OutboundWrite ───────────────────────────────────────────────────────────

/// A write the host must send to the backend, then report back through
/// `confirm_write` / `reject_write`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundWrite {
    pub write_id: u64,
    pub user_id: String,
    pub expected_version: u64,
    pub kind: WriteKind,
    pub patch: UserPatch,
}

impl From<PendingWrite> for OutboundWrite {
    fn from(w: PendingWrite) -> Self {
        Self {
            write_id: w.write_id,
            user_id: w.user_id,
            expected_version: w.expected_version,
            kind: w.kind,
            patch: w.patch,
        }
    }
}

// ─── WriteRejection ──────────────────────────────────────────────────────────

/// Failure reported by the host for an outbound write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WriteRejection {
    Conflict { expected: u64, actual: u64 },
    NotFound,
    Failure { message: String },
}

impl WriteRejection {
    pub fn into_error(self, user: &UserId) -> BackendError {
        match self {
            Self::Conflict { expected, actual } => BackendError::VersionConflict { expected, actual },
            Self::NotFound => BackendError::NotFound(user.clone()),
            Self::Failure { message } => BackendError::PersistenceFailure(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_parses_tagged_json() {
        let r: WriteRejection =
            serde_json::from_str(r#"{"kind":"conflict","expected":3,"actual":4}"#).expect("test: parse");
        assert_eq!(r, WriteRejection::Conflict { expected: 3, actual: 4 });

        let r: WriteRejection =
            serde_json::from_str(r#"{"kind":"failure","message":"timeout"}"#).expect("test: parse");
        assert_eq!(
            r.into_error(&UserId::from("u-1")),
            BackendError::PersistenceFailure("timeout".to_string())
        );
    }
}
