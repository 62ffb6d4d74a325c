//! Energy regeneration and consumption.
//!
//! Energy is the rate limiter on tapping. It regenerates one unit per
//! regeneration period up to `max_energy`:
//!
//! ```text
//! energy(t) = min(max_energy, energy(last) + floor((t - last) / period))
//! ```
//!
//! Everything here is pure arithmetic over timestamps. Persisting the result
//! is the caller's job (see `store`).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default seconds per regenerated energy unit.
pub const REGEN_PERIOD_SECS: u32 = 30;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnergyError {
    #[error("no energy left to spend")]
    InsufficientEnergy,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Per-user energy fields as stored in the user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyState {
    pub energy: u32,
    pub max_energy: u32,
    pub last_update: Option<DateTime<Utc>>,
}

impl EnergyState {
    /// State of a brand-new account.
    pub fn fresh(capacity: u32, now: DateTime<Utc>) -> Self {
        Self {
            energy: capacity,
            max_energy: capacity,
            last_update: Some(now),
        }
    }

    pub fn phase(&self) -> EnergyPhase {
        EnergyPhase::of(self.energy, self.max_energy)
    }
}

/// The two implicit states of the regeneration machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnergyPhase {
    /// Below capacity, ticking up once per period.
    Regenerating,
    /// At capacity; further ticks are discarded.
    Full,
}

impl EnergyPhase {
    pub fn of(energy: u32, max_energy: u32) -> Self {
        if energy >= max_energy {
            Self::Full
        } else {
            Self::Regenerating
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Regenerating => "REGENERATING",
            Self::Full => "FULL",
        }
    }
}

// ---------------------------------------------------------------------------
// Regeneration
// ---------------------------------------------------------------------------

/// Outcome of a regeneration evaluation at a fixed `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Regeneration {
    pub energy: u32,
    /// True when the energy value changed and should be written back.
    pub should_persist: bool,
    pub seconds_until_next_tick: u32,
    /// Baseline to write alongside `energy` when persisting.
    ///
    /// Below capacity this is `last_update + ticks * period`, carrying the
    /// partial period forward. At capacity it is `now`.
    pub baseline: Option<DateTime<Utc>>,
}

/// Regeneration with a configurable period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegenPolicy {
    pub period_secs: u32,
}

impl Default for RegenPolicy {
    fn default() -> Self {
        Self { period_secs: REGEN_PERIOD_SECS }
    }
}

impl RegenPolicy {
    pub fn new(period_secs: u32) -> Self {
        Self { period_secs: period_secs.max(1) }
    }

    /// Evaluate energy at `now` from the last persisted value.
    ///
    /// Energy is never lowered. A value at or above `max_energy` is returned
    /// unchanged; decoding rejects records where it exceeds capacity.
    pub fn regenerate(
        &self,
        last_update: Option<DateTime<Utc>>,
        current_energy: u32,
        max_energy: u32,
        now: DateTime<Utc>,
    ) -> Regeneration {
        let period = i64::from(self.period_secs);

        let last = match last_update {
            Some(t) => t,
            None => {
                return Regeneration {
                    energy: current_energy,
                    should_persist: false,
                    seconds_until_next_tick: self.period_secs,
                    baseline: None,
                };
            }
        };

        // Clock skew: a baseline in the future regenerates nothing.
        let elapsed = (now - last).num_seconds().max(0);
        let countdown = (period - elapsed % period) as u32;

        if elapsed < period || current_energy >= max_energy {
            return Regeneration {
                energy: current_energy,
                should_persist: false,
                seconds_until_next_tick: countdown,
                baseline: Some(last),
            };
        }

        let ticks = elapsed / period;
        let raised = u64::from(current_energy) + ticks as u64;
        let energy = raised.min(u64::from(max_energy)) as u32;

        let baseline = if energy >= max_energy {
            now
        } else {
            last + Duration::seconds(ticks * period)
        };

        Regeneration {
            energy,
            should_persist: energy != current_energy,
            seconds_until_next_tick: countdown,
            baseline: Some(baseline),
        }
    }
}

/// [`RegenPolicy::regenerate`] with the default 30 second period.
pub fn regenerate(
    last_update: Option<DateTime<Utc>>,
    current_energy: u32,
    max_energy: u32,
    now: DateTime<Utc>,
) -> Regeneration {
    RegenPolicy::default().regenerate(last_update, current_energy, max_energy, now)
}

// ---------------------------------------------------------------------------
// Consumption and capacity
// ---------------------------------------------------------------------------

/// Spend one unit of energy for a tap.
///
/// On success the caller must also reset the baseline to the tap time in
/// the same persisted write.
pub fn consume(current_energy: u32) -> Result<u32, EnergyError> {
    if current_energy == 0 {
        return Err(EnergyError::InsufficientEnergy);
    }
    Ok(current_energy - 1)
}

/// Raise capacity by `step`, leaving the current energy untouched.
pub fn upgrade_capacity(state: EnergyState, step: u32) -> EnergyState {
    EnergyState {
        max_energy: state.max_energy.saturating_add(step),
        ..state
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
