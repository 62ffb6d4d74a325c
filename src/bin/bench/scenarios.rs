// Scenario Definitions: session soak scenarios
// All scenario logic lives in rate curves and setup/event closures; the engine is driven
// only through its public session API.

use chrono::{DateTime, Utc};
use ore_engine::core_types::Ore;
use ore_engine::upgrades::UpgradeKind;
use ore_engine::MiningSession;

pub type SessionHook = Box<dyn Fn(&mut MiningSession, DateTime<Utc>, u64) + Send + Sync>;

// ─── Scenario Configuration ─────────────────────────────────────────────────

pub struct Scenario {
    pub name: &'static str,
    pub label: &'static str,
    pub category: &'static str,
    /// Simulated wall-clock seconds; one foreground tick per second.
    pub seconds: u64,
    /// Sessions for the same account sharing one backend.
    pub devices: u32,
    pub starting_energy: u32,
    pub starting_ore: u64,
    /// Expected taps per second per device.
    pub tap_rate: f64,
    pub tap_curve: Option<fn(u64) -> f64>,
    /// Probability that a single backend write fails.
    pub failure_rate: f64,
    pub criteria: PassCriteria,
    /// Applied to device 0 right after it opens.
    pub setup: Option<SessionHook>,
    /// Applied to device 0 at the start of every second.
    pub mid_event: Option<SessionHook>,
}

pub struct PassCriteria {
    /// Confirmed tap writes must equal the backend's `total_taps` delta.
    pub require_no_lost_taps: bool,
    /// A single device that ends with nothing in flight must match the backend row.
    pub require_backend_match: bool,
    pub min_accept_rate: Option<f64>,
    pub max_accept_rate: Option<f64>,
    pub min_final_ore: Option<f64>,
    pub min_rollbacks: Option<u32>,
}

impl Default for PassCriteria {
    fn default() -> Self {
        Self {
            require_no_lost_taps: true,
            require_backend_match: true,
            min_accept_rate: None,
            max_accept_rate: None,
            min_final_ore: None,
            min_rollbacks: None,
        }
    }
}

impl Scenario {
    fn base(name: &'static str, label: &'static str, category: &'static str) -> Self {
        Self {
            name,
            label,
            category,
            seconds: 600,
            devices: 1,
            starting_energy: 100,
            starting_ore: 0,
            tap_rate: 0.0,
            tap_curve: None,
            failure_rate: 0.0,
            criteria: PassCriteria::default(),
            setup: None,
            mid_event: None,
        }
    }

    pub fn tap_rate_at(&self, second: u64) -> f64 {
        match self.tap_curve {
            Some(curve) => curve(second),
            None => self.tap_rate,
        }
    }
}

// ─── Curve Functions ────────────────────────────────────────────────────────

/// Frantic tapping for the first minute, then nothing.
fn burst_then_rest(second: u64) -> f64 {
    if second < 60 { 5.0 } else { 0.0 }
}

/// Tapping only while the view is open (first and last minute).
fn open_close_open(second: u64) -> f64 {
    if second < 60 || second >= 3540 { 2.0 } else { 0.0 }
}

// ─── Scenarios ──────────────────────────────────────────────────────────────

pub fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            seconds: 3600,
            tap_rate: 0.02,
            criteria: PassCriteria { min_accept_rate: Some(99.0), ..PassCriteria::default() },
            ..Scenario::base("STEADY_TAPPER", "Steady tapper under regen rate", "energy")
        },
        Scenario {
            seconds: 300,
            tap_curve: Some(burst_then_rest),
            // 100 starting energy plus a handful regenerated against ~300 attempts.
            criteria: PassCriteria { max_accept_rate: Some(50.0), ..PassCriteria::default() },
            ..Scenario::base("BURST_DRAIN", "Burst drains energy to zero", "energy")
        },
        Scenario {
            seconds: 3600,
            tap_curve: Some(open_close_open),
            mid_event: Some(Box::new(|session: &mut MiningSession, now: DateTime<Utc>, second: u64| {
                if second == 60 {
                    session.suspend_core();
                } else if second == 3540 {
                    session.resume_core(now);
                }
            })),
            ..Scenario::base("IDLE_CATCH_UP", "View closed for an hour, catch-up on return", "lifecycle")
        },
        Scenario {
            seconds: 7200,
            starting_ore: 1000,
            setup: Some(Box::new(|session: &mut MiningSession, now: DateTime<Utc>, _: u64| {
                session.purchase_auto_tap_core(now);
            })),
            criteria: PassCriteria {
                require_no_lost_taps: false,
                min_final_ore: Some(1900.0),
                ..PassCriteria::default()
            },
            ..Scenario::base("AUTO_TAP_ACCRUAL", "Auto-tap accrues while idle", "accrual")
        },
        Scenario {
            seconds: 1800,
            starting_ore: 2000,
            tap_rate: 0.5,
            mid_event: Some(Box::new(|session: &mut MiningSession, now: DateTime<Utc>, second: u64| {
                if second % 300 == 0 {
                    session.purchase_upgrade_core(UpgradeKind::TapPower, now);
                }
                if second % 600 == 599 && session.store().record().ore >= Ore::whole(1000) {
                    session.convert_core(Ore::whole(1000), now);
                }
            })),
            ..Scenario::base("UPGRADE_LOOP", "Upgrades and conversions between taps", "economy")
        },
        Scenario {
            seconds: 900,
            devices: 2,
            tap_rate: 0.5,
            criteria: PassCriteria { require_backend_match: false, ..PassCriteria::default() },
            ..Scenario::base("DUAL_DEVICE_RACE", "Two devices racing on one account", "concurrency")
        },
        Scenario {
            seconds: 900,
            tap_rate: 1.0,
            failure_rate: 0.2,
            criteria: PassCriteria { min_rollbacks: Some(1), ..PassCriteria::default() },
            ..Scenario::base("FLAKY_BACKEND", "20% of writes fail and roll back", "persistence")
        },
    ]
}
