// Monte Carlo Infrastructure: N seeded soak runs per scenario with statistical aggregation
// Each run drives one or more mining sessions against a shared in-memory backend,
// delivering every write and checking the session invariants once per simulated second.

use chrono::{DateTime, Duration, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;

use ore_engine::adapter;
use ore_engine::backend::{Backend, BackendError, MemoryBackend};
use ore_engine::core_types::UserId;
use ore_engine::record::UserRecordDto;
use ore_engine::store::WriteKind;
use ore_engine::{EngineConfig, MiningSession, StoreError, WriteRejection};

use crate::report::*;
use crate::scenarios::Scenario;
use crate::traffic::TapTraffic;

use std::time::Instant;

const SOAK_USER: &str = "soak-user";

/// 2026-01-01T00:00:00Z
fn soak_start() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_767_225_600, 0).unwrap_or_default()
}

#[derive(Default)]
struct RunCounters {
    taps_attempted: u64,
    taps_accepted: u64,
    taps_refused: u64,
    writes_sent: u64,
    writes_confirmed: u64,
    rollbacks: u32,
    conflicts: u32,
    reloads: u32,
    energy_violations: u32,
    ledger_violations: u32,
    confirmed_taps: u64,
}

/// Deliver every releasable write of `session`, reloading whenever the
/// session reports it is out of sync.
fn flush(
    session: &mut MiningSession,
    backend: &MemoryBackend,
    traffic: &mut TapTraffic,
    failure_rate: f64,
    now: DateTime<Utc>,
    c: &mut RunCounters,
) -> Result<(), StoreError> {
    let user = session.user_id().clone();
    loop {
        let writes = session.take_writes_core();
        if writes.is_empty() {
            if !session.store().needs_refresh() {
                return Ok(());
            }
            let dto = backend.fetch_user(&user)?;
            session.reload_core(dto, now);
            c.reloads += 1;
            continue;
        }

        for write in writes {
            c.writes_sent += 1;
            let result = if traffic.write_fails(failure_rate) {
                Err(BackendError::PersistenceFailure("injected write failure".to_string()))
            } else {
                backend.update_user(&user, write.expected_version, &write.patch)
            };

            match result {
                Ok(version) => {
                    c.writes_confirmed += 1;
                    if write.kind == WriteKind::Tap {
                        c.confirmed_taps += 1;
                    }
                    session.confirm_write_core(write.write_id, version);
                }
                Err(e) => {
                    let rejection = match e {
                        BackendError::VersionConflict { expected, actual } => {
                            c.conflicts += 1;
                            WriteRejection::Conflict { expected, actual }
                        }
                        BackendError::NotFound(_) => WriteRejection::NotFound,
                        BackendError::PersistenceFailure(message) => WriteRejection::Failure { message },
                    };
                    c.rollbacks += 1;
                    session.reject_write_core(write.write_id, rejection);
                }
            }
        }
    }
}

/// Run a single scenario iteration with a specific seed.
pub fn run_single(scenario: &Scenario, config: &EngineConfig, seed: u64) -> Result<BenchResult, StoreError> {
    let start = Instant::now();
    let t0 = soak_start();
    let user = UserId::from(SOAK_USER);

    let backend = MemoryBackend::new();
    let mut row = UserRecordDto::new_account(SOAK_USER, config.initial_energy, t0);
    row.energy = i64::from(scenario.starting_energy.min(config.initial_energy));
    row.ore_balance = Decimal::from(scenario.starting_ore);
    backend.insert(row);

    let mut traffic = TapTraffic::new(ChaCha8Rng::seed_from_u64(seed));
    let mut c = RunCounters::default();

    let mut sessions = Vec::with_capacity(scenario.devices as usize);
    for _ in 0..scenario.devices.max(1) {
        let dto = backend.fetch_user(&user)?;
        sessions.push(MiningSession::open(dto, config.clone(), t0)?);
    }
    if let (Some(setup), Some(first)) = (&scenario.setup, sessions.first_mut()) {
        setup(first, t0, 0);
    }
    for session in sessions.iter_mut() {
        flush(session, &backend, &mut traffic, 0.0, t0, &mut c)?;
    }

    let mut now = t0;
    for second in 0..scenario.seconds {
        now = t0 + Duration::seconds(second as i64);

        if let (Some(event), Some(first)) = (&scenario.mid_event, sessions.first_mut()) {
            event(first, now, second);
        }

        let lambda = scenario.tap_rate_at(second);
        for device in traffic.device_order(sessions.len() as u32) {
            let session = &mut sessions[device as usize];
            for _ in 0..traffic.taps_this_second(lambda) {
                c.taps_attempted += 1;
                if session.tap_core(now).accepted {
                    c.taps_accepted += 1;
                } else {
                    c.taps_refused += 1;
                }
            }

            let tick = session.tick_core(now);
            if tick.energy > tick.max_energy {
                c.energy_violations += 1;
            }

            flush(session, &backend, &mut traffic, scenario.failure_rate, now, &mut c)?;
            if !session.store().ledger().net().is_zero() {
                c.ledger_violations += 1;
            }
        }
    }

    // Drain with a healthy backend so the final state is settled.
    for session in sessions.iter_mut() {
        flush(session, &backend, &mut traffic, 0.0, now, &mut c)?;
    }

    let final_row = backend.fetch_user(&user)?;
    let backend_tap_delta = final_row.total_taps.max(0) as u64;
    let primary = &sessions[0];
    let settled = primary.queued_writes() == 0
        && primary.store().pending_count() == 0
        && !primary.store().needs_refresh();
    let backend_match = settled && primary.store().record().to_dto() == final_row;

    let accept_rate = if c.taps_attempted > 0 {
        c.taps_accepted as f64 / c.taps_attempted as f64 * 100.0
    } else {
        100.0
    };
    let snapshot = primary.snapshot_core();

    // Evaluate pass/fail
    let criteria = &scenario.criteria;
    let mut failures = Vec::new();
    if c.energy_violations > 0 {
        failures.push(format!("energy above capacity {} time(s)", c.energy_violations));
    }
    if c.ledger_violations > 0 {
        failures.push(format!("ledger unbalanced {} time(s)", c.ledger_violations));
    }
    if backend.write_count() != c.writes_confirmed {
        failures.push(format!(
            "backend applied {} write(s), {} were confirmed",
            backend.write_count(), c.writes_confirmed
        ));
    }
    if criteria.require_no_lost_taps && backend_tap_delta != c.confirmed_taps {
        failures.push(format!(
            "backend counted {} taps, {} were confirmed",
            backend_tap_delta, c.confirmed_taps
        ));
    }
    if criteria.require_backend_match && scenario.devices <= 1 && !backend_match {
        failures.push("local record diverged from backend".to_string());
    }
    if let Some(min) = criteria.min_accept_rate {
        if accept_rate < min {
            failures.push(format!("accept rate {accept_rate:.1}% < {min}%"));
        }
    }
    if let Some(max) = criteria.max_accept_rate {
        if accept_rate > max {
            failures.push(format!("accept rate {accept_rate:.1}% > {max}%"));
        }
    }
    if let Some(min) = criteria.min_final_ore {
        let ore = adapter::from_decimal(final_row.ore_balance);
        if ore < min {
            failures.push(format!("final ORE {ore} < {min}"));
        }
    }
    if let Some(min) = criteria.min_rollbacks {
        if c.rollbacks < min {
            failures.push(format!("{} rollback(s) < {min}", c.rollbacks));
        }
    }

    let elapsed = start.elapsed();
    let elapsed_ms = elapsed.as_millis();

    Ok(BenchResult {
        scenario: scenario.label.to_string(),
        name: scenario.name.to_string(),
        category: scenario.category.to_string(),
        seed,
        pass: failures.is_empty(),
        failures,
        seconds: scenario.seconds,
        devices: scenario.devices,
        taps_attempted: c.taps_attempted,
        taps_accepted: c.taps_accepted,
        taps_refused: c.taps_refused,
        accept_rate,
        writes_sent: c.writes_sent,
        writes_confirmed: c.writes_confirmed,
        rollbacks: c.rollbacks,
        conflicts: c.conflicts,
        reloads: c.reloads,
        energy_violations: c.energy_violations,
        ledger_violations: c.ledger_violations,
        confirmed_taps: c.confirmed_taps,
        backend_tap_delta,
        backend_match,
        final_energy: snapshot.energy,
        final_ore: adapter::from_decimal(final_row.ore_balance),
        final_bio: adapter::from_decimal(final_row.bio_balance),
        final_version: final_row.version.max(0) as u64,
        elapsed_ms,
        seconds_per_ms: scenario.seconds as f64 / (elapsed.as_secs_f64() * 1000.0).max(0.001),
    })
}

/// Run Monte Carlo: N runs of a scenario, aggregate stats.
pub fn run_monte_carlo(
    scenario: &Scenario,
    config: &EngineConfig,
    n_runs: usize,
    base_seed: u64,
) -> Result<MonteCarloReport, StoreError> {
    let mut results = Vec::with_capacity(n_runs);
    for i in 0..n_runs {
        let seed = base_seed + i as u64;
        let result = run_single(scenario, config, seed)?;
        if !result.pass {
            tracing::warn!(scenario = scenario.name, seed, failures = ?result.failures, "run failed");
        }
        results.push(result);
    }
    Ok(aggregate(scenario, results))
}

/// Aggregate individual runs into a MonteCarloReport.
fn aggregate(scenario: &Scenario, results: Vec<BenchResult>) -> MonteCarloReport {
    let n = results.len();
    let passed = results.iter().filter(|r| r.pass).count();
    let pass_rate = if n > 0 { passed as f64 / n as f64 } else { 0.0 };

    let stat = |f: fn(&BenchResult) -> f64| Stats::from_samples(&results.iter().map(f).collect::<Vec<_>>());

    MonteCarloReport {
        scenario_name: scenario.name.to_string(),
        label: scenario.label.to_string(),
        category: scenario.category.to_string(),
        n_runs: n,
        pass_rate,
        accept_rate: stat(|r| r.accept_rate),
        rollbacks: stat(|r| r.rollbacks as f64),
        conflicts: stat(|r| r.conflicts as f64),
        reloads: stat(|r| r.reloads as f64),
        final_ore: stat(|r| r.final_ore),
        final_energy: stat(|r| r.final_energy as f64),
        elapsed_ms: stat(|r| r.elapsed_ms as f64),
        individual_runs: results,
    }
}
