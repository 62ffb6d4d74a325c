//! Mining-view session: the object the UI holds while the mining screen is
//! open. It owns the store, queues outbound writes for the host, and keeps
//! the foreground countdown.
//!
//! Methods here are the native (`*_core`) halves of the wasm entry points in
//! `lib.rs` and are what the integration tests drive.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use wasm_bindgen::prelude::*;

use crate::config::EngineConfig;
use crate::core_types::{Ore, UserId};
use crate::record::UserRecordDto;
use crate::store::{MiningStore, PendingWrite, StoreError};
use crate::types::*;
use crate::upgrades::UpgradeKind;

// ─── MiningSession struct ────────────────────────────────────────────────────

#[wasm_bindgen]
pub struct MiningSession {
    pub(crate) store: MiningStore,
    /// Writes applied locally but not yet handed to the host.
    pub(crate) outbox: VecDeque<PendingWrite>,
    /// Write handed to the host and not yet settled.
    pub(crate) awaiting: Option<u64>,
    /// Seconds until the next energy unit, as of the last tick or action.
    pub(crate) countdown: Option<u32>,
    /// False between `suspend` and `resume` (view torn down).
    pub(crate) active: bool,
}

// ─── Internal Logic (Testable, pure Rust) ────────────────────────────────────

impl MiningSession {
    /// Open a session on a freshly loaded record and run load-time catch-up.
    pub fn open(dto: UserRecordDto, config: EngineConfig, now: DateTime<Utc>) -> Result<Self, StoreError> {
        let store = MiningStore::from_dto(config, dto)?;
        let mut session = Self {
            store,
            outbox: VecDeque::new(),
            awaiting: None,
            countdown: None,
            active: true,
        };
        session.catch_up(now);
        Ok(session)
    }

    pub fn store(&self) -> &MiningStore {
        &self.store
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    fn catch_up(&mut self, now: DateTime<Utc>) {
        match self.store.catch_up(now) {
            Ok(Some(write)) => self.outbox.push_back(write),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "load-time catch-up skipped"),
        }
        self.refresh_countdown(now);
    }

    fn refresh_countdown(&mut self, now: DateTime<Utc>) {
        if self.active {
            self.countdown = Some(self.store.regeneration_at(now).seconds_until_next_tick);
        }
    }

    /// Drop queued writes the store no longer tracks (rolled back or reloaded).
    fn prune_outbox(&mut self) {
        let store = &self.store;
        self.outbox.retain(|w| store.is_pending(w.write_id));
        if self.awaiting.is_some_and(|id| !store.is_pending(id)) {
            self.awaiting = None;
        }
    }

    fn outcome(&mut self, now: DateTime<Utc>, result: Result<PendingWrite, StoreError>) -> ActionOutcome {
        match result {
            Ok(write) => {
                self.outbox.push_back(write);
                self.refresh_countdown(now);
                ActionOutcome::accepted(self.snapshot_core())
            }
            Err(e) => {
                tracing::debug!(code = e.code(), "action refused");
                ActionOutcome::refused(&e, self.snapshot_core())
            }
        }
    }

    pub fn tap_core(&mut self, now: DateTime<Utc>) -> ActionOutcome {
        let result = self.store.tap(now);
        self.outcome(now, result)
    }

    pub fn purchase_upgrade_core(&mut self, kind: UpgradeKind, now: DateTime<Utc>) -> ActionOutcome {
        let result = self.store.purchase_upgrade(kind, now);
        self.outcome(now, result)
    }

    pub fn purchase_auto_tap_core(&mut self, now: DateTime<Utc>) -> ActionOutcome {
        let result = self.store.purchase_auto_tap(now);
        self.outcome(now, result)
    }

    pub fn convert_core(&mut self, ore: Ore, now: DateTime<Utc>) -> ActionOutcome {
        let result = self.store.convert(ore, now);
        self.outcome(now, result)
    }

    /// One-second foreground timer. Does nothing while suspended.
    pub fn tick_core(&mut self, now: DateTime<Utc>) -> TickResult {
        if !self.active {
            return self.tick_result(false);
        }
        let changed = match self.store.tick(now) {
            Ok(outcome) => {
                self.countdown = Some(outcome.regeneration.seconds_until_next_tick);
                match outcome.write {
                    Some(write) => {
                        self.outbox.push_back(write);
                        true
                    }
                    None => false,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "tick write refused");
                self.refresh_countdown(now);
                false
            }
        };
        self.tick_result(changed)
    }

    fn tick_result(&self, changed: bool) -> TickResult {
        let snapshot = self.snapshot_core();
        TickResult {
            energy: snapshot.energy,
            max_energy: snapshot.max_energy,
            seconds_until_next_tick: snapshot.seconds_until_next_tick,
            changed,
            ore_balance: snapshot.ore_balance,
            active: snapshot.active,
            needs_refresh: snapshot.needs_refresh,
        }
    }

    /// Release the next write for persistence.
    ///
    /// Writes leave strictly one at a time: the next is released only after
    /// the previous one has settled, so its predicted `expected_version` can
    /// never be satisfied by another device's write.
    pub fn take_writes_core(&mut self) -> Vec<OutboundWrite> {
        self.prune_outbox();
        if self.awaiting.is_some() {
            return Vec::new();
        }
        match self.outbox.pop_front() {
            Some(write) => {
                self.awaiting = Some(write.write_id);
                vec![OutboundWrite::from(write)]
            }
            None => Vec::new(),
        }
    }

    pub fn queued_writes(&self) -> usize {
        self.outbox.len() + usize::from(self.awaiting.is_some())
    }

    pub fn confirm_write_core(&mut self, write_id: u64, version: u64) -> ActionOutcome {
        match self.store.settle(write_id, Ok(version)) {
            Ok(()) => {
                self.prune_outbox();
                ActionOutcome::accepted(self.snapshot_core())
            }
            Err(e) => ActionOutcome::refused(&e, self.snapshot_core()),
        }
    }

    /// Report a failed write; local state rolls back to before it.
    pub fn reject_write_core(&mut self, write_id: u64, rejection: WriteRejection) -> ActionOutcome {
        let user = self.store.record().id.clone();
        let result = self.store.settle(write_id, Err(rejection.into_error(&user)));
        self.prune_outbox();
        match result {
            Ok(()) => ActionOutcome::accepted(self.snapshot_core()),
            Err(e) => ActionOutcome::refused(&e, self.snapshot_core()),
        }
    }

    /// View torn down: stop the countdown and disown the result of the write
    /// the host is holding. Queued writes never left the session and stay
    /// valid for the next epoch.
    pub fn suspend_core(&mut self) {
        self.active = false;
        self.countdown = None;
        let epoch = self.store.begin_epoch();
        let queued: Vec<u64> = self.outbox.iter().map(|w| w.write_id).collect();
        self.store.carry_forward(&queued);
        for write in self.outbox.iter_mut() {
            write.epoch = epoch;
        }
        tracing::debug!(epoch, queued = queued.len(), "session suspended");
    }

    /// View re-entered: restart the countdown and catch up on elapsed time.
    pub fn resume_core(&mut self, now: DateTime<Utc>) -> SessionSnapshot {
        self.active = true;
        if self.store.needs_refresh() {
            self.countdown = None;
            return self.snapshot_core();
        }
        self.catch_up(now);
        self.snapshot_core()
    }

    /// Replace local state with a freshly fetched record.
    pub fn reload_core(&mut self, dto: UserRecordDto, now: DateTime<Utc>) -> ActionOutcome {
        if let Err(e) = self.store.reload(dto) {
            return ActionOutcome::refused(&e, self.snapshot_core());
        }
        self.outbox.clear();
        self.awaiting = None;
        self.catch_up(now);
        ActionOutcome::accepted(self.snapshot_core())
    }

    pub fn snapshot_core(&self) -> SessionSnapshot {
        let countdown = if self.active { self.countdown } else { None };
        SessionSnapshot::of(&self.store, countdown, self.active)
    }

    pub fn user_id(&self) -> &UserId {
        &self.store.record().id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("test: valid date")
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(secs)
    }

    fn session(energy: i64) -> MiningSession {
        let mut dto = UserRecordDto::new_account("u-1", 100, t0());
        dto.energy = energy;
        MiningSession::open(dto, EngineConfig::default(), t0()).expect("test: open")
    }

    #[test]
    fn countdown_follows_ticks() {
        let mut s = session(50);
        assert_eq!(s.snapshot_core().seconds_until_next_tick, Some(30));
        let r = s.tick_core(at(45));
        assert!(r.changed);
        assert_eq!(r.energy, 51);
        assert_eq!(r.seconds_until_next_tick, Some(15));
    }

    #[test]
    fn full_energy_has_no_countdown() {
        let mut s = session(100);
        let r = s.tick_core(at(5));
        assert!(!r.changed);
        assert_eq!(r.seconds_until_next_tick, None);
    }

    #[test]
    fn suspended_session_ignores_ticks() {
        let mut s = session(50);
        s.suspend_core();
        assert!(!s.is_active());
        let r = s.tick_core(at(600));
        assert!(!r.active);
        assert_eq!(r.energy, 50);
        assert_eq!(r.seconds_until_next_tick, None);

        let snap = s.resume_core(at(600));
        assert!(snap.active);
        assert_eq!(snap.energy, 70);
    }

    #[test]
    fn writes_leave_one_at_a_time() {
        let mut s = session(10);
        s.tap_core(at(1));
        s.tap_core(at(2));
        let first = s.take_writes_core();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].expected_version, 0);
        assert!(s.take_writes_core().is_empty());

        assert!(s.confirm_write_core(first[0].write_id, 1).accepted);
        let second = s.take_writes_core();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].expected_version, 1);
        assert_eq!(s.queued_writes(), 1);
    }

    #[test]
    fn queued_write_survives_suspend() {
        let mut s = session(10);
        assert!(s.tap_core(at(1)).accepted);
        s.suspend_core();
        s.resume_core(at(2));

        let sent = s.take_writes_core();
        assert_eq!(sent.len(), 1);
        let out = s.confirm_write_core(sent[0].write_id, 1);
        assert!(out.accepted);
        assert!(!out.snapshot.needs_refresh);
        assert!(s.tap_core(at(3)).accepted);
    }

    #[test]
    fn rejected_write_prunes_queued_followers() {
        let mut s = session(10);
        let first = s.tap_core(at(1));
        assert!(first.accepted);
        let sent = s.take_writes_core();
        s.tap_core(at(2));

        let out = s.reject_write_core(
            sent[0].write_id,
            WriteRejection::Failure { message: "offline".to_string() },
        );
        assert!(!out.accepted);
        assert_eq!(out.error_code.as_deref(), Some("PERSISTENCE_FAILURE"));
        assert_eq!(out.snapshot.energy, 10);
        assert!(s.take_writes_core().is_empty());
    }
}
