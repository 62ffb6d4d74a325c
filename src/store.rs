//! Single owned state container for one user's mining state.
//!
//! [`MiningStore`] is the only writer of the in-memory user record. Every
//! mutation follows the same path:
//!
//! 1. compute the next record from the current (optimistic) one,
//! 2. verify its journal entries against the [`Ledger`],
//! 3. apply it locally and hand back a [`PendingWrite`] holding the patch,
//! 4. [`settle`](MiningStore::settle) the backend result: confirm, or roll
//!    back to the pre-write record together with every write queued after it.
//!
//! Results from a previous epoch (the mining view was torn down in between)
//! are discarded and flag the store for a refresh from the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::accrual;
use crate::backend::{Backend, BackendError};
use crate::config::EngineConfig;
use crate::conversion::{ConversionDesk, ConversionError};
use crate::core_types::{Ore, UserId};
use crate::energy::{self, EnergyError, EnergyPhase, RegenPolicy, Regeneration};
use crate::ledger::{JournalEntry, Ledger, LedgerError};
use crate::record::{DecodeError, UserPatch, UserRecord, UserRecordDto};
use crate::upgrades::{self, UpgradeCatalog, UpgradeError, UpgradeKind};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Energy(#[from] EnergyError),

    #[error(transparent)]
    Upgrade(#[from] UpgradeError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("write {0} is not pending")]
    UnknownWrite(u64),

    #[error("local state is out of sync; reload the user record")]
    RefreshRequired,
}

impl StoreError {
    /// Short machine-readable code for the UI layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Energy(EnergyError::InsufficientEnergy) => "INSUFFICIENT_ENERGY",
            Self::Upgrade(UpgradeError::MaxLevelReached(..)) => "MAX_LEVEL",
            Self::Upgrade(UpgradeError::InsufficientOre { .. }) => "INSUFFICIENT_ORE",
            Self::Upgrade(UpgradeError::PriceOverflow(..)) => "INVALID_UPGRADE",
            Self::Conversion(ConversionError::InsufficientOre { .. }) => "INSUFFICIENT_ORE",
            Self::Conversion(_) => "INVALID_CONVERSION",
            Self::Ledger(_) => "LEDGER_HALTED",
            Self::Decode(_) => "MALFORMED_RECORD",
            Self::Backend(BackendError::VersionConflict { .. }) => "VERSION_CONFLICT",
            Self::Backend(BackendError::NotFound(_)) => "NOT_FOUND",
            Self::Backend(BackendError::PersistenceFailure(_)) => "PERSISTENCE_FAILURE",
            Self::UnknownWrite(_) => "UNKNOWN_WRITE",
            Self::RefreshRequired => "REFRESH_REQUIRED",
        }
    }
}

// ---------------------------------------------------------------------------
// Writes and events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteKind {
    /// Load-time regeneration, accrual, or baseline bootstrap.
    CatchUp,
    /// Foreground timer tick.
    Tick,
    Tap,
    Upgrade(UpgradeKind),
    AutoTapPurchase,
    Convert,
}

/// A locally applied change waiting for the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWrite {
    pub write_id: u64,
    pub epoch: u64,
    pub kind: WriteKind,
    pub user_id: String,
    pub expected_version: u64,
    pub patch: UserPatch,
}

#[derive(Debug, Clone)]
struct InFlight {
    write: PendingWrite,
    before: UserRecord,
    journal: Vec<JournalEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Applied { write_id: u64, kind: WriteKind },
    Confirmed { write_id: u64, version: u64 },
    RolledBack { write_id: u64, discarded: usize, reason: String },
    StaleDiscarded { write_id: u64 },
    Reloaded { version: u64 },
}

type Listener = Box<dyn FnMut(&StoreEvent, &UserRecord)>;

/// Result of a foreground timer tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub regeneration: Regeneration,
    pub write: Option<PendingWrite>,
}

// ---------------------------------------------------------------------------
// MiningStore
// ---------------------------------------------------------------------------

pub struct MiningStore {
    config: EngineConfig,
    regen: RegenPolicy,
    desk: ConversionDesk,
    record: UserRecord,
    confirmed_version: u64,
    in_flight: VecDeque<InFlight>,
    ledger: Ledger,
    listeners: Vec<Listener>,
    next_write_id: u64,
    epoch: u64,
    needs_refresh: bool,
}

impl std::fmt::Debug for MiningStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiningStore")
            .field("record", &self.record)
            .field("confirmed_version", &self.confirmed_version)
            .field("in_flight", &self.in_flight.len())
            .field("epoch", &self.epoch)
            .field("needs_refresh", &self.needs_refresh)
            .finish()
    }
}

impl MiningStore {
    pub fn new(config: EngineConfig, record: UserRecord) -> Self {
        tracing::info!(user = %record.id, version = record.version, "mining store loaded");
        Self {
            regen: RegenPolicy::new(config.regen_period_secs),
            desk: ConversionDesk::new(config.conversion.clone()),
            ledger: Ledger::new(config.ledger_breaker_threshold),
            confirmed_version: record.version,
            config,
            record,
            in_flight: VecDeque::new(),
            listeners: Vec::new(),
            next_write_id: 1,
            epoch: 0,
            needs_refresh: false,
        }
    }

    /// Decode a backend row and build a store from it.
    pub fn from_dto(config: EngineConfig, dto: UserRecordDto) -> Result<Self, StoreError> {
        let record = UserRecord::try_from(dto)?;
        Ok(Self::new(config, record))
    }

    /// Fetch the row from `backend` and build a store from it.
    pub fn load(
        config: EngineConfig,
        backend: &dyn Backend,
        id: &UserId,
    ) -> Result<Self, StoreError> {
        let dto = backend.fetch_user(id)?;
        Self::from_dto(config, dto)
    }

    // -- accessors -----------------------------------------------------------

    pub fn record(&self) -> &UserRecord {
        &self.record
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn confirmed_version(&self) -> u64 {
        self.confirmed_version
    }

    pub fn pending_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_pending(&self, write_id: u64) -> bool {
        self.in_flight.iter().any(|f| f.write.write_id == write_id)
    }

    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn tap_power(&self) -> Ore {
        upgrades::tap_power_at(&self.config, self.record.tap_power_level)
    }

    /// Energy as it would read at `now`, without writing anything.
    pub fn regeneration_at(&self, now: DateTime<Utc>) -> Regeneration {
        let e = &self.record.energy;
        self.regen.regenerate(e.last_update, e.energy, e.max_energy, now)
    }

    pub fn phase(&self) -> EnergyPhase {
        self.record.energy.phase()
    }

    // -- subscription --------------------------------------------------------

    pub fn subscribe(&mut self, listener: impl FnMut(&StoreEvent, &UserRecord) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&mut self, event: StoreEvent) {
        for listener in self.listeners.iter_mut() {
            listener(&event, &self.record);
        }
    }

    /// Start a new epoch; results for writes issued earlier will be discarded.
    pub fn begin_epoch(&mut self) -> u64 {
        self.epoch += 1;
        tracing::debug!(epoch = self.epoch, in_flight = self.in_flight.len(), "new store epoch");
        self.epoch
    }

    /// Move writes that were never handed to the backend into the current
    /// epoch, so their results are settled normally.
    pub fn carry_forward(&mut self, write_ids: &[u64]) {
        let epoch = self.epoch;
        for flight in self.in_flight.iter_mut() {
            if write_ids.contains(&flight.write.write_id) {
                flight.write.epoch = epoch;
            }
        }
    }

    // -- mutations -----------------------------------------------------------

    /// Load-time catch-up: bootstrap a missing baseline, apply regeneration
    /// and pending auto-tap accrual.
    pub fn catch_up(&mut self, now: DateTime<Utc>) -> Result<Option<PendingWrite>, StoreError> {
        let regen = self.regen;
        let config = self.config.clone();
        self.mutate(WriteKind::CatchUp, |rec, journal| {
            if rec.energy.last_update.is_none() {
                rec.energy.last_update = Some(now);
            } else {
                apply_regeneration(&regen, rec, now);
            }
            apply_accrual(&config, rec, now, journal);
            Ok(())
        })
    }

    /// Foreground one-second tick.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<TickOutcome, StoreError> {
        if self.needs_refresh {
            return Ok(TickOutcome { regeneration: self.regeneration_at(now), write: None });
        }
        let regen = self.regen;
        let config = self.config.clone();
        let write = self.mutate(WriteKind::Tick, |rec, journal| {
            apply_regeneration(&regen, rec, now);
            apply_accrual(&config, rec, now, journal);
            Ok(())
        })?;
        Ok(TickOutcome { regeneration: self.regeneration_at(now), write })
    }

    /// One user tap: regenerate, spend one energy, mint tap power.
    pub fn tap(&mut self, now: DateTime<Utc>) -> Result<PendingWrite, StoreError> {
        let regen = self.regen;
        let tap_power = self.tap_power();
        let write = self.mutate(WriteKind::Tap, |rec, journal| {
            apply_regeneration(&regen, rec, now);
            rec.energy.energy = energy::consume(rec.energy.energy)?;
            rec.energy.last_update = Some(now);
            rec.ore = rec.ore + tap_power;
            rec.total_taps += 1;
            journal.push(JournalEntry::mint("tap", tap_power));
            Ok(())
        })?;
        // A tap always changes energy and the tap counter.
        write.ok_or(StoreError::RefreshRequired)
    }

    pub fn purchase_upgrade(
        &mut self,
        kind: UpgradeKind,
        now: DateTime<Utc>,
    ) -> Result<PendingWrite, StoreError> {
        let regen = self.regen;
        let config = self.config.clone();
        let write = self.mutate(WriteKind::Upgrade(kind), |rec, journal| {
            apply_regeneration(&regen, rec, now);
            let catalog = UpgradeCatalog::new(&config);
            let level = match kind {
                UpgradeKind::TapPower => rec.tap_power_level,
                UpgradeKind::EnergyCapacity => rec.capacity_level,
            };
            let purchase = catalog.quote(kind, level, rec.ore)?;
            rec.ore = rec.ore - purchase.cost;
            journal.push(JournalEntry::spend("upgrade", purchase.cost));

            match kind {
                UpgradeKind::TapPower => rec.tap_power_level = purchase.new_level,
                UpgradeKind::EnergyCapacity => {
                    let was_full = rec.energy.phase() == EnergyPhase::Full;
                    rec.capacity_level = purchase.new_level;
                    rec.energy = energy::upgrade_capacity(rec.energy, purchase.step);
                    if was_full {
                        // Regeneration toward the new cap starts now.
                        rec.energy.last_update = Some(now);
                    }
                }
            }
            Ok(())
        })?;
        write.ok_or(StoreError::RefreshRequired)
    }

    pub fn purchase_auto_tap(&mut self, now: DateTime<Utc>) -> Result<PendingWrite, StoreError> {
        let config = self.config.clone();
        let write = self.mutate(WriteKind::AutoTapPurchase, |rec, journal| {
            apply_accrual(&config, rec, now, journal);
            let price = config.auto_tap.price;
            let balance = rec.ore;
            rec.ore = balance
                .checked_sub(price)
                .ok_or(UpgradeError::InsufficientOre { cost: price, balance })?;
            journal.push(JournalEntry::spend("auto_tap", price));

            if !accrual::is_active(rec.auto_tap_expires_at, now) {
                rec.last_auto_tap_accrual = Some(now);
            }
            rec.auto_tap_expires_at =
                Some(accrual::extend(rec.auto_tap_expires_at, now, config.auto_tap.duration_secs));
            Ok(())
        })?;
        write.ok_or(StoreError::RefreshRequired)
    }

    pub fn convert(&mut self, ore: Ore, now: DateTime<Utc>) -> Result<PendingWrite, StoreError> {
        let config = self.config.clone();
        let desk = self.desk.clone();
        let write = self.mutate(WriteKind::Convert, |rec, journal| {
            apply_accrual(&config, rec, now, journal);
            let quote = desk.quote_for_balance(ore, rec.ore)?;
            rec.ore = rec.ore - quote.ore_debit;
            rec.bio = rec.bio + quote.bio_credit;
            journal.push(JournalEntry::convert(quote.ore_debit, desk.bio_in_ore(quote.bio_credit)));
            Ok(())
        })?;
        write.ok_or(StoreError::RefreshRequired)
    }

    fn mutate<F>(&mut self, kind: WriteKind, f: F) -> Result<Option<PendingWrite>, StoreError>
    where
        F: FnOnce(&mut UserRecord, &mut Vec<JournalEntry>) -> Result<(), StoreError>,
    {
        if self.needs_refresh {
            return Err(StoreError::RefreshRequired);
        }

        let before = self.record.clone();
        let mut next = before.clone();
        let mut journal = Vec::new();
        f(&mut next, &mut journal)?;

        let patch = UserPatch::diff(&before, &next);
        if patch.is_empty() {
            return Ok(None);
        }

        for entry in &journal {
            self.ledger.check(entry)?;
        }
        for (i, entry) in journal.iter().enumerate() {
            if let Err(e) = self.ledger.record(entry) {
                for recorded in journal[..i].iter().rev() {
                    self.ledger.reverse(recorded);
                }
                return Err(e.into());
            }
        }

        let write = PendingWrite {
            write_id: self.next_write_id,
            epoch: self.epoch,
            kind,
            user_id: before.id.0.clone(),
            expected_version: before.version,
            patch,
        };
        self.next_write_id += 1;
        next.version = before.version + 1;
        self.record = next;
        self.in_flight.push_back(InFlight { write: write.clone(), before, journal });

        tracing::debug!(
            write_id = write.write_id,
            kind = ?kind,
            energy = self.record.energy.energy,
            ore = %self.record.ore.0,
            "applied optimistic write"
        );
        self.emit(StoreEvent::Applied { write_id: write.write_id, kind });
        Ok(Some(write))
    }

    // -- settlement ----------------------------------------------------------

    /// Report the backend outcome of a write.
    ///
    /// Failure restores the record as it was before the write and discards
    /// every write queued after it; the error is returned for the UI to show.
    pub fn settle(&mut self, write_id: u64, result: Result<u64, BackendError>) -> Result<(), StoreError> {
        let pos = match self.in_flight.iter().position(|f| f.write.write_id == write_id) {
            Some(pos) => pos,
            // Issued here but already settled, rolled back, or reloaded away.
            None if write_id < self.next_write_id => {
                tracing::debug!(write_id, "ignoring result for retired write");
                return Ok(());
            }
            None => return Err(StoreError::UnknownWrite(write_id)),
        };

        if self.in_flight[pos].write.epoch != self.epoch {
            self.discard_from(pos);
            self.needs_refresh = true;
            tracing::warn!(write_id, "discarded result from previous epoch");
            self.emit(StoreEvent::StaleDiscarded { write_id });
            return Ok(());
        }

        match result {
            Ok(version) => {
                let flight = self.in_flight.remove(pos).ok_or(StoreError::UnknownWrite(write_id))?;
                if version != flight.write.expected_version + 1 {
                    tracing::warn!(
                        write_id,
                        expected = flight.write.expected_version + 1,
                        version,
                        "backend version drifted from local prediction"
                    );
                    self.needs_refresh = true;
                }
                self.confirmed_version = self.confirmed_version.max(version);
                self.emit(StoreEvent::Confirmed { write_id, version });
                Ok(())
            }
            Err(error) => {
                let before = self.in_flight[pos].before.clone();
                let discarded = self.discard_from(pos);
                self.record = before;
                if matches!(error, BackendError::VersionConflict { .. }) {
                    self.needs_refresh = true;
                }
                tracing::warn!(write_id, discarded, %error, "write failed; rolled back");
                self.emit(StoreEvent::RolledBack {
                    write_id,
                    discarded,
                    reason: error.to_string(),
                });
                Err(error.into())
            }
        }
    }

    /// Drop the write at `pos` and everything after it, reversing their
    /// journal entries. Returns how many writes were dropped.
    fn discard_from(&mut self, pos: usize) -> usize {
        let tail: Vec<InFlight> = self.in_flight.drain(pos..).collect();
        for flight in tail.iter().rev() {
            for entry in flight.journal.iter().rev() {
                self.ledger.reverse(entry);
            }
        }
        tail.len()
    }

    /// Persist `write` through `backend` and settle the result.
    pub fn commit(&mut self, backend: &dyn Backend, write: &PendingWrite) -> Result<(), StoreError> {
        let id = UserId(write.user_id.clone());
        let result = backend.update_user(&id, write.expected_version, &write.patch);
        self.settle(write.write_id, result)
    }

    /// Replace local state with a fresh backend row.
    pub fn reload(&mut self, dto: UserRecordDto) -> Result<(), StoreError> {
        let record = UserRecord::try_from(dto)?;
        if !self.in_flight.is_empty() {
            let n = self.discard_from(0);
            tracing::debug!(discarded = n, "reload discarded in-flight writes");
        }
        // Results for anything in flight are meaningless after a reload.
        self.epoch += 1;
        self.ledger.rebase();
        self.confirmed_version = record.version;
        self.record = record;
        self.needs_refresh = false;
        tracing::info!(user = %self.record.id, version = self.record.version, "mining store reloaded");
        let version = self.record.version;
        self.emit(StoreEvent::Reloaded { version });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mutation steps
// ---------------------------------------------------------------------------

fn apply_regeneration(policy: &RegenPolicy, rec: &mut UserRecord, now: DateTime<Utc>) {
    let e = rec.energy;
    let r = policy.regenerate(e.last_update, e.energy, e.max_energy, now);
    if r.should_persist {
        rec.energy.energy = r.energy;
        rec.energy.last_update = r.baseline;
    }
}

fn apply_accrual(config: &EngineConfig, rec: &mut UserRecord, now: DateTime<Utc>, journal: &mut Vec<JournalEntry>) {
    let tap_power = upgrades::tap_power_at(config, rec.tap_power_level);
    let a = accrual::accrue(
        rec.auto_tap_expires_at,
        rec.last_auto_tap_accrual,
        now,
        tap_power,
        config.auto_tap.interval_secs,
    );
    if a.taps == 0 {
        return;
    }
    rec.ore = rec.ore + a.earned;
    rec.total_taps += a.taps;
    rec.last_auto_tap_accrual = a.accrued_until;
    journal.push(JournalEntry::mint("auto_tap", a.earned));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
