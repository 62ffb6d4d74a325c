#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use ore_engine::backend::{Backend, BackendError, MemoryBackend};
    use ore_engine::core_types::{Ore, UserId};
    use ore_engine::record::{DecodeError, UserRecordDto};
    use ore_engine::upgrades::UpgradeKind;
    use ore_engine::{EngineConfig, MiningSession, StoreError, WriteRejection};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("test: valid date")
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(secs)
    }

    fn row(energy: i64, ore: Decimal) -> UserRecordDto {
        let mut dto = UserRecordDto::new_account("u-1", 100, t0());
        dto.energy = energy;
        dto.ore_balance = ore;
        dto
    }

    fn open_at(energy: i64, now: DateTime<Utc>) -> MiningSession {
        MiningSession::open(row(energy, dec!(0)), EngineConfig::default(), now).expect("test: open")
    }

    fn user() -> UserId {
        UserId::from("u-1")
    }

    /// Send every releasable write to `backend`, settling each result.
    fn deliver(session: &mut MiningSession, backend: &MemoryBackend) -> Vec<Result<u64, BackendError>> {
        let mut results = Vec::new();
        loop {
            let writes = session.take_writes_core();
            if writes.is_empty() {
                return results;
            }
            for write in writes {
                let result = backend.update_user(&user(), write.expected_version, &write.patch);
                match &result {
                    Ok(version) => {
                        session.confirm_write_core(write.write_id, *version);
                    }
                    Err(BackendError::VersionConflict { expected, actual }) => {
                        session.reject_write_core(
                            write.write_id,
                            WriteRejection::Conflict { expected: *expected, actual: *actual },
                        );
                    }
                    Err(e) => {
                        session.reject_write_core(write.write_id, WriteRejection::Failure { message: e.to_string() });
                    }
                }
                results.push(result);
            }
        }
    }

    // ========== Regeneration on load ==========

    #[test]
    fn test_catch_up_95_seconds() {
        let mut s = open_at(5, at(95));
        let snap = s.snapshot_core();
        assert_eq!(snap.energy, 8);
        assert_eq!(snap.seconds_until_next_tick, Some(25));

        let writes = s.take_writes_core();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].patch.energy, Some(8));
        assert_eq!(writes[0].patch.last_energy_update, Some(at(90)));
    }

    #[test]
    fn test_short_absence_writes_nothing() {
        let mut s = open_at(50, at(10));
        assert_eq!(s.snapshot_core().energy, 50);
        assert_eq!(s.snapshot_core().seconds_until_next_tick, Some(20));
        assert!(s.take_writes_core().is_empty());
    }

    #[test]
    fn test_countdown_at_45_seconds() {
        let s = open_at(50, at(45));
        let snap = s.snapshot_core();
        assert_eq!(snap.energy, 51);
        assert_eq!(snap.seconds_until_next_tick, Some(15));
    }

    #[test]
    fn test_long_absence_clamps_at_capacity() {
        let s = open_at(0, at(86_400));
        let snap = s.snapshot_core();
        assert_eq!(snap.energy, 100);
        assert_eq!(snap.phase, "FULL");
        assert_eq!(snap.seconds_until_next_tick, None);
    }

    #[test]
    fn test_clock_skew_changes_nothing() {
        let mut s = open_at(40, t0() - Duration::seconds(600));
        assert_eq!(s.snapshot_core().energy, 40);
        assert!(s.take_writes_core().is_empty());
    }

    #[test]
    fn test_custom_regen_period() {
        let config = EngineConfig::from_json(r#"{ "regen_period_secs": 10 }"#).expect("test: config");
        let s = MiningSession::open(row(50, dec!(0)), config, at(25)).expect("test: open");
        let snap = s.snapshot_core();
        assert_eq!(snap.energy, 52);
        assert_eq!(snap.seconds_until_next_tick, Some(5));
    }

    // ========== Tapping ==========

    #[test]
    fn test_tap_at_zero_energy_refused() {
        let mut s = open_at(0, at(10));
        let out = s.tap_core(at(10));
        assert!(!out.accepted);
        assert_eq!(out.error_code.as_deref(), Some("INSUFFICIENT_ENERGY"));
        assert_eq!(out.snapshot.energy, 0);
        assert_eq!(out.snapshot.ore_balance, 0.0);
        assert!(s.take_writes_core().is_empty());
    }

    #[test]
    fn test_taps_persist_through_backend() {
        let backend = MemoryBackend::new();
        backend.insert(row(100, dec!(0)));
        let dto = backend.fetch_user(&user()).expect("test: fetch");
        let mut s = MiningSession::open(dto, EngineConfig::default(), t0()).expect("test: open");

        for i in 1..=3 {
            assert!(s.tap_core(at(i)).accepted);
        }
        let results = deliver(&mut s, &backend);
        assert_eq!(results, vec![Ok(1), Ok(2), Ok(3)]);

        let stored = backend.fetch_user(&user()).expect("test: fetch");
        assert_eq!(stored.energy, 97);
        assert_eq!(stored.ore_balance, dec!(3));
        assert_eq!(stored.total_taps, 3);
        assert_eq!(stored.last_energy_update, Some(at(3)));
        assert_eq!(s.store().record().to_dto(), stored);
        assert!(s.store().ledger().net().is_zero());
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let backend = MemoryBackend::new();
        backend.insert(row(100, dec!(0)));
        let mut s = MiningSession::open(row(100, dec!(0)), EngineConfig::default(), t0()).expect("test: open");

        backend.fail_next_writes(1);
        assert!(s.tap_core(at(1)).accepted);
        assert_eq!(s.snapshot_core().energy, 99);

        let results = deliver(&mut s, &backend);
        assert!(matches!(results.as_slice(), [Err(BackendError::PersistenceFailure(_))]));

        let snap = s.snapshot_core();
        assert_eq!(snap.energy, 100);
        assert_eq!(snap.ore_balance, 0.0);
        assert_eq!(snap.total_taps, 0);
        assert_eq!(snap.pending_writes, 0);
        assert!(!snap.needs_refresh);
        assert_eq!(backend.fetch_user(&user()).expect("test: fetch").version, 0);
    }

    // ========== Concurrency ==========

    #[test]
    fn test_second_device_conflicts_then_reloads() {
        let backend = MemoryBackend::new();
        backend.insert(row(100, dec!(0)));
        let fetch = || backend.fetch_user(&user()).expect("test: fetch");
        let mut a = MiningSession::open(fetch(), EngineConfig::default(), t0()).expect("test: open a");
        let mut b = MiningSession::open(fetch(), EngineConfig::default(), t0()).expect("test: open b");

        a.tap_core(at(1));
        assert_eq!(deliver(&mut a, &backend), vec![Ok(1)]);

        b.tap_core(at(1));
        let results = deliver(&mut b, &backend);
        assert_eq!(results, vec![Err(BackendError::VersionConflict { expected: 0, actual: 1 })]);
        assert!(b.snapshot_core().needs_refresh);

        let refused = b.tap_core(at(2));
        assert_eq!(refused.error_code.as_deref(), Some("REFRESH_REQUIRED"));

        assert!(b.reload_core(fetch(), at(2)).accepted);
        assert_eq!(b.snapshot_core().energy, 99);
        assert!(b.tap_core(at(2)).accepted);
        assert_eq!(deliver(&mut b, &backend), vec![Ok(2)]);

        let stored = fetch();
        assert_eq!(stored.total_taps, 2);
        assert_eq!(stored.energy, 98);
    }

    #[test]
    fn test_result_after_teardown_is_discarded() {
        let backend = MemoryBackend::new();
        backend.insert(row(100, dec!(0)));
        let mut s = MiningSession::open(row(100, dec!(0)), EngineConfig::default(), t0()).expect("test: open");

        s.tap_core(at(1));
        let sent = s.take_writes_core();
        s.suspend_core();
        let version = backend
            .update_user(&user(), sent[0].expected_version, &sent[0].patch)
            .expect("test: backend write");
        s.confirm_write_core(sent[0].write_id, version);

        let snap = s.resume_core(at(5));
        assert!(snap.active);
        assert!(snap.needs_refresh);
        assert_eq!(snap.seconds_until_next_tick, None);

        let out = s.reload_core(backend.fetch_user(&user()).expect("test: fetch"), at(5));
        assert!(out.accepted);
        assert_eq!(out.snapshot.version, 1);
        assert_eq!(out.snapshot.energy, 99);
        assert!(!out.snapshot.needs_refresh);
    }

    #[test]
    fn test_tap_then_leave_view_before_write_is_taken() {
        let backend = MemoryBackend::new();
        backend.insert(row(100, dec!(0)));
        let mut s = MiningSession::open(row(100, dec!(0)), EngineConfig::default(), t0()).expect("test: open");

        assert!(s.tap_core(at(1)).accepted);
        s.suspend_core();
        let snap = s.resume_core(at(2));
        assert!(!snap.needs_refresh);

        assert_eq!(deliver(&mut s, &backend), vec![Ok(1)]);
        assert!(!s.snapshot_core().needs_refresh);
        assert!(s.tap_core(at(3)).accepted);
        assert_eq!(deliver(&mut s, &backend), vec![Ok(2)]);
        assert_eq!(backend.fetch_user(&user()).expect("test: fetch").total_taps, 2);
    }

    #[test]
    fn test_confirmation_after_reload_is_ignored() {
        let backend = MemoryBackend::new();
        backend.insert(row(100, dec!(0)));
        let mut s = MiningSession::open(row(100, dec!(0)), EngineConfig::default(), t0()).expect("test: open");

        s.tap_core(at(1));
        let sent = s.take_writes_core();
        let version = backend
            .update_user(&user(), sent[0].expected_version, &sent[0].patch)
            .expect("test: backend write");
        assert!(s.reload_core(backend.fetch_user(&user()).expect("test: fetch"), at(1)).accepted);

        let late = s.confirm_write_core(sent[0].write_id, version);
        assert!(late.accepted);
        assert_eq!(late.error_code, None);
        assert_eq!(late.snapshot.version, 1);
        assert!(!late.snapshot.needs_refresh);
    }

    // ========== Economy ==========

    #[test]
    fn test_auto_tap_accrues_during_ticks() {
        let mut s = MiningSession::open(row(100, dec!(600)), EngineConfig::default(), t0()).expect("test: open");
        assert!(s.purchase_auto_tap_core(t0()).accepted);
        assert_eq!(s.snapshot_core().ore_balance, 100.0);

        let tick = s.tick_core(at(3600));
        assert!(tick.changed);
        assert_eq!(tick.ore_balance, 820.0);

        let snap = s.snapshot_core();
        assert_eq!(snap.total_taps, 720);
        assert_eq!(snap.energy, 100);
        assert!(snap.auto_tap_expires_at_ms.is_some());
        assert!(s.store().ledger().net().is_zero());
    }

    #[test]
    fn test_capacity_upgrade_restarts_countdown() {
        let mut s = MiningSession::open(row(100, dec!(200)), EngineConfig::default(), t0()).expect("test: open");
        let out = s.purchase_upgrade_core(UpgradeKind::EnergyCapacity, at(600));
        assert!(out.accepted);
        assert_eq!(out.snapshot.max_energy, 150);
        assert_eq!(out.snapshot.phase, "REGENERATING");
        assert_eq!(out.snapshot.seconds_until_next_tick, Some(30));
        assert_eq!(out.snapshot.ore_balance, 0.0);

        let again = s.purchase_upgrade_core(UpgradeKind::EnergyCapacity, at(601));
        assert_eq!(again.error_code.as_deref(), Some("INSUFFICIENT_ORE"));
    }

    #[test]
    fn test_convert_ore_to_bio() {
        let mut s = MiningSession::open(row(100, dec!(1500)), EngineConfig::default(), t0()).expect("test: open");
        let out = s.convert_core(Ore::whole(1000), t0());
        assert!(out.accepted);
        assert_eq!(out.snapshot.ore_balance, 500.0);
        assert_eq!(out.snapshot.bio_balance, 1.0);

        let small = s.convert_core(Ore::whole(10), t0());
        assert_eq!(small.error_code.as_deref(), Some("INVALID_CONVERSION"));
    }

    // ========== Record contract ==========

    #[test]
    fn test_open_rejects_energy_above_capacity() {
        let err = MiningSession::open(row(150, dec!(0)), EngineConfig::default(), t0())
            .err()
            .expect("test: must fail");
        assert_eq!(
            err,
            StoreError::Decode(DecodeError::EnergyAboveCapacity { energy: 150, max_energy: 100 })
        );
    }

    #[test]
    fn test_malformed_row_rejected() {
        let json = r#"{ "id": "u-1", "energy": 10 }"#;
        assert!(matches!(UserRecordDto::from_json(json), Err(DecodeError::Malformed(_))));
    }
}
