#![cfg(target_arch = "wasm32")]

use chrono::{TimeZone, Utc};
use ore_engine::adapter;
use ore_engine::record::UserRecordDto;
use ore_engine::{ActionOutcome, MiningSession, SessionSnapshot};
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

fn start_ms() -> f64 {
    let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("test: valid date");
    adapter::to_millis(t0)
}

fn new_session(energy: i64) -> MiningSession {
    let t0 = adapter::from_millis(start_ms()).expect("test: millis");
    let mut dto = UserRecordDto::new_account("u-1", 100, t0);
    dto.energy = energy;
    let record = serde_wasm_bindgen::to_value(&dto).expect("test: to js");
    MiningSession::new(record, JsValue::UNDEFINED, start_ms()).expect("test: construct")
}

#[wasm_bindgen_test]
fn tap_through_js_surface() {
    let mut session = new_session(10);
    let outcome: ActionOutcome =
        serde_wasm_bindgen::from_value(session.tap(start_ms() + 1000.0)).expect("test: outcome");
    assert!(outcome.accepted);
    assert_eq!(outcome.snapshot.energy, 9);
    assert_eq!(outcome.snapshot.ore_balance, 1.0);
}

#[wasm_bindgen_test]
fn empty_session_refuses_tap() {
    let mut session = new_session(0);
    let outcome: ActionOutcome =
        serde_wasm_bindgen::from_value(session.tap(start_ms() + 1000.0)).expect("test: outcome");
    assert!(!outcome.accepted);
    assert_eq!(outcome.error_code.as_deref(), Some("INSUFFICIENT_ENERGY"));
}

#[wasm_bindgen_test]
fn unknown_upgrade_is_reported() {
    let mut session = new_session(100);
    let outcome: ActionOutcome =
        serde_wasm_bindgen::from_value(session.purchase_upgrade("luck", start_ms())).expect("test: outcome");
    assert_eq!(outcome.error_code.as_deref(), Some("UNKNOWN_UPGRADE"));
}

#[wasm_bindgen_test]
fn snapshot_round_trips_to_js() {
    let session = new_session(50);
    let snap: SessionSnapshot = serde_wasm_bindgen::from_value(session.snapshot()).expect("test: snapshot");
    assert_eq!(snap.energy, 50);
    assert_eq!(snap.seconds_until_next_tick, Some(30));
}
