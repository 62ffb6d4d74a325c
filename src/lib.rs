//! Ore mining engine: energy regeneration, tap rewards, and passive accrual
//! for the mining view, compiled to wasm for the web client.

pub mod core_types;
pub mod config;
pub mod energy;
pub mod accrual;
pub mod upgrades;
pub mod conversion;
pub mod ledger;
pub mod record;
pub mod backend;
pub mod store;
pub mod types;
pub mod session;
pub mod adapter;

pub use types::*;
pub use session::MiningSession;
pub use store::{MiningStore, StoreError};
pub use config::EngineConfig;

use wasm_bindgen::prelude::*;

use crate::record::UserRecordDto;
use crate::upgrades::UpgradeKind;

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn to_js<T: serde::Serialize>(value: &T) -> JsValue {
    serde_wasm_bindgen::to_value(value).unwrap_or(JsValue::NULL)
}

/// Write ids and versions arrive as JS numbers.
fn id_from_js(v: f64) -> Option<u64> {
    if v.is_finite() && v >= 0.0 && v.fract() == 0.0 {
        Some(v as u64)
    } else {
        None
    }
}

// ─── WASM Interface ──────────────────────────────────────────────────────────

#[wasm_bindgen]
impl MiningSession {
    /// `record` is the user row as fetched from the backend; `config` may be
    /// `undefined` for the default tuning.
    #[wasm_bindgen(constructor)]
    pub fn new(record: JsValue, config: JsValue, now_ms: f64) -> Result<MiningSession, JsValue> {
        #[cfg(target_arch = "wasm32")]
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));

        let dto: UserRecordDto = serde_wasm_bindgen::from_value(record).map_err(js_error)?;
        let config = if config.is_undefined() || config.is_null() {
            EngineConfig::default()
        } else {
            let config: EngineConfig = serde_wasm_bindgen::from_value(config).map_err(js_error)?;
            config.validate().map_err(js_error)?;
            config
        };
        MiningSession::open(dto, config, adapter::now_or_clock(now_ms)).map_err(js_error)
    }

    pub fn tap(&mut self, now_ms: f64) -> JsValue {
        let outcome = self.tap_core(adapter::now_or_clock(now_ms));
        to_js(&outcome)
    }

    /// Foreground one-second timer.
    pub fn tick(&mut self, now_ms: f64) -> JsValue {
        let result = self.tick_core(adapter::now_or_clock(now_ms));
        to_js(&result)
    }

    /// `kind` is `"tap_power"` or `"energy_capacity"`.
    pub fn purchase_upgrade(&mut self, kind: &str, now_ms: f64) -> JsValue {
        let outcome = match UpgradeKind::from_name(kind) {
            Some(kind) => self.purchase_upgrade_core(kind, adapter::now_or_clock(now_ms)),
            None => ActionOutcome::invalid(
                "UNKNOWN_UPGRADE",
                format!("unknown upgrade `{kind}`"),
                self.snapshot_core(),
            ),
        };
        to_js(&outcome)
    }

    pub fn purchase_auto_tap(&mut self, now_ms: f64) -> JsValue {
        let outcome = self.purchase_auto_tap_core(adapter::now_or_clock(now_ms));
        to_js(&outcome)
    }

    pub fn convert(&mut self, ore: f64, now_ms: f64) -> JsValue {
        let outcome = self.convert_core(adapter::ore_from_f64(ore), adapter::now_or_clock(now_ms));
        to_js(&outcome)
    }

    pub fn take_writes(&mut self) -> JsValue {
        let writes = self.take_writes_core();
        to_js(&writes)
    }

    pub fn confirm_write(&mut self, write_id: f64, version: f64) -> JsValue {
        let outcome = match (id_from_js(write_id), id_from_js(version)) {
            (Some(id), Some(version)) => self.confirm_write_core(id, version),
            _ => ActionOutcome::invalid(
                "INVALID_ARGUMENT",
                "write id and version must be non-negative integers".to_string(),
                self.snapshot_core(),
            ),
        };
        to_js(&outcome)
    }

    /// `rejection` is `{ kind: "conflict", expected, actual }`,
    /// `{ kind: "not_found" }` or `{ kind: "failure", message }`.
    pub fn reject_write(&mut self, write_id: f64, rejection: JsValue) -> JsValue {
        let parsed: Result<WriteRejection, _> = serde_wasm_bindgen::from_value(rejection);
        let outcome = match (id_from_js(write_id), parsed) {
            (Some(id), Ok(rejection)) => self.reject_write_core(id, rejection),
            (None, _) => ActionOutcome::invalid(
                "INVALID_ARGUMENT",
                "write id must be a non-negative integer".to_string(),
                self.snapshot_core(),
            ),
            (_, Err(e)) => ActionOutcome::invalid("INVALID_ARGUMENT", e.to_string(), self.snapshot_core()),
        };
        to_js(&outcome)
    }

    /// Mining view torn down.
    pub fn suspend(&mut self) {
        self.suspend_core();
    }

    /// Mining view re-entered.
    pub fn resume(&mut self, now_ms: f64) -> JsValue {
        let snapshot = self.resume_core(adapter::now_or_clock(now_ms));
        to_js(&snapshot)
    }

    pub fn reload(&mut self, record: JsValue, now_ms: f64) -> Result<JsValue, JsValue> {
        let dto: UserRecordDto = serde_wasm_bindgen::from_value(record).map_err(js_error)?;
        let outcome = self.reload_core(dto, adapter::now_or_clock(now_ms));
        Ok(to_js(&outcome))
    }

    pub fn snapshot(&self) -> JsValue {
        to_js(&self.snapshot_core())
    }
}
