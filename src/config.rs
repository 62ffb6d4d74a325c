//! Engine configuration.
//!
//! All tunables live in [`EngineConfig`]. Every section has a `Default` that
//! matches the live game, so a JSON document only needs the keys it changes.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::core_types::Ore;

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: &'static str },
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds needed to regenerate one unit of energy.
    pub regen_period_secs: u32,
    /// Energy and capacity of a freshly created account.
    pub initial_energy: u32,
    /// ORE earned per tap at tap-power level 0.
    pub base_tap_power: u32,
    pub tap_power: UpgradeCurve,
    pub energy_capacity: UpgradeCurve,
    pub auto_tap: AutoTapConfig,
    pub conversion: ConversionConfig,
    /// Cumulative journal error (in ORE) that trips the ledger breaker.
    pub ledger_breaker_threshold: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            regen_period_secs: 30,
            initial_energy: 100,
            base_tap_power: 1,
            tap_power: UpgradeCurve {
                base_cost: Ore(dec!(100)),
                growth: dec!(1.5),
                step: 1,
                max_level: 20,
            },
            energy_capacity: UpgradeCurve {
                base_cost: Ore(dec!(200)),
                growth: dec!(1.6),
                step: 50,
                max_level: 20,
            },
            auto_tap: AutoTapConfig::default(),
            conversion: ConversionConfig::default(),
            ledger_breaker_threshold: dec!(0.001),
        }
    }
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.regen_period_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "regen_period_secs",
                reason: "must be positive",
            });
        }
        if self.initial_energy == 0 {
            return Err(ConfigError::Invalid {
                field: "initial_energy",
                reason: "must be positive",
            });
        }
        if self.base_tap_power == 0 {
            return Err(ConfigError::Invalid {
                field: "base_tap_power",
                reason: "must be positive",
            });
        }
        self.tap_power.validate("tap_power")?;
        self.energy_capacity.validate("energy_capacity")?;
        if self.auto_tap.interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "auto_tap.interval_secs",
                reason: "must be positive",
            });
        }
        if self.auto_tap.duration_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "auto_tap.duration_secs",
                reason: "must be positive",
            });
        }
        if self.conversion.ore_per_bio <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                field: "conversion.ore_per_bio",
                reason: "must be positive",
            });
        }
        if self.ledger_breaker_threshold < Decimal::ZERO {
            return Err(ConfigError::Invalid {
                field: "ledger_breaker_threshold",
                reason: "must not be negative",
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Geometric price curve: `base_cost * growth^level`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeCurve {
    pub base_cost: Ore,
    pub growth: Decimal,
    /// Stat increase granted per level.
    pub step: u32,
    pub max_level: u32,
}

impl UpgradeCurve {
    fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        if self.base_cost.0 <= Decimal::ZERO || self.growth < Decimal::ONE || self.step == 0 {
            return Err(ConfigError::Invalid {
                field,
                reason: "needs positive base_cost and step, growth >= 1",
            });
        }
        if crate::upgrades::cost_at(self, self.max_level.saturating_sub(1)).is_none() {
            return Err(ConfigError::Invalid {
                field,
                reason: "price at max_level does not fit in a decimal",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoTapConfig {
    pub price: Ore,
    pub duration_secs: u32,
    /// One simulated tap per interval while the entitlement is active.
    pub interval_secs: u32,
}

impl Default for AutoTapConfig {
    fn default() -> Self {
        Self {
            price: Ore(dec!(500)),
            duration_secs: 86_400,
            interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub ore_per_bio: Decimal,
    pub min_ore: Ore,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            ore_per_bio: dec!(1000),
            min_ore: Ore(dec!(1000)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
