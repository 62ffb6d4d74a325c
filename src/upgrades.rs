//! Mining-stat upgrades and their price curve.

use rust_decimal::RoundingStrategy;
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, UpgradeCurve};
use crate::core_types::Ore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpgradeError {
    #[error("{0:?} is already at max level {1}")]
    MaxLevelReached(UpgradeKind, u32),

    #[error("upgrade costs {cost}, balance is {balance}")]
    InsufficientOre { cost: Ore, balance: Ore },

    #[error("{0:?} price at level {1} is out of range")]
    PriceOverflow(UpgradeKind, u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpgradeKind {
    /// ORE earned per tap.
    TapPower,
    /// Energy capacity.
    EnergyCapacity,
}

impl UpgradeKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "tap_power" => Some(Self::TapPower),
            "energy_capacity" => Some(Self::EnergyCapacity),
            _ => None,
        }
    }
}

/// Price of buying `level + 1`: `base_cost * growth^level`, rounded to whole ORE.
///
/// `None` when the price does not fit in a `Decimal`.
pub fn cost_at(curve: &UpgradeCurve, level: u32) -> Option<Ore> {
    let mut cost = curve.base_cost.0;
    for _ in 0..level {
        cost = cost.checked_mul(curve.growth)?;
    }
    Some(Ore(cost.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)))
}

/// Tap power at a given tap-power level.
pub fn tap_power_at(config: &EngineConfig, level: u32) -> Ore {
    let per_level = u64::from(config.tap_power.step) * u64::from(level);
    Ore::whole(u64::from(config.base_tap_power) + per_level)
}

/// A priced, validated upgrade ready to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradePurchase {
    pub kind: UpgradeKind,
    pub cost: Ore,
    pub new_level: u32,
    /// Stat increase to apply (tap power units or energy capacity).
    pub step: u32,
}

/// Read-only catalog over the configured curves.
#[derive(Debug, Clone)]
pub struct UpgradeCatalog<'a> {
    config: &'a EngineConfig,
}

impl<'a> UpgradeCatalog<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    pub fn curve(&self, kind: UpgradeKind) -> &UpgradeCurve {
        match kind {
            UpgradeKind::TapPower => &self.config.tap_power,
            UpgradeKind::EnergyCapacity => &self.config.energy_capacity,
        }
    }

    /// Price the next level of `kind` against the current balance.
    pub fn quote(
        &self,
        kind: UpgradeKind,
        current_level: u32,
        balance: Ore,
    ) -> Result<UpgradePurchase, UpgradeError> {
        let curve = self.curve(kind);
        if current_level >= curve.max_level {
            return Err(UpgradeError::MaxLevelReached(kind, curve.max_level));
        }
        let cost = cost_at(curve, current_level)
            .ok_or(UpgradeError::PriceOverflow(kind, current_level))?;
        if cost > balance {
            return Err(UpgradeError::InsufficientOre { cost, balance });
        }
        Ok(UpgradePurchase {
            kind,
            cost,
            new_level: current_level + 1,
            step: curve.step,
        })
    }

    /// Total ORE needed to go from level 0 to `level`.
    pub fn cumulative_cost(&self, kind: UpgradeKind, level: u32) -> Option<Ore> {
        let curve = self.curve(kind);
        (0..level.min(curve.max_level)).try_fold(Ore::zero(), |total, l| {
            let cost = cost_at(curve, l)?;
            total.0.checked_add(cost.0).map(Ore)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn cost_curve_is_geometric() {
        let config = EngineConfig::default();
        let curve = &config.tap_power;
        assert_eq!(cost_at(curve, 0), Some(Ore(dec!(100))));
        assert_eq!(cost_at(curve, 1), Some(Ore(dec!(150))));
        assert_eq!(cost_at(curve, 2), Some(Ore(dec!(225))));
        // 337.5 rounds away from zero
        assert_eq!(cost_at(curve, 3), Some(Ore(dec!(338))));
    }

    #[test]
    fn quote_checks_balance() {
        let config = EngineConfig::default();
        let catalog = UpgradeCatalog::new(&config);

        let err = catalog.quote(UpgradeKind::EnergyCapacity, 0, Ore(dec!(199)));
        assert_eq!(
            err,
            Err(UpgradeError::InsufficientOre { cost: Ore(dec!(200)), balance: Ore(dec!(199)) })
        );

        let ok = catalog
            .quote(UpgradeKind::EnergyCapacity, 0, Ore(dec!(200)))
            .expect("test: affordable");
        assert_eq!(ok.new_level, 1);
        assert_eq!(ok.step, 50);
    }

    #[test]
    fn quote_stops_at_max_level() {
        let config = EngineConfig::default();
        let catalog = UpgradeCatalog::new(&config);
        let err = catalog.quote(UpgradeKind::TapPower, 20, Ore(dec!(1000000000)));
        assert_eq!(err, Err(UpgradeError::MaxLevelReached(UpgradeKind::TapPower, 20)));
    }

    #[test]
    fn tap_power_grows_per_level() {
        let config = EngineConfig::default();
        assert_eq!(tap_power_at(&config, 0), Ore::whole(1));
        assert_eq!(tap_power_at(&config, 4), Ore::whole(5));
    }

    #[test]
    fn cumulative_cost_sums_levels() {
        let config = EngineConfig::default();
        let catalog = UpgradeCatalog::new(&config);
        assert_eq!(catalog.cumulative_cost(UpgradeKind::TapPower, 3), Some(Ore(dec!(475))));
    }

    #[test]
    fn runaway_curve_is_an_error_not_a_panic() {
        let mut config = EngineConfig::default();
        config.tap_power.growth = dec!(10);
        config.tap_power.max_level = 60;
        let catalog = UpgradeCatalog::new(&config);

        assert_eq!(cost_at(&config.tap_power, 40), None);
        assert_eq!(
            catalog.quote(UpgradeKind::TapPower, 40, Ore(dec!(1000))),
            Err(UpgradeError::PriceOverflow(UpgradeKind::TapPower, 40))
        );
        assert_eq!(catalog.cumulative_cost(UpgradeKind::TapPower, 60), None);
    }

    #[test]
    fn kind_names() {
        assert_eq!(UpgradeKind::from_name("tap_power"), Some(UpgradeKind::TapPower));
        assert_eq!(UpgradeKind::from_name("energy_capacity"), Some(UpgradeKind::EnergyCapacity));
        assert_eq!(UpgradeKind::from_name("luck"), None);
    }
}
