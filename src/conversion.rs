//! ORE → BIO conversion desk.
//!
//! BIO is rounded down to [`BIO_DECIMALS`] places and the ORE debit is
//! recomputed from the rounded BIO, so `ore_debit == bio_credit * rate`
//! holds exactly and the journal entry balances with zero error.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::config::ConversionConfig;
use crate::core_types::{Bio, Ore};

pub const BIO_DECIMALS: u32 = 8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("conversion amount must be positive")]
    NonPositiveAmount,

    #[error("minimum conversion is {min}, requested {requested}")]
    BelowMinimum { min: Ore, requested: Ore },

    #[error("conversion needs {needed}, balance is {balance}")]
    InsufficientOre { needed: Ore, balance: Ore },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionQuote {
    pub ore_debit: Ore,
    pub bio_credit: Bio,
    pub ore_per_bio: Decimal,
}

#[derive(Debug, Clone)]
pub struct ConversionDesk {
    config: ConversionConfig,
}

impl ConversionDesk {
    pub fn new(config: ConversionConfig) -> Self {
        Self { config }
    }

    pub fn rate(&self) -> Decimal {
        self.config.ore_per_bio
    }

    /// Quote converting `ore` into BIO at the configured rate.
    pub fn quote(&self, ore: Ore) -> Result<ConversionQuote, ConversionError> {
        if ore.0 <= Decimal::ZERO {
            return Err(ConversionError::NonPositiveAmount);
        }
        if ore < self.config.min_ore {
            return Err(ConversionError::BelowMinimum { min: self.config.min_ore, requested: ore });
        }

        let rate = self.config.ore_per_bio;
        let bio = (ore.0 / rate).round_dp_with_strategy(BIO_DECIMALS, RoundingStrategy::ToZero);
        Ok(ConversionQuote {
            ore_debit: Ore(bio * rate),
            bio_credit: Bio(bio),
            ore_per_bio: rate,
        })
    }

    /// Quote and check against the available balance.
    pub fn quote_for_balance(&self, ore: Ore, balance: Ore) -> Result<ConversionQuote, ConversionError> {
        let quote = self.quote(ore)?;
        if quote.ore_debit > balance {
            return Err(ConversionError::InsufficientOre { needed: quote.ore_debit, balance });
        }
        Ok(quote)
    }

    /// Value of a BIO amount in ORE at the desk rate.
    pub fn bio_in_ore(&self, bio: Bio) -> Ore {
        Ore(bio.0 * self.config.ore_per_bio)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
