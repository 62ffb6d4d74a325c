//! Double-entry journal for balance mutations.
//!
//! Every ORE or BIO movement is recorded as a [`JournalEntry`] whose postings
//! must sum to zero once BIO is valued in ORE:
//!
//! ```text
//! Σ debits = Σ credits
//! ```
//!
//! Absolute error is accumulated across entries. A circuit breaker halts all
//! further balance writes if the cumulative error exceeds the configured
//! threshold.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core_types::{Currency, Ore};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger circuit breaker tripped: balance writes halted (cumulative error: {0})")]
    CircuitBreakerTripped(Decimal),

    #[error("unbalanced journal entry `{memo}`: postings sum to {imbalance}")]
    Unbalanced { memo: String, imbalance: Decimal },
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Account {
    /// The user's spendable balance in one currency.
    Wallet(Currency),
    /// Source of ORE minted by taps and auto-taps.
    MiningPool,
    /// Destination of ORE spent on upgrades and auto-tap time.
    UpgradeSink,
    /// Counterparty of ORE ↔ BIO conversions.
    Exchange,
}

/// A signed movement valued in ORE. Positive credits the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub account: Account,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub memo: String,
    pub postings: Vec<Posting>,
}

impl JournalEntry {
    pub fn new(memo: impl Into<String>) -> Self {
        Self { memo: memo.into(), postings: Vec::new() }
    }

    pub fn post(mut self, account: Account, amount: Decimal) -> Self {
        self.postings.push(Posting { account, amount });
        self
    }

    /// ORE minted into the wallet by taps.
    pub fn mint(memo: &str, amount: Ore) -> Self {
        Self::new(memo)
            .post(Account::MiningPool, -amount.0)
            .post(Account::Wallet(Currency::Ore), amount.0)
    }

    /// ORE spent from the wallet on a purchase.
    pub fn spend(memo: &str, amount: Ore) -> Self {
        Self::new(memo)
            .post(Account::Wallet(Currency::Ore), -amount.0)
            .post(Account::UpgradeSink, amount.0)
    }

    /// ORE exchanged for BIO; `bio_value` is the BIO credit valued in ORE.
    pub fn convert(ore_debit: Ore, bio_value: Ore) -> Self {
        Self::new("convert")
            .post(Account::Wallet(Currency::Ore), -ore_debit.0)
            .post(Account::Exchange, ore_debit.0)
            .post(Account::Exchange, -bio_value.0)
            .post(Account::Wallet(Currency::Bio), bio_value.0)
    }

    pub fn imbalance(&self) -> Decimal {
        self.postings.iter().map(|p| p.amount).sum()
    }
}

/// Per-entry tolerance for rounding differences.
const ENTRY_TOLERANCE: Decimal = dec!(0.0001);

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Running account totals plus the conservation circuit breaker.
#[derive(Debug, Clone)]
pub struct Ledger {
    balances: HashMap<Account, Decimal>,
    entries: u64,
    cumulative_error: Decimal,
    circuit_breaker_threshold: Decimal,
    circuit_breaker_tripped: bool,
}

impl Ledger {
    pub fn new(threshold: Decimal) -> Self {
        Self {
            balances: HashMap::new(),
            entries: 0,
            cumulative_error: Decimal::ZERO,
            circuit_breaker_threshold: threshold,
            circuit_breaker_tripped: false,
        }
    }

    /// Check an entry without recording it.
    pub fn check(&self, entry: &JournalEntry) -> Result<(), LedgerError> {
        if self.circuit_breaker_tripped {
            return Err(LedgerError::CircuitBreakerTripped(self.cumulative_error));
        }
        let imbalance = entry.imbalance();
        if imbalance.abs() > ENTRY_TOLERANCE {
            return Err(LedgerError::Unbalanced { memo: entry.memo.clone(), imbalance });
        }
        Ok(())
    }

    /// Verify and apply an entry.
    ///
    /// The absolute imbalance is accumulated whether or not the entry passes;
    /// crossing the threshold trips the breaker and rejects the entry.
    pub fn record(&mut self, entry: &JournalEntry) -> Result<(), LedgerError> {
        if self.circuit_breaker_tripped {
            return Err(LedgerError::CircuitBreakerTripped(self.cumulative_error));
        }

        let imbalance = entry.imbalance();
        self.cumulative_error += imbalance.abs();

        if self.cumulative_error > self.circuit_breaker_threshold {
            self.circuit_breaker_tripped = true;
            tracing::warn!(
                memo = %entry.memo,
                cumulative_error = %self.cumulative_error,
                "ledger circuit breaker tripped"
            );
            return Err(LedgerError::CircuitBreakerTripped(self.cumulative_error));
        }

        if imbalance.abs() > ENTRY_TOLERANCE {
            return Err(LedgerError::Unbalanced { memo: entry.memo.clone(), imbalance });
        }

        for posting in &entry.postings {
            *self.balances.entry(posting.account).or_insert(Decimal::ZERO) += posting.amount;
        }
        self.entries += 1;
        Ok(())
    }

    /// Undo a previously recorded entry (used when its write is rolled back).
    pub fn reverse(&mut self, entry: &JournalEntry) {
        for posting in &entry.postings {
            *self.balances.entry(posting.account).or_insert(Decimal::ZERO) -= posting.amount;
        }
        self.entries = self.entries.saturating_sub(1);
    }

    /// Start tracking movements afresh from a newly loaded record.
    ///
    /// Cumulative error and the breaker state survive a rebase.
    pub fn rebase(&mut self) {
        self.balances.clear();
        self.entries = 0;
    }

    pub fn balance(&self, account: Account) -> Decimal {
        self.balances.get(&account).copied().unwrap_or(Decimal::ZERO)
    }

    /// Sum over all accounts; zero for a sound ledger.
    pub fn net(&self) -> Decimal {
        self.balances.values().copied().sum()
    }

    pub fn entry_count(&self) -> u64 {
        self.entries
    }

    pub fn is_circuit_breaker_tripped(&self) -> bool {
        self.circuit_breaker_tripped
    }

    pub fn reset_circuit_breaker(&mut self) {
        self.circuit_breaker_tripped = false;
        self.cumulative_error = Decimal::ZERO;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
