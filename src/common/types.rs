//! Ledger record types
//!
//! Balances and the immutable transaction rows written alongside every
//! balance mutation.

use crate::common::money::{Money, MoneyError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of ledger posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Wager,
    Win,
    Bonus,
    Adjustment,
    Refund,
    Jackpot,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Wager => "wager",
            TransactionType::Win => "win",
            TransactionType::Bonus => "bonus",
            TransactionType::Adjustment => "adjustment",
            TransactionType::Refund => "refund",
            TransactionType::Jackpot => "jackpot",
        }
    }

    /// Postings that link to a game cycle and must be unique per cycle.
    pub fn is_cycle_linked(&self) -> bool {
        matches!(
            self,
            TransactionType::Wager | TransactionType::Win | TransactionType::Refund
        )
    }

    /// Whether the posting increases the available balance.
    pub fn is_credit(&self) -> bool {
        !matches!(self, TransactionType::Withdrawal | TransactionType::Wager)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

/// Immutable ledger entry.
///
/// `balance_before` and `balance_after` are Available balances (real money
/// plus bonus), so `balance_after = balance_before ± amount` holds for every
/// posting type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub player_id: String,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub amount: Money,
    pub balance_before: Money,
    pub balance_after: Money,
    pub status: TransactionStatus,
    /// Cycle id for wager/win/refund postings, free-form otherwise
    pub reference: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Signed effect of this posting on the Available balance.
    pub fn signed_amount(&self) -> i64 {
        if self.tx_type.is_credit() {
            self.amount.amount
        } else {
            -self.amount.amount
        }
    }
}

/// Per-player balance row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub player_id: String,
    pub real_money: Money,
    pub bonus: Money,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
    /// Incremented on every mutation; orders the transaction log.
    pub version: u64,
}

impl Balance {
    pub fn new(player_id: impl Into<String>, currency: impl Into<String>) -> Self {
        let currency = currency.into();
        Self {
            player_id: player_id.into(),
            real_money: Money::zero(currency.clone()),
            bonus: Money::zero(currency.clone()),
            currency,
            updated_at: Utc::now(),
            version: 0,
        }
    }

    pub fn available(&self) -> Result<Money, MoneyError> {
        self.real_money.checked_add(&self.bonus)
    }
}
