//! Player wallet ledger
//!
//! Every mutation takes the player's lock, reads the balance row,
//! validates, computes the new balance and writes balance, transaction row
//! and reference index as one batch. Any failure before the batch write
//! leaves storage untouched. Balance checks made by callers are only a
//! fast path; the checks here are the ones that count.

pub mod store;

use crate::audit::{AuditContext, AuditEventType, AuditLog, EventSeverity};
use crate::common::locks::KeyedLocks;
use crate::common::money::{Money, MoneyError};
use crate::common::types::{Balance, Transaction, TransactionStatus, TransactionType};
use crate::config::LedgerConfig;
use crate::errors::{ErrorCategory, StorageError};
use crate::metrics::EngineMetrics;
use crate::storage::{KvStore, StoreBatch};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("player not found: {0}")]
    PlayerNotFound(String),

    #[error("account already exists: {0}")]
    AccountExists(String),

    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { available: Money, requested: Money },

    #[error("{tx_type} already posted for {reference}")]
    DuplicateReference {
        reference: String,
        tx_type: TransactionType,
    },

    #[error("negative balance refused for {0}")]
    NegativeBalance(String),

    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl LedgerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LedgerError::InvalidAmount(_)
            | LedgerError::PlayerNotFound(_)
            | LedgerError::AccountExists(_) => ErrorCategory::Validation,
            LedgerError::InsufficientFunds { .. } => ErrorCategory::Resource,
            LedgerError::DuplicateReference { .. } => ErrorCategory::State,
            LedgerError::NegativeBalance(_) => ErrorCategory::Integrity,
            LedgerError::Money(e) => e.category(),
            LedgerError::Storage(_) => ErrorCategory::System,
        }
    }
}

/// Result of replaying one player's transaction log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerVerification {
    pub player_id: String,
    pub transactions_checked: usize,
    pub balance: Money,
    pub problems: Vec<String>,
}

impl LedgerVerification {
    pub fn is_consistent(&self) -> bool {
        self.problems.is_empty()
    }
}

struct Posting<'a> {
    player_id: &'a str,
    tx_type: TransactionType,
    amount: &'a Money,
    reference: &'a str,
    description: String,
}

pub struct Ledger {
    store: Arc<dyn KvStore>,
    locks: KeyedLocks,
    audit: AuditLog,
    config: LedgerConfig,
    metrics: Option<Arc<EngineMetrics>>,
}

impl Ledger {
    pub fn new(store: Arc<dyn KvStore>, audit: AuditLog, config: LedgerConfig) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            audit,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn open_account(&self, player_id: &str, currency: &str) -> Result<Balance, LedgerError> {
        let _guard = self.locks.lock(player_id).await;
        if store::load_balance(&*self.store, player_id)?.is_some() {
            return Err(LedgerError::AccountExists(player_id.to_string()));
        }
        let balance = Balance::new(player_id, currency);
        let mut batch = StoreBatch::new();
        store::stage_balance(&mut batch, &balance)?;
        self.store.write_batch(batch)?;
        debug!("opened {} account for {}", currency, player_id);
        Ok(balance)
    }

    /// Open the account if it does not exist yet.
    pub async fn ensure_account(&self, player_id: &str, currency: &str) -> Result<Balance, LedgerError> {
        match self.open_account(player_id, currency).await {
            Err(LedgerError::AccountExists(_)) => self.get_balance(player_id).await,
            other => other,
        }
    }

    pub async fn deposit(&self, player_id: &str, amount: &Money, reference: &str) -> Result<Transaction, LedgerError> {
        let tx = self
            .post(Posting {
                player_id,
                tx_type: TransactionType::Deposit,
                amount,
                reference,
                description: "Deposit".to_string(),
            })
            .await?;
        self.audit.log(
            AuditEventType::Deposit,
            EventSeverity::Info,
            format!("Deposit of {}", amount),
            json!({ "transaction_id": tx.id, "amount": amount.amount, "currency": amount.currency }),
            AuditContext::player(player_id),
        );
        Ok(tx)
    }

    pub async fn withdraw(&self, player_id: &str, amount: &Money, reference: &str) -> Result<Transaction, LedgerError> {
        let tx = self
            .post(Posting {
                player_id,
                tx_type: TransactionType::Withdrawal,
                amount,
                reference,
                description: "Withdrawal".to_string(),
            })
            .await?;
        self.audit.log(
            AuditEventType::Withdrawal,
            EventSeverity::Info,
            format!("Withdrawal of {}", amount),
            json!({ "transaction_id": tx.id, "amount": amount.amount, "currency": amount.currency }),
            AuditContext::player(player_id),
        );
        Ok(tx)
    }

    /// Debits real money first, then bonus for any shortfall.
    pub async fn place_wager(
        &self,
        player_id: &str,
        amount: &Money,
        game_id: &str,
        cycle_id: &str,
    ) -> Result<Transaction, LedgerError> {
        self.post(Posting {
            player_id,
            tx_type: TransactionType::Wager,
            amount,
            reference: cycle_id,
            description: format!("Wager on {}", game_id),
        })
        .await
    }

    /// A zero win is a normal outcome: no transaction and no error.
    pub async fn credit_win(
        &self,
        player_id: &str,
        amount: &Money,
        game_id: &str,
        cycle_id: &str,
    ) -> Result<Option<Transaction>, LedgerError> {
        if amount.is_negative() {
            return Err(LedgerError::InvalidAmount(format!(
                "win amount must not be negative, got {}",
                amount.amount
            )));
        }
        if amount.is_zero() {
            return Ok(None);
        }
        self.post(Posting {
            player_id,
            tx_type: TransactionType::Win,
            amount,
            reference: cycle_id,
            description: format!("Win on {}", game_id),
        })
        .await
        .map(Some)
    }

    pub async fn refund_wager(
        &self,
        player_id: &str,
        amount: &Money,
        game_id: &str,
        cycle_id: &str,
    ) -> Result<Transaction, LedgerError> {
        self.post(Posting {
            player_id,
            tx_type: TransactionType::Refund,
            amount,
            reference: cycle_id,
            description: format!("Refund of voided wager on {}", game_id),
        })
        .await
    }

    pub async fn credit_bonus(&self, player_id: &str, amount: &Money, reference: &str) -> Result<Transaction, LedgerError> {
        let tx = self
            .post(Posting {
                player_id,
                tx_type: TransactionType::Bonus,
                amount,
                reference,
                description: "Bonus credit".to_string(),
            })
            .await?;
        self.audit.log(
            AuditEventType::BonusCredit,
            EventSeverity::Info,
            format!("Bonus credit of {}", amount),
            json!({ "transaction_id": tx.id, "amount": amount.amount }),
            AuditContext::player(player_id),
        );
        Ok(tx)
    }

    pub async fn get_balance(&self, player_id: &str) -> Result<Balance, LedgerError> {
        store::load_balance(&*self.store, player_id)?
            .ok_or_else(|| LedgerError::PlayerNotFound(player_id.to_string()))
    }

    /// Newest first. `None` or 0 means the default limit; larger values are capped.
    pub async fn get_transactions(&self, player_id: &str, limit: Option<usize>) -> Result<Vec<Transaction>, LedgerError> {
        if store::load_balance(&*self.store, player_id)?.is_none() {
            return Err(LedgerError::PlayerNotFound(player_id.to_string()));
        }
        let limit = self.effective_limit(limit);
        store::load_transactions(&*self.store, player_id, limit)
    }

    pub async fn find_by_reference(
        &self,
        reference: &str,
        tx_type: TransactionType,
    ) -> Result<Option<Transaction>, LedgerError> {
        store::load_reference(&*self.store, reference, tx_type)
    }

    pub fn effective_limit(&self, limit: Option<usize>) -> usize {
        match limit {
            None | Some(0) => self.config.default_history_limit,
            Some(n) => n.min(self.config.max_history_limit),
        }
    }

    pub fn max_history_limit(&self) -> usize {
        self.config.max_history_limit
    }

    async fn post(&self, posting: Posting<'_>) -> Result<Transaction, LedgerError> {
        if !posting.amount.is_positive() {
            return Err(LedgerError::InvalidAmount(format!(
                "{} amount must be > 0, got {}",
                posting.tx_type, posting.amount.amount
            )));
        }

        let _guard = self.locks.lock(posting.player_id).await;

        let mut balance = store::load_balance(&*self.store, posting.player_id)?
            .ok_or_else(|| LedgerError::PlayerNotFound(posting.player_id.to_string()))?;
        balance.real_money.ensure_same_currency(posting.amount)?;

        if posting.tx_type.is_cycle_linked() && !posting.reference.is_empty() {
            let existing = store::load_reference(&*self.store, posting.reference, posting.tx_type)?;
            if existing.is_some() {
                return Err(LedgerError::DuplicateReference {
                    reference: posting.reference.to_string(),
                    tx_type: posting.tx_type,
                });
            }
        }

        let before = balance.available()?;
        let amount = posting.amount;
        match posting.tx_type {
            TransactionType::Withdrawal => {
                if amount.amount > balance.real_money.amount {
                    return Err(self.insufficient(&balance.real_money, amount));
                }
                balance.real_money = balance.real_money.checked_sub(amount)?;
            }
            TransactionType::Wager => {
                if amount.amount > before.amount {
                    return Err(self.insufficient(&before, amount));
                }
                let from_real = amount.amount.min(balance.real_money.amount.max(0));
                let from_bonus = amount.amount - from_real;
                balance.real_money = balance
                    .real_money
                    .checked_sub(&Money::new(from_real, amount.currency.clone()))?;
                balance.bonus = balance
                    .bonus
                    .checked_sub(&Money::new(from_bonus, amount.currency.clone()))?;
            }
            TransactionType::Bonus => {
                balance.bonus = balance.bonus.checked_add(amount)?;
            }
            TransactionType::Deposit
            | TransactionType::Win
            | TransactionType::Refund
            | TransactionType::Adjustment
            | TransactionType::Jackpot => {
                balance.real_money = balance.real_money.checked_add(amount)?;
            }
        }

        if balance.real_money.is_negative() || balance.bonus.is_negative() {
            return Err(LedgerError::NegativeBalance(posting.player_id.to_string()));
        }

        let after = balance.available()?;
        let now = Utc::now();
        balance.version += 1;
        balance.updated_at = now;

        let tx = Transaction {
            id: Uuid::new_v4().to_string(),
            player_id: posting.player_id.to_string(),
            tx_type: posting.tx_type,
            amount: amount.clone(),
            balance_before: before,
            balance_after: after,
            status: TransactionStatus::Completed,
            reference: posting.reference.to_string(),
            description: posting.description,
            created_at: now,
            completed_at: Some(now),
        };

        let mut batch = StoreBatch::new();
        store::stage_posting(&mut batch, &balance, &tx)?;
        self.store.write_batch(batch)?;

        if let Some(metrics) = &self.metrics {
            metrics.record_posting(tx.tx_type.as_str());
        }
        debug!(
            "{} {} for {} -> available {}",
            tx.tx_type, tx.amount, tx.player_id, tx.balance_after
        );
        Ok(tx)
    }

    fn insufficient(&self, available: &Money, requested: &Money) -> LedgerError {
        warn!("insufficient funds: requested {} of {}", requested, available);
        LedgerError::InsufficientFunds {
            available: available.clone(),
            requested: requested.clone(),
        }
    }
}

/// Replay a player's log oldest to newest and check it chains into the balance row.
pub fn verify_player(store: &dyn KvStore, player_id: &str) -> Result<LedgerVerification, LedgerError> {
    let balance = store::load_balance(store, player_id)?
        .ok_or_else(|| LedgerError::PlayerNotFound(player_id.to_string()))?;
    let mut log = store::load_transactions(store, player_id, usize::MAX)?;
    log.reverse();

    let mut problems = Vec::new();
    let mut running: Option<Money> = None;
    for tx in &log {
        if tx.balance_before.amount + tx.signed_amount() != tx.balance_after.amount {
            problems.push(format!(
                "{}: {} {} does not move {} to {}",
                tx.id, tx.tx_type, tx.amount, tx.balance_before, tx.balance_after
            ));
        }
        if tx.balance_after.is_negative() {
            problems.push(format!("{}: negative balance {}", tx.id, tx.balance_after));
        }
        if let Some(prev) = &running {
            if prev != &tx.balance_before {
                problems.push(format!(
                    "{}: starts at {} but previous posting ended at {}",
                    tx.id, tx.balance_before, prev
                ));
            }
        }
        running = Some(tx.balance_after.clone());
    }

    let available = balance.available()?;
    let expected = running.unwrap_or_else(|| Money::zero(balance.currency.clone()));
    if expected != available {
        problems.push(format!(
            "balance row holds {} but the log ends at {}",
            available, expected
        ));
    }
    if log.len() as u64 != balance.version {
        problems.push(format!(
            "balance version {} but {} postings logged",
            balance.version,
            log.len()
        ));
    }

    Ok(LedgerVerification {
        player_id: player_id.to_string(),
        transactions_checked: log.len(),
        balance: available,
        problems,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::storage::MemoryStorage;

    fn usd(amount: i64) -> Money {
        Money::new(amount, "USD")
    }

    fn ledger() -> (Ledger, Arc<MemoryStorage>, Arc<MemoryAuditSink>) {
        let store = Arc::new(MemoryStorage::new());
        let sink = Arc::new(MemoryAuditSink::new());
        let ledger = Ledger::new(store.clone(), AuditLog::new(sink.clone()), LedgerConfig::default());
        (ledger, store, sink)
    }

    async fn funded(amount: i64) -> (Ledger, Arc<MemoryStorage>, Arc<MemoryAuditSink>) {
        let (ledger, store, sink) = ledger();
        ledger.open_account("p1", "USD").await.unwrap();
        if amount > 0 {
            ledger.deposit("p1", &usd(amount), "funding").await.unwrap();
        }
        (ledger, store, sink)
    }

    #[tokio::test]
    async fn test_deposit() {
        let (ledger, _, sink) = funded(0).await;
        let tx = ledger.deposit("p1", &usd(10_000), "card-1").await.unwrap();

        assert_eq!(tx.tx_type, TransactionType::Deposit);
        assert_eq!(tx.balance_before, usd(0));
        assert_eq!(tx.balance_after, usd(10_000));
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.description, "Deposit");
        assert_eq!(ledger.get_balance("p1").await.unwrap().real_money, usd(10_000));
        assert_eq!(sink.of_type(AuditEventType::Deposit).len(), 1);
    }

    #[tokio::test]
    async fn test_deposit_rejects_non_positive() {
        let (ledger, _, _) = funded(0).await;
        assert!(matches!(
            ledger.deposit("p1", &usd(0), "x").await,
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.deposit("p1", &usd(-5), "x").await,
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(ledger.get_transactions("p1", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_player() {
        let (ledger, _, _) = ledger();
        assert!(matches!(
            ledger.deposit("ghost", &usd(100), "x").await,
            Err(LedgerError::PlayerNotFound(_))
        ));
        assert!(matches!(
            ledger.get_balance("ghost").await,
            Err(LedgerError::PlayerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_open_account_twice() {
        let (ledger, _, _) = funded(0).await;
        assert!(matches!(
            ledger.open_account("p1", "USD").await,
            Err(LedgerError::AccountExists(_))
        ));
        let balance = ledger.ensure_account("p1", "USD").await.unwrap();
        assert_eq!(balance.player_id, "p1");
    }

    #[tokio::test]
    async fn test_withdraw() {
        let (ledger, _, _) = funded(1_000).await;
        assert!(matches!(
            ledger.withdraw("p1", &usd(1_001), "bank").await,
            Err(LedgerError::InsufficientFunds { .. })
        ));

        let tx = ledger.withdraw("p1", &usd(1_000), "bank").await.unwrap();
        assert_eq!(tx.balance_after, usd(0));
        assert_eq!(ledger.get_balance("p1").await.unwrap().real_money, usd(0));
    }

    #[tokio::test]
    async fn test_sequential_withdrawals() {
        let (ledger, _, _) = funded(1_000).await;
        for _ in 0..4 {
            ledger.withdraw("p1", &usd(250), "bank").await.unwrap();
        }
        assert!(ledger.withdraw("p1", &usd(1), "bank").await.is_err());
        assert_eq!(ledger.get_balance("p1").await.unwrap().real_money, usd(0));
    }

    #[tokio::test]
    async fn test_withdraw_cannot_touch_bonus() {
        let (ledger, _, _) = funded(100).await;
        ledger.credit_bonus("p1", &usd(500), "welcome").await.unwrap();
        assert!(matches!(
            ledger.withdraw("p1", &usd(200), "bank").await,
            Err(LedgerError::InsufficientFunds { .. })
        ));
    }

    #[tokio::test]
    async fn test_place_wager() {
        let (ledger, _, _) = funded(1_000).await;
        let tx = ledger
            .place_wager("p1", &usd(500), "fortune-slots", "cycle-1")
            .await
            .unwrap();
        assert_eq!(tx.tx_type, TransactionType::Wager);
        assert_eq!(tx.reference, "cycle-1");
        assert_eq!(tx.description, "Wager on fortune-slots");
        assert_eq!(tx.balance_before, usd(1_000));
        assert_eq!(tx.balance_after, usd(500));
    }

    #[tokio::test]
    async fn test_place_wager_insufficient_leaves_no_trace() {
        let (ledger, _, _) = funded(100).await;
        let err = ledger
            .place_wager("p1", &usd(101), "fortune-slots", "cycle-1")
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Resource);
        assert_eq!(ledger.get_balance("p1").await.unwrap().real_money, usd(100));
        assert_eq!(ledger.get_transactions("p1", None).await.unwrap().len(), 1);
        assert!(ledger
            .find_by_reference("cycle-1", TransactionType::Wager)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_wager_uses_bonus_after_real_money() {
        let (ledger, _, _) = funded(300).await;
        ledger.credit_bonus("p1", &usd(200), "welcome").await.unwrap();

        let tx = ledger
            .place_wager("p1", &usd(450), "fortune-slots", "cycle-1")
            .await
            .unwrap();
        assert_eq!(tx.balance_before, usd(500));
        assert_eq!(tx.balance_after, usd(50));

        let balance = ledger.get_balance("p1").await.unwrap();
        assert_eq!(balance.real_money, usd(0));
        assert_eq!(balance.bonus, usd(50));
    }

    #[tokio::test]
    async fn test_duplicate_cycle_posting_rejected() {
        let (ledger, _, _) = funded(1_000).await;
        ledger
            .place_wager("p1", &usd(100), "fortune-slots", "cycle-1")
            .await
            .unwrap();
        let err = ledger
            .place_wager("p1", &usd(100), "fortune-slots", "cycle-1")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateReference { .. }));
        assert_eq!(ledger.get_balance("p1").await.unwrap().real_money, usd(900));

        // a win on the same cycle is a different posting
        ledger
            .credit_win("p1", &usd(50), "fortune-slots", "cycle-1")
            .await
            .unwrap();
        assert!(ledger
            .credit_win("p1", &usd(50), "fortune-slots", "cycle-1")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_credit_win_zero_and_negative() {
        let (ledger, _, _) = funded(100).await;
        assert_eq!(
            ledger.credit_win("p1", &usd(0), "fortune-slots", "c").await.unwrap(),
            None
        );
        assert!(matches!(
            ledger.credit_win("p1", &usd(-1), "fortune-slots", "c").await,
            Err(LedgerError::InvalidAmount(_))
        ));
        assert_eq!(ledger.get_transactions("p1", None).await.unwrap().len(), 1);

        let tx = ledger
            .credit_win("p1", &usd(25_000), "fortune-slots", "c")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.description, "Win on fortune-slots");
        assert_eq!(tx.balance_after, usd(25_100));
    }

    #[tokio::test]
    async fn test_currency_mismatch_is_integrity_error() {
        let (ledger, _, _) = funded(100).await;
        let err = ledger
            .deposit("p1", &Money::new(100, "EUR"), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Money(MoneyError::CurrencyMismatch { .. })));
        assert_eq!(err.category(), ErrorCategory::Integrity);
    }

    #[tokio::test]
    async fn test_transactions_newest_first_and_capped() {
        let (ledger, _, _) = funded(0).await;
        for i in 1..=5 {
            ledger.deposit("p1", &usd(i), "x").await.unwrap();
        }
        let txs = ledger.get_transactions("p1", Some(3)).await.unwrap();
        let amounts: Vec<_> = txs.iter().map(|t| t.amount.amount).collect();
        assert_eq!(amounts, vec![5, 4, 3]);

        assert_eq!(ledger.effective_limit(None), 50);
        assert_eq!(ledger.effective_limit(Some(0)), 50);
        assert_eq!(ledger.effective_limit(Some(10_000)), 500);
    }

    #[tokio::test]
    async fn test_every_posting_chains() {
        let (ledger, store, _) = funded(1_000).await;
        ledger.place_wager("p1", &usd(100), "g", "c1").await.unwrap();
        ledger.credit_win("p1", &usd(300), "g", "c1").await.unwrap();
        ledger.credit_bonus("p1", &usd(50), "promo").await.unwrap();
        ledger.refund_wager("p1", &usd(100), "g", "c2").await.unwrap();
        ledger.withdraw("p1", &usd(200), "bank").await.unwrap();

        let report = verify_player(&*store, "p1").unwrap();
        assert!(report.is_consistent(), "{:?}", report.problems);
        assert_eq!(report.transactions_checked, 6);
        assert_eq!(report.balance, usd(1_150));
    }

    #[tokio::test]
    async fn test_verify_detects_tampering() {
        let (ledger, store, _) = funded(1_000).await;
        let mut balance = ledger.get_balance("p1").await.unwrap();
        balance.real_money = usd(5_000);
        let mut batch = StoreBatch::new();
        store::stage_balance(&mut batch, &balance).unwrap();
        store.write_batch(batch).unwrap();

        let report = verify_player(&*store, "p1").unwrap();
        assert!(!report.is_consistent());
    }
}
