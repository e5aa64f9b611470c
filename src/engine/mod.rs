//! Game cycle orchestrator
//!
//! Sequences debit wager, determine outcome, credit win for every play and
//! owns session and cycle lifecycle. The wager debit and the RNG draw are
//! separate atomic units; the cycle row is persisted between them so a
//! crash or cancellation always leaves a recoverable `in_progress` or
//! `interrupted` cycle rather than a silently dropped wager.

pub mod cycle;
pub mod store;

pub use cycle::{
    CycleStatus, GameCycle, GameRecall, GameSession, GameSessionStatus, InterruptedGame,
    StoredOutcome,
};

use crate::audit::{AuditContext, AuditEventType, AuditLog, EventSeverity};
use crate::common::locks::KeyedLocks;
use crate::common::money::{Money, MoneyError};
use crate::common::traits::{AccessControl, AccessDenied, LimitError, WagerLimits};
use crate::common::types::TransactionType;
use crate::config::{GameConfig, OutcomeFailurePolicy};
use crate::control::GamingControl;
use crate::errors::{ErrorCategory, StorageError};
use crate::games::{calculate_win, GameCatalog, GameDefinition};
use crate::ledger::{Ledger, LedgerError};
use crate::limits::NoWagerLimits;
use crate::metrics::EngineMetrics;
use crate::rng::{DrawSource, RngError};
use crate::storage::KvStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GameError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session not active: {0}")]
    SessionNotActive(String),

    #[error("game not found: {0}")]
    GameNotFound(String),

    #[error("game disabled: {0}")]
    GameDisabled(String),

    #[error("invalid wager: {0}")]
    InvalidWager(String),

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { available: Money, requested: Money },

    #[error("cycle not found: {0}")]
    CycleNotFound(String),

    #[error("cycle {cycle_id} cannot move from {from} to {to}")]
    InvalidState {
        cycle_id: String,
        from: CycleStatus,
        to: CycleStatus,
    },

    #[error("cycle {0} already exists")]
    DuplicateCycle(String),

    #[error("cycle {0} has no stored outcome and can only be voided")]
    OutcomeMissing(String),

    #[error("cycle {0} already has its win credited")]
    WinAlreadyCredited(String),

    #[error("outcome generation failed for cycle {cycle_id}: {source}")]
    OutcomeGeneration { cycle_id: String, source: RngError },

    #[error("stored outcome for cycle {0} does not match its digest")]
    OutcomeTampered(String),

    #[error(transparent)]
    Access(#[from] AccessDenied),

    #[error(transparent)]
    Limit(#[from] LimitError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl GameError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            GameError::SessionNotFound(_)
            | GameError::GameNotFound(_)
            | GameError::GameDisabled(_)
            | GameError::InvalidWager(_)
            | GameError::CycleNotFound(_)
            | GameError::Access(_) => ErrorCategory::Validation,
            GameError::Limit(e) => e.category(),
            GameError::InsufficientBalance { .. } => ErrorCategory::Resource,
            GameError::SessionNotActive(_)
            | GameError::InvalidState { .. }
            | GameError::DuplicateCycle(_)
            | GameError::OutcomeMissing(_)
            | GameError::WinAlreadyCredited(_) => ErrorCategory::State,
            GameError::OutcomeGeneration { source, .. } => source.category(),
            GameError::OutcomeTampered(_) => ErrorCategory::Integrity,
            GameError::Ledger(e) => e.category(),
            GameError::Money(e) => e.category(),
            GameError::Storage(_) | GameError::Serialization(_) => ErrorCategory::System,
        }
    }

    /// Stable label used for rejection metrics.
    fn reason(&self) -> &'static str {
        match self {
            GameError::SessionNotFound(_) => "session_not_found",
            GameError::SessionNotActive(_) => "session_not_active",
            GameError::GameNotFound(_) => "game_not_found",
            GameError::GameDisabled(_) => "game_disabled",
            GameError::InvalidWager(_) => "invalid_wager",
            GameError::InsufficientBalance { .. } => "insufficient_balance",
            GameError::DuplicateCycle(_) => "duplicate_cycle",
            GameError::Access(_) => "access_denied",
            GameError::Limit(_) => "limit_exceeded",
            _ => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayRequest {
    pub session_id: String,
    /// Minor units
    pub wager_amount: i64,
    /// Caller-chosen id; makes a retried play fail `DuplicateCycle` instead of debiting twice.
    #[serde(default)]
    pub cycle_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayResult {
    pub cycle_id: String,
    pub outcome: serde_json::Value,
    pub wager_amount: Money,
    pub win_amount: Money,
    pub balance: Money,
}

pub fn new_cycle_id() -> String {
    Uuid::new_v4().to_string()
}

pub struct GameEngine {
    store: Arc<dyn KvStore>,
    ledger: Arc<Ledger>,
    draws: Arc<dyn DrawSource>,
    catalog: Arc<GameCatalog>,
    access: Arc<dyn AccessControl>,
    limits: Arc<dyn WagerLimits>,
    audit: AuditLog,
    config: GameConfig,
    session_locks: KeyedLocks,
    cycle_locks: KeyedLocks,
    metrics: Option<Arc<EngineMetrics>>,
}

impl GameEngine {
    pub fn new(
        store: Arc<dyn KvStore>,
        ledger: Arc<Ledger>,
        draws: Arc<dyn DrawSource>,
        catalog: Arc<GameCatalog>,
        audit: AuditLog,
        config: GameConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            draws,
            catalog,
            access: Arc::new(GamingControl::new(audit.clone())),
            limits: Arc::new(NoWagerLimits),
            audit,
            config,
            session_locks: KeyedLocks::new(),
            cycle_locks: KeyedLocks::new(),
            metrics: None,
        }
    }

    pub fn with_access_control(mut self, access: Arc<dyn AccessControl>) -> Self {
        self.access = access;
        self
    }

    pub fn with_wager_limits(mut self, limits: Arc<dyn WagerLimits>) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn list_games(&self) -> Vec<GameDefinition> {
        self.catalog.list()
    }

    fn enabled_game(&self, game_id: &str) -> Result<GameDefinition, GameError> {
        let game = self
            .catalog
            .get(game_id)
            .ok_or_else(|| GameError::GameNotFound(game_id.to_string()))?;
        if !game.enabled {
            return Err(GameError::GameDisabled(game_id.to_string()));
        }
        Ok(game)
    }

    pub async fn start_session(&self, player_id: &str, game_id: &str) -> Result<GameSession, GameError> {
        let game = self.enabled_game(game_id)?;
        self.access.check_access(player_id, game_id).await?;

        let balance = self.ledger.get_balance(player_id).await?;
        let available = balance.available()?;
        available.ensure_same_currency(&game.min_bet)?;

        let session = GameSession::new(Uuid::new_v4().to_string(), player_id, game_id, available);
        store::save_session(&*self.store, &session)?;

        self.audit.log(
            AuditEventType::GameSessionStart,
            EventSeverity::Info,
            format!("Game session started for {}", game.name),
            json!({ "game_id": game_id, "opening_balance": session.opening_balance.amount }),
            AuditContext::session(player_id, &session.id),
        );
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<GameSession, GameError> {
        store::load_session(&*self.store, session_id)?
            .ok_or_else(|| GameError::SessionNotFound(session_id.to_string()))
    }

    pub async fn end_session(&self, session_id: &str) -> Result<GameSession, GameError> {
        let _guard = self.session_locks.lock_scoped(session_id).await;
        let mut session = self.get_session(session_id).await?;
        if !session.is_active() {
            return Err(GameError::SessionNotActive(session_id.to_string()));
        }
        let now = Utc::now();
        session.status = GameSessionStatus::Completed;
        session.ended_at = Some(now);
        session.last_activity_at = now;
        store::save_session(&*self.store, &session)?;

        self.audit.log(
            AuditEventType::GameSessionEnd,
            EventSeverity::Info,
            format!("Game session ended: {} games played", session.games_played),
            json!({
                "games_played": session.games_played,
                "total_wagered": session.total_wagered.amount,
                "total_won": session.total_won.amount,
            }),
            AuditContext::session(&session.player_id, &session.id),
        );
        Ok(session)
    }

    /// Run one full cycle for an active session.
    pub async fn play(&self, request: PlayRequest) -> Result<PlayResult, GameError> {
        let (session, game, wager) = self
            .admit(&request)
            .await
            .map_err(|e| self.rejected(e))?;

        let cycle_id = request.cycle_id.clone().unwrap_or_else(new_cycle_id);
        let _guard = self.cycle_locks.lock_scoped(&cycle_id).await;
        self.run_cycle(&session, &game, wager, &cycle_id).await
    }

    /// Every check that must pass before the ledger is touched.
    async fn admit(&self, request: &PlayRequest) -> Result<(GameSession, GameDefinition, Money), GameError> {
        let session = self.get_session(&request.session_id).await?;
        if !session.is_active() {
            return Err(GameError::SessionNotActive(session.id));
        }
        self.access
            .check_access(&session.player_id, &session.game_id)
            .await?;
        let game = self.enabled_game(&session.game_id)?;

        let wager = Money::new(request.wager_amount, game.min_bet.currency.clone());
        if !game.accepts_wager(&wager) {
            return Err(GameError::InvalidWager(format!(
                "{} outside [{}, {}]",
                wager, game.min_bet, game.max_bet
            )));
        }
        self.limits
            .check_wager_limit(&session.player_id, &wager)
            .await?;

        // Fast path only; the ledger re-checks inside its atomic unit.
        let available = self.ledger.get_balance(&session.player_id).await?.available()?;
        if available.amount < wager.amount {
            return Err(GameError::InsufficientBalance {
                available,
                requested: wager,
            });
        }
        if let Some(cycle_id) = &request.cycle_id {
            if store::load_cycle(&*self.store, cycle_id)?.is_some() {
                return Err(GameError::DuplicateCycle(cycle_id.clone()));
            }
        }
        Ok((session, game, wager))
    }

    fn rejected(&self, err: GameError) -> GameError {
        if let Some(metrics) = &self.metrics {
            metrics.record_rejection(err.reason());
        }
        err
    }

    async fn run_cycle(
        &self,
        session: &GameSession,
        game: &GameDefinition,
        wager: Money,
        cycle_id: &str,
    ) -> Result<PlayResult, GameError> {
        let evaluator = self
            .catalog
            .evaluator(&game.id)
            .ok_or_else(|| GameError::GameNotFound(game.id.clone()))?;

        let wager_tx = self
            .ledger
            .place_wager(&session.player_id, &wager, &game.id, cycle_id)
            .await
            .map_err(|e| {
                self.rejected(match e {
                    LedgerError::DuplicateReference { .. } => GameError::DuplicateCycle(cycle_id.to_string()),
                    LedgerError::InsufficientFunds { available, requested } => {
                        GameError::InsufficientBalance { available, requested }
                    }
                    other => GameError::Ledger(other),
                })
            })?;
        if let Some(metrics) = &self.metrics {
            metrics.add_wagered(wager.amount);
        }

        let mut cycle = GameCycle::new(
            cycle_id.to_string(),
            session,
            wager.clone(),
            wager_tx.balance_before.clone(),
        );
        cycle.balance_after = wager_tx.balance_after.clone();
        cycle.transition(CycleStatus::InProgress)?;
        if let Err(e) = store::save_cycle(&*self.store, &cycle) {
            error!(
                "cycle {} debited {} but could not be persisted: {}",
                cycle_id, wager, e
            );
            return Err(e);
        }

        // Entropy reads block; a caller dropping this future while the draw
        // runs leaves the cycle `in_progress` with no outcome.
        let draws = self.draws.clone();
        let draw_cycle = cycle_id.to_string();
        let generated = tokio::task::spawn_blocking(move || {
            evaluator
                .evaluate(&*draws)
                .map_err(|source| GameError::OutcomeGeneration {
                    cycle_id: draw_cycle,
                    source,
                })
                .and_then(|outcome| StoredOutcome::capture(&*outcome))
        })
        .await
        .unwrap_or_else(|e| {
            Err(GameError::OutcomeGeneration {
                cycle_id: cycle_id.to_string(),
                source: RngError::EntropyUnavailable(format!("draw task failed: {}", e)),
            })
        });
        let stored = match generated {
            Ok(stored) => stored,
            Err(e) => return Err(self.outcome_failed(cycle, e).await),
        };

        let win = calculate_win(stored.total_multiplier, &wager, self.config.unit_stake)?;
        cycle.outcome = Some(stored);
        cycle.win_amount = win.clone();
        store::save_cycle(&*self.store, &cycle)?;

        if win.is_positive() {
            match self
                .ledger
                .credit_win(&session.player_id, &win, &game.id, cycle_id)
                .await
            {
                Ok(Some(tx)) => cycle.balance_after = tx.balance_after,
                Ok(None) => {}
                Err(e) => {
                    let reason = format!("win credit failed: {}", e);
                    self.interrupt(&mut cycle, &reason)?;
                    return Err(e.into());
                }
            }
            if let Some(metrics) = &self.metrics {
                metrics.add_won(win.amount);
            }
        }

        cycle.transition(CycleStatus::Completed)?;
        self.settle(&cycle).await?;

        let outcome = cycle
            .outcome
            .as_ref()
            .map(|o| o.payload.clone())
            .unwrap_or(serde_json::Value::Null);
        Ok(PlayResult {
            cycle_id: cycle.id.clone(),
            outcome,
            wager_amount: cycle.wager_amount.clone(),
            win_amount: cycle.win_amount.clone(),
            balance: cycle.balance_after.clone(),
        })
    }

    /// Persist a completed cycle with the session totals and emit its audit trail.
    async fn settle(&self, cycle: &GameCycle) -> Result<(), GameError> {
        {
            let _guard = self.session_locks.lock_scoped(&cycle.session_id).await;
            let mut session = self.get_session(&cycle.session_id).await?;
            session.record_cycle(&cycle.wager_amount, &cycle.win_amount, &cycle.balance_after)?;
            store::complete_cycle(&*self.store, cycle, &session)?;
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_cycle(CycleStatus::Completed.as_str());
        }
        let ctx = AuditContext::session(&cycle.player_id, &cycle.session_id);
        self.audit.log(
            AuditEventType::GameCycleComplete,
            EventSeverity::Info,
            format!("Cycle {} completed", cycle.id),
            json!({
                "cycle_id": cycle.id,
                "game_id": cycle.game_id,
                "wager": cycle.wager_amount.amount,
                "win": cycle.win_amount.amount,
                "balance_after": cycle.balance_after.amount,
            }),
            ctx.clone(),
        );
        if cycle.win_amount.amount >= self.config.large_win_threshold && cycle.win_amount.is_positive() {
            self.audit.log(
                AuditEventType::LargeWin,
                EventSeverity::Info,
                format!("Large win: {}", cycle.win_amount),
                json!({
                    "cycle_id": cycle.id,
                    "game_id": cycle.game_id,
                    "win": cycle.win_amount.amount,
                    "wager": cycle.wager_amount.amount,
                }),
                ctx,
            );
        }
        Ok(())
    }

    fn interrupt(&self, cycle: &mut GameCycle, reason: &str) -> Result<(), GameError> {
        cycle.transition(CycleStatus::Interrupted)?;
        cycle.interrupt_reason = Some(reason.to_string());
        store::save_cycle(&*self.store, cycle)?;

        if let Some(metrics) = &self.metrics {
            metrics.record_cycle(CycleStatus::Interrupted.as_str());
        }
        self.audit.log(
            AuditEventType::GameCycleInterrupted,
            EventSeverity::Warning,
            format!("Cycle {} interrupted: {}", cycle.id, reason),
            json!({
                "cycle_id": cycle.id,
                "wager": cycle.wager_amount.amount,
                "outcome_stored": cycle.outcome.is_some(),
            }),
            AuditContext::session(&cycle.player_id, &cycle.session_id),
        );
        Ok(())
    }

    /// Outcome generation failed after the debit. The cycle is interrupted
    /// first; under `Compensate` the wager is then credited back and the
    /// cycle voided. The original error is always returned.
    async fn outcome_failed(&self, mut cycle: GameCycle, err: GameError) -> GameError {
        error!("cycle {}: {}", cycle.id, err);
        let reason = format!("outcome generation failed: {}", err);
        if let Err(e) = self.interrupt(&mut cycle, &reason) {
            error!("cycle {} could not be marked interrupted: {}", cycle.id, e);
            return err;
        }

        if self.config.outcome_failure_policy == OutcomeFailurePolicy::Compensate {
            match self
                .ledger
                .credit_win(&cycle.player_id, &cycle.wager_amount, &cycle.game_id, &cycle.id)
                .await
            {
                Ok(tx) => {
                    if let Some(tx) = tx {
                        cycle.balance_after = tx.balance_after;
                    }
                    if let Err(e) = self.finish_void(&mut cycle, "wager returned after outcome failure") {
                        error!("cycle {} compensated but not voided: {}", cycle.id, e);
                    }
                }
                Err(e) => {
                    error!(
                        "cycle {} compensation failed, left interrupted for manual void: {}",
                        cycle.id, e
                    );
                    self.audit.log(
                        AuditEventType::SystemError,
                        EventSeverity::Critical,
                        format!("Compensation failed for cycle {}", cycle.id),
                        json!({ "cycle_id": cycle.id, "error": e.to_string() }),
                        AuditContext::session(&cycle.player_id, &cycle.session_id),
                    );
                }
            }
        }
        err
    }

    fn finish_void(&self, cycle: &mut GameCycle, reason: &str) -> Result<(), GameError> {
        cycle.transition(CycleStatus::Voided)?;
        cycle.void_reason = Some(reason.to_string());
        store::save_cycle(&*self.store, cycle)?;

        if let Some(metrics) = &self.metrics {
            metrics.record_cycle(CycleStatus::Voided.as_str());
        }
        self.audit.log(
            AuditEventType::GameCycleVoided,
            EventSeverity::Warning,
            format!("Cycle {} voided: {}", cycle.id, reason),
            json!({ "cycle_id": cycle.id, "refund": cycle.wager_amount.amount }),
            AuditContext::session(&cycle.player_id, &cycle.session_id),
        );
        Ok(())
    }

    /// Move an `in_progress` cycle to `interrupted`.
    pub async fn mark_interrupted(&self, cycle_id: &str, reason: &str) -> Result<GameCycle, GameError> {
        let _guard = self.cycle_locks.lock_scoped(cycle_id).await;
        let mut cycle = self.get_cycle(cycle_id).await?;
        cycle.require(CycleStatus::InProgress, CycleStatus::Interrupted)?;
        self.interrupt(&mut cycle, reason)?;
        Ok(cycle)
    }

    pub async fn get_interrupted_games(&self, player_id: &str) -> Result<Vec<InterruptedGame>, GameError> {
        Ok(store::load_interrupted(&*self.store, player_id)?
            .iter()
            .map(InterruptedGame::from)
            .collect())
    }

    /// Refund the held wager and void an interrupted cycle.
    pub async fn void_game(&self, cycle_id: &str, reason: &str) -> Result<GameCycle, GameError> {
        let _guard = self.cycle_locks.lock_scoped(cycle_id).await;
        let mut cycle = self.get_cycle(cycle_id).await?;
        cycle.require(CycleStatus::Interrupted, CycleStatus::Voided)?;

        if self
            .ledger
            .find_by_reference(cycle_id, TransactionType::Win)
            .await?
            .is_some()
        {
            return Err(GameError::WinAlreadyCredited(cycle_id.to_string()));
        }

        let refund = match self
            .ledger
            .refund_wager(&cycle.player_id, &cycle.wager_amount, &cycle.game_id, cycle_id)
            .await
        {
            Ok(tx) => tx,
            // refunded before a crash, the cycle row just never caught up
            Err(LedgerError::DuplicateReference { .. }) => self
                .ledger
                .find_by_reference(cycle_id, TransactionType::Refund)
                .await?
                .ok_or_else(|| GameError::CycleNotFound(cycle_id.to_string()))?,
            Err(e) => return Err(e.into()),
        };
        cycle.balance_after = refund.balance_after;
        self.finish_void(&mut cycle, reason)?;
        info!("cycle {} voided, {} refunded", cycle_id, cycle.wager_amount);
        Ok(cycle)
    }

    /// Settle an interrupted cycle from its stored outcome. Never redraws.
    pub async fn resume_game(&self, cycle_id: &str) -> Result<GameCycle, GameError> {
        let _guard = self.cycle_locks.lock_scoped(cycle_id).await;
        let mut cycle = self.get_cycle(cycle_id).await?;
        cycle.require(CycleStatus::Interrupted, CycleStatus::Completed)?;

        let stored = cycle
            .outcome
            .as_ref()
            .ok_or_else(|| GameError::OutcomeMissing(cycle_id.to_string()))?;
        if !stored.verify()? {
            self.audit.log(
                AuditEventType::SystemError,
                EventSeverity::Critical,
                format!("Stored outcome digest mismatch on cycle {}", cycle_id),
                json!({ "cycle_id": cycle_id, "digest": stored.digest }),
                AuditContext::session(&cycle.player_id, &cycle.session_id),
            );
            return Err(GameError::OutcomeTampered(cycle_id.to_string()));
        }

        if cycle.win_amount.is_positive() {
            let existing = self
                .ledger
                .find_by_reference(cycle_id, TransactionType::Win)
                .await?;
            let tx = match existing {
                Some(tx) => tx,
                None => {
                    let credited = self
                        .ledger
                        .credit_win(&cycle.player_id, &cycle.win_amount, &cycle.game_id, cycle_id)
                        .await?;
                    if let Some(metrics) = &self.metrics {
                        metrics.add_won(cycle.win_amount.amount);
                    }
                    credited.ok_or_else(|| GameError::CycleNotFound(cycle_id.to_string()))?
                }
            };
            cycle.balance_after = tx.balance_after;
        } else if let Some(wager_tx) = self
            .ledger
            .find_by_reference(cycle_id, TransactionType::Wager)
            .await?
        {
            // nothing posted after the wager for this cycle
            cycle.balance_after = wager_tx.balance_after;
        }

        cycle.transition(CycleStatus::Completed)?;
        self.settle(&cycle).await?;
        self.audit.log(
            AuditEventType::GameCycleResumed,
            EventSeverity::Info,
            format!("Cycle {} resumed from stored outcome", cycle_id),
            json!({ "cycle_id": cycle_id, "win": cycle.win_amount.amount }),
            AuditContext::session(&cycle.player_id, &cycle.session_id),
        );
        Ok(cycle)
    }

    pub async fn get_cycle(&self, cycle_id: &str) -> Result<GameCycle, GameError> {
        store::load_cycle(&*self.store, cycle_id)?
            .ok_or_else(|| GameError::CycleNotFound(cycle_id.to_string()))
    }

    /// Newest first. `None` or 0 means 10; capped by the ledger's history cap.
    pub async fn get_history(&self, player_id: &str, limit: Option<usize>) -> Result<Vec<GameRecall>, GameError> {
        let limit = match limit {
            None | Some(0) => DEFAULT_HISTORY_LIMIT,
            Some(n) => n.min(self.ledger.max_history_limit()),
        };
        Ok(store::load_history(&*self.store, player_id, limit)?
            .into_iter()
            .map(GameRecall::from)
            .collect())
    }
}
