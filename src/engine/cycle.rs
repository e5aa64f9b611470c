//! Session and cycle records and the cycle state machine

use super::GameError;
use crate::common::money::Money;
use crate::games::Outcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Pending,
    InProgress,
    Completed,
    Interrupted,
    Voided,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::Pending => "pending",
            CycleStatus::InProgress => "in_progress",
            CycleStatus::Completed => "completed",
            CycleStatus::Interrupted => "interrupted",
            CycleStatus::Voided => "voided",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CycleStatus::Completed | CycleStatus::Voided)
    }

    pub fn can_transition_to(&self, next: CycleStatus) -> bool {
        use CycleStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, Completed)
                | (InProgress, Interrupted)
                | (Interrupted, Completed)
                | (Interrupted, Voided)
        )
    }
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameSessionStatus {
    Active,
    Completed,
    Interrupted,
}

impl fmt::Display for GameSessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameSessionStatus::Active => "active",
            GameSessionStatus::Completed => "completed",
            GameSessionStatus::Interrupted => "interrupted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    pub id: String,
    pub player_id: String,
    pub game_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    pub status: GameSessionStatus,
    pub opening_balance: Money,
    pub current_balance: Money,
    pub total_wagered: Money,
    pub total_won: Money,
    pub games_played: u64,
}

impl GameSession {
    pub fn new(id: String, player_id: &str, game_id: &str, opening_balance: Money) -> Self {
        let now = Utc::now();
        let currency = opening_balance.currency.clone();
        Self {
            id,
            player_id: player_id.to_string(),
            game_id: game_id.to_string(),
            started_at: now,
            ended_at: None,
            last_activity_at: now,
            status: GameSessionStatus::Active,
            current_balance: opening_balance.clone(),
            opening_balance,
            total_wagered: Money::zero(currency.clone()),
            total_won: Money::zero(currency),
            games_played: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == GameSessionStatus::Active
    }

    /// Fold a settled cycle into the running totals.
    pub fn record_cycle(&mut self, wager: &Money, win: &Money, balance_after: &Money) -> Result<(), GameError> {
        self.total_wagered = self.total_wagered.checked_add(wager)?;
        self.total_won = self.total_won.checked_add(win)?;
        self.current_balance = balance_after.clone();
        self.games_played += 1;
        self.last_activity_at = Utc::now();
        Ok(())
    }
}

/// An outcome exactly as produced, with a digest over its canonical JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOutcome {
    pub payload: serde_json::Value,
    pub digest: String,
    pub total_multiplier: i64,
    pub is_win: bool,
}

impl StoredOutcome {
    pub fn capture(outcome: &dyn Outcome) -> Result<Self, GameError> {
        let payload = outcome
            .to_value()
            .map_err(|e| GameError::Serialization(e.to_string()))?;
        let digest = digest_of(&payload)?;
        Ok(Self {
            payload,
            digest,
            total_multiplier: outcome.total_multiplier(),
            is_win: outcome.is_win(),
        })
    }

    pub fn verify(&self) -> Result<bool, GameError> {
        Ok(digest_of(&self.payload)? == self.digest)
    }
}

fn digest_of(payload: &serde_json::Value) -> Result<String, GameError> {
    let bytes = serde_json::to_vec(payload).map_err(|e| GameError::Serialization(e.to_string()))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameCycle {
    pub id: String,
    pub session_id: String,
    pub player_id: String,
    pub game_id: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub wager_amount: Money,
    pub win_amount: Money,
    pub balance_before: Money,
    pub balance_after: Money,
    pub outcome: Option<StoredOutcome>,
    pub status: CycleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupt_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub void_reason: Option<String>,
}

impl GameCycle {
    pub fn new(id: String, session: &GameSession, wager: Money, balance_before: Money) -> Self {
        let now = Utc::now();
        Self {
            id,
            session_id: session.id.clone(),
            player_id: session.player_id.clone(),
            game_id: session.game_id.clone(),
            started_at: now,
            updated_at: now,
            completed_at: None,
            win_amount: Money::zero(wager.currency.clone()),
            wager_amount: wager,
            balance_after: balance_before.clone(),
            balance_before,
            outcome: None,
            status: CycleStatus::Pending,
            interrupt_reason: None,
            void_reason: None,
        }
    }

    pub fn transition(&mut self, next: CycleStatus) -> Result<(), GameError> {
        if !self.status.can_transition_to(next) {
            return Err(GameError::InvalidState {
                cycle_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Fail with `InvalidState` unless the cycle is in `expected`.
    pub fn require(&self, expected: CycleStatus, wanted: CycleStatus) -> Result<(), GameError> {
        if self.status != expected {
            return Err(GameError::InvalidState {
                cycle_id: self.id.clone(),
                from: self.status,
                to: wanted,
            });
        }
        Ok(())
    }
}

/// Unresolved interrupted cycle as shown to operators and players
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptedGame {
    pub cycle_id: String,
    pub session_id: String,
    pub game_id: String,
    pub wager_amount: Money,
    pub interrupted_at: DateTime<Utc>,
    pub reason: Option<String>,
    /// Resumable only when the outcome was stored before the interruption.
    pub outcome_stored: bool,
}

impl From<&GameCycle> for InterruptedGame {
    fn from(cycle: &GameCycle) -> Self {
        Self {
            cycle_id: cycle.id.clone(),
            session_id: cycle.session_id.clone(),
            game_id: cycle.game_id.clone(),
            wager_amount: cycle.wager_amount.clone(),
            interrupted_at: cycle.updated_at,
            reason: cycle.interrupt_reason.clone(),
            outcome_stored: cycle.outcome.is_some(),
        }
    }
}

/// Game recall row: the stored outcome is returned verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecall {
    pub cycle_id: String,
    pub session_id: String,
    pub game_id: String,
    pub played_at: DateTime<Utc>,
    pub status: CycleStatus,
    pub wager_amount: Money,
    pub win_amount: Money,
    pub balance_before: Money,
    pub balance_after: Money,
    pub outcome: Option<serde_json::Value>,
}

impl From<GameCycle> for GameRecall {
    fn from(cycle: GameCycle) -> Self {
        Self {
            cycle_id: cycle.id,
            session_id: cycle.session_id,
            game_id: cycle.game_id,
            played_at: cycle.started_at,
            status: cycle.status,
            wager_amount: cycle.wager_amount,
            win_amount: cycle.win_amount,
            balance_before: cycle.balance_before,
            balance_after: cycle.balance_after,
            outcome: cycle.outcome.map(|o| o.payload),
        }
    }
}
