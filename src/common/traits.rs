//! Collaborator interfaces consumed by the orchestrator and ledger
//!
//! Implementations live in `control`, `limits` and `audit`; tests swap in
//! their own.

use crate::audit::{AuditError, AuditEvent};
use crate::common::money::Money;
use crate::errors::ErrorCategory;
use async_trait::async_trait;
use thiserror::Error;

/// Reasons a player may not play a game right now
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessDenied {
    #[error("gaming is disabled: {reason}")]
    GamingDisabled { reason: String },

    #[error("game {0} is disabled")]
    GameDisabled(String),

    #[error("player {0} is disabled")]
    PlayerDisabled(String),
}

/// Regulator/operator kill switches checked before any ledger mutation.
#[async_trait]
pub trait AccessControl: Send + Sync {
    async fn check_access(&self, player_id: &str, game_id: &str) -> Result<(), AccessDenied>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitError {
    #[error("wager limit exceeded for {player_id}: requested {requested}, limit {limit}")]
    LimitExceeded {
        player_id: String,
        requested: Money,
        limit: Money,
    },
}

impl LimitError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Validation
    }
}

/// Responsible-gaming wager check. Limit bookkeeping is the implementor's.
#[async_trait]
pub trait WagerLimits: Send + Sync {
    async fn check_wager_limit(&self, player_id: &str, amount: &Money) -> Result<(), LimitError>;
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError>;
}
