//! API request and response models

use crate::{
    common::{money::Money, types::Transaction},
    engine::{GameRecall, InterruptedGame},
    games::GameDefinition,
    rng::HealthReport,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub gaming_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rng: Option<HealthReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamesResponse {
    pub games: Vec<GameDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionRequest {
    pub player_id: String,
    pub game_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayBody {
    /// Minor units
    pub wager_amount: i64,
    #[serde(default)]
    pub cycle_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRequest {
    /// Minor units
    pub amount: i64,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub player_id: String,
    pub real_money: Money,
    pub bonus: Money,
    pub available: Money,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionsResponse {
    pub player_id: String,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub player_id: String,
    pub history: Vec<GameRecall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptedResponse {
    pub player_id: String,
    pub games: Vec<InterruptedGame>,
}
