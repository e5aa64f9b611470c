use crate::common::money::Money;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported game families
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Slots,
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameType::Slots => write!(f, "slots"),
        }
    }
}

/// Catalog entry describing a playable game and its stake bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameDefinition {
    pub id: String,
    pub name: String,
    pub game_type: GameType,
    /// Declared paytable RTP, certified out of band
    pub theoretical_rtp: f64,
    pub min_bet: Money,
    pub max_bet: Money,
    pub enabled: bool,
}

impl GameDefinition {
    pub fn accepts_wager(&self, wager: &Money) -> bool {
        wager.currency == self.min_bet.currency
            && wager.amount >= self.min_bet.amount
            && wager.amount <= self.max_bet.amount
    }
}
