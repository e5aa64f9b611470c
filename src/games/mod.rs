//! Games: catalog, outcome capability traits and evaluators
//!
//! The orchestrator never inspects an outcome's shape. It asks the
//! evaluator for a boxed `Outcome`, reads the multiplier and win flag, and
//! stores the serialized payload verbatim.

pub mod simulation;
pub mod slots;
pub mod types;

pub use slots::{ReelSlotEvaluator, SlotOutcome, Symbol};
pub use types::{GameDefinition, GameType};

use crate::common::money::{Money, MoneyError};
use crate::errors::ConfigurationError;
use crate::rng::{DrawSource, RngError};
use dashmap::DashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::info;

/// A produced game result
pub trait Outcome: Send + Sync + Debug {
    fn is_win(&self) -> bool;

    /// Sum of fired paytable values, per unit stake.
    fn total_multiplier(&self) -> i64;

    fn to_value(&self) -> Result<serde_json::Value, serde_json::Error>;

    fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.to_value()?)
    }
}

/// Turns draws into an outcome. Must not see history or player identity.
pub trait OutcomeEvaluator: Send + Sync {
    fn game_type(&self) -> GameType;

    fn evaluate(&self, draws: &dyn DrawSource) -> Result<Box<dyn Outcome>, RngError>;
}

/// `wager * multiplier / unit_stake`, truncated.
pub fn calculate_win(total_multiplier: i64, wager: &Money, unit_stake: i64) -> Result<Money, MoneyError> {
    wager.scale(total_multiplier, unit_stake)
}

#[derive(Clone)]
struct CatalogEntry {
    definition: GameDefinition,
    evaluator: Arc<dyn OutcomeEvaluator>,
}

/// Registered games keyed by id
pub struct GameCatalog {
    games: DashMap<String, CatalogEntry>,
    min_rtp: f64,
}

impl GameCatalog {
    pub fn new(min_rtp: f64) -> Self {
        Self {
            games: DashMap::new(),
            min_rtp,
        }
    }

    /// Catalog with the built-in reel games priced in `currency`.
    pub fn with_default_games(currency: &str, min_rtp: f64) -> Result<Self, ConfigurationError> {
        let catalog = Self::new(min_rtp);
        let classic: Arc<dyn OutcomeEvaluator> = Arc::new(ReelSlotEvaluator::classic());

        catalog.register(
            GameDefinition {
                id: "fortune-slots".to_string(),
                name: "Fortune Slots".to_string(),
                game_type: GameType::Slots,
                theoretical_rtp: 0.96,
                min_bet: Money::new(10, currency),
                max_bet: Money::new(10_000, currency),
                enabled: true,
            },
            classic.clone(),
        )?;
        catalog.register(
            GameDefinition {
                id: "lucky-sevens".to_string(),
                name: "Lucky Sevens".to_string(),
                game_type: GameType::Slots,
                theoretical_rtp: 0.94,
                min_bet: Money::new(25, currency),
                max_bet: Money::new(5_000, currency),
                enabled: true,
            },
            classic,
        )?;
        Ok(catalog)
    }

    pub fn register(
        &self,
        definition: GameDefinition,
        evaluator: Arc<dyn OutcomeEvaluator>,
    ) -> Result<(), ConfigurationError> {
        if definition.theoretical_rtp < self.min_rtp || definition.theoretical_rtp > 1.0 {
            return Err(ConfigurationError::InvalidValue {
                field: format!("{}.theoretical_rtp", definition.id),
                value: definition.theoretical_rtp.to_string(),
                reason: format!("must be within [{}, 1.0]", self.min_rtp),
            });
        }
        definition
            .min_bet
            .ensure_same_currency(&definition.max_bet)
            .map_err(|e| ConfigurationError::ValidationFailed(e.to_string()))?;
        if definition.min_bet.amount <= 0 || definition.min_bet.amount > definition.max_bet.amount {
            return Err(ConfigurationError::InvalidValue {
                field: format!("{}.min_bet", definition.id),
                value: definition.min_bet.amount.to_string(),
                reason: "must be > 0 and <= max_bet".to_string(),
            });
        }
        if evaluator.game_type() != definition.game_type {
            return Err(ConfigurationError::ValidationFailed(format!(
                "{}: evaluator is {} but game is {}",
                definition.id,
                evaluator.game_type(),
                definition.game_type
            )));
        }

        info!("Registered game {} ({})", definition.id, definition.name);
        self.games.insert(
            definition.id.clone(),
            CatalogEntry {
                definition,
                evaluator,
            },
        );
        Ok(())
    }

    pub fn get(&self, game_id: &str) -> Option<GameDefinition> {
        self.games.get(game_id).map(|e| e.definition.clone())
    }

    pub fn evaluator(&self, game_id: &str) -> Option<Arc<dyn OutcomeEvaluator>> {
        self.games.get(game_id).map(|e| e.evaluator.clone())
    }

    /// All games sorted by id.
    pub fn list(&self) -> Vec<GameDefinition> {
        let mut games: Vec<_> = self.games.iter().map(|e| e.definition.clone()).collect();
        games.sort_by(|a, b| a.id.cmp(&b.id));
        games
    }

    /// Returns false when the game is unknown.
    pub fn set_enabled(&self, game_id: &str, enabled: bool) -> bool {
        match self.games.get_mut(game_id) {
            Some(mut entry) => {
                entry.definition.enabled = enabled;
                true
            }
            None => false,
        }
    }
}
