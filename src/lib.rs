//! RGS Core - regulated game outcome and settlement engine
//!
//! Certified RNG, reel-slot outcome evaluation, a double-entry style player
//! ledger and the game cycle orchestrator that binds them: every play is
//! debit wager, determine outcome, credit win, with interrupted cycles
//! recoverable by resume or void.

pub mod api;
pub mod audit;
pub mod common;
pub mod config;
pub mod control;
pub mod engine;
pub mod errors;
pub mod games;
pub mod integrity;
pub mod ledger;
pub mod limits;
pub mod metrics;
pub mod rng;
pub mod services;
pub mod storage;

pub use common::{Balance, Money, Transaction, TransactionType};
pub use config::{ConfigLoader, RgsConfig};
pub use engine::{CycleStatus, GameCycle, GameEngine, GameError, GameSession, PlayRequest, PlayResult};
pub use errors::{RgsError, RgsResult};
pub use games::{GameCatalog, ReelSlotEvaluator, SlotOutcome, Symbol};
pub use ledger::{Ledger, LedgerError};
pub use rng::{RngEngine, RngError};
pub use services::ServiceContainer;
pub use storage::{KvStore, MemoryStorage, OptimizedStorage};
