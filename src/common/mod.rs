//! Common utilities and shared functionality
//!
//! Money arithmetic, ledger record types, collaborator traits and the
//! keyed lock table shared by the ledger and the orchestrator.

pub mod locks;
pub mod money;
pub mod traits;
pub mod types;

pub use money::{Money, MoneyError};
pub use types::{Balance, Transaction, TransactionStatus, TransactionType};
