//! Error types for the remote game server core
//!
//! Every module owns its own error enum; `RgsError` aggregates them so
//! binaries and the API layer can deal with a single type. Each error can
//! report an `ErrorCategory` which drives HTTP mapping and escalation.

use crate::{
    audit::AuditError,
    common::{money::MoneyError, traits::{AccessDenied, LimitError}},
    engine::GameError,
    ledger::LedgerError,
    rng::RngError,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Broad error classes used for reporting and escalation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad input: never retried, never mutates state
    Validation,
    /// Insufficient funds or entropy
    Resource,
    /// Acting on a cycle or session in the wrong state
    State,
    /// Correctness violation; halts the operation and may disable gaming
    Integrity,
    /// Storage, serialization and other infrastructure failures
    System,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Resource => "resource",
            ErrorCategory::State => "state",
            ErrorCategory::Integrity => "integrity",
            ErrorCategory::System => "system",
        };
        f.write_str(name)
    }
}

/// Root error type for all core operations
#[derive(Debug, Error)]
pub enum RgsError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("RNG error: {0}")]
    Rng(#[from] RngError),

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Game error: {0}")]
    Game(#[from] GameError),

    #[error("Access denied: {0}")]
    Access(#[from] AccessDenied),

    #[error("Limit error: {0}")]
    Limit(#[from] LimitError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),
}

impl RgsError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RgsError::Configuration(_) => ErrorCategory::Validation,
            RgsError::Storage(_) => ErrorCategory::System,
            RgsError::Rng(e) => e.category(),
            RgsError::Money(e) => e.category(),
            RgsError::Ledger(e) => e.category(),
            RgsError::Game(e) => e.category(),
            RgsError::Access(_) => ErrorCategory::Validation,
            RgsError::Limit(e) => e.category(),
            RgsError::Audit(_) => ErrorCategory::System,
        }
    }

    pub fn is_integrity_failure(&self) -> bool {
        self.category() == ErrorCategory::Integrity
    }
}

/// Configuration and validation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue { field: String, value: String, reason: String },

    #[error("Load failed: {0}")]
    LoadFailed(String),

    #[error("Save failed: {0}")]
    SaveFailed(String),
}

/// Storage system errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),
}

impl From<rocksdb::Error> for StorageError {
    fn from(err: rocksdb::Error) -> Self {
        StorageError::WriteFailed(err.to_string())
    }
}

/// Convenience type alias for Results
pub type RgsResult<T> = Result<T, RgsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = RgsError::Configuration(ConfigurationError::ValidationFailed(
            "test error".to_string(),
        ));
        assert_eq!(
            error.to_string(),
            "Configuration error: Validation failed: test error"
        );
    }

    #[test]
    fn test_error_conversion() {
        let storage_error = StorageError::ReadFailed("disk gone".to_string());
        let error: RgsError = storage_error.into();
        assert!(matches!(error, RgsError::Storage(_)));
        assert_eq!(error.category(), ErrorCategory::System);
    }

    #[test]
    fn test_currency_mismatch_is_integrity_failure() {
        let error: RgsError = MoneyError::CurrencyMismatch {
            expected: "USD".to_string(),
            found: "EUR".to_string(),
        }
        .into();
        assert!(error.is_integrity_failure());
    }

    #[test]
    fn test_health_failure_is_integrity_failure() {
        let error: RgsError = RngError::HealthCheckFailed {
            chi_square: 500.0,
            critical_value: 134.6,
        }
        .into();
        assert!(error.is_integrity_failure());
        assert_eq!(error.category().to_string(), "integrity");
    }
}
