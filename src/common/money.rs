//! Integer money in minor currency units

use crate::errors::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch { expected: String, found: String },

    #[error("amount overflow")]
    Overflow,
}

impl MoneyError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Integrity
    }
}

/// An amount in minor units (cents) tagged with an ISO currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub amount: i64,
    pub currency: String,
}

impl Money {
    pub fn new(amount: i64, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }

    pub fn zero(currency: impl Into<String>) -> Self {
        Self::new(0, currency)
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    pub fn is_positive(&self) -> bool {
        self.amount > 0
    }

    pub fn is_negative(&self) -> bool {
        self.amount < 0
    }

    pub fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                expected: self.currency.clone(),
                found: other.currency.clone(),
            });
        }
        Ok(())
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount, self.currency.clone()))
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount, self.currency.clone()))
    }

    /// `self * numerator / denominator`, truncated toward zero.
    pub fn scale(&self, numerator: i64, denominator: i64) -> Result<Money, MoneyError> {
        if denominator == 0 {
            return Err(MoneyError::Overflow);
        }
        let scaled = (self.amount as i128 * numerator as i128) / denominator as i128;
        let amount = i64::try_from(scaled).map_err(|_| MoneyError::Overflow)?;
        Ok(Money::new(amount, self.currency.clone()))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.amount < 0 { "-" } else { "" };
        let abs = self.amount.unsigned_abs();
        write!(f, "{}{}.{:02} {}", sign, abs / 100, abs % 100, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_sub_same_currency() {
        let a = Money::new(1_000, "USD");
        let b = Money::new(250, "USD");
        assert_eq!(a.checked_add(&b).unwrap(), Money::new(1_250, "USD"));
        assert_eq!(a.checked_sub(&b).unwrap(), Money::new(750, "USD"));
        assert_eq!(b.checked_sub(&a).unwrap().amount, -750);
    }

    #[test]
    fn test_currency_mismatch() {
        let usd = Money::new(100, "USD");
        let eur = Money::new(100, "EUR");
        assert_eq!(
            usd.checked_add(&eur),
            Err(MoneyError::CurrencyMismatch {
                expected: "USD".to_string(),
                found: "EUR".to_string(),
            })
        );
        assert!(usd.checked_sub(&eur).is_err());
    }

    #[test]
    fn test_overflow_is_reported() {
        let max = Money::new(i64::MAX, "USD");
        assert_eq!(max.checked_add(&Money::new(1, "USD")), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_scale_truncates() {
        let wager = Money::new(500, "USD");
        assert_eq!(wager.scale(5000, 100).unwrap().amount, 25_000);

        let odd = Money::new(15, "USD");
        // 15 * 10 / 100 = 1.5 -> 1
        assert_eq!(odd.scale(10, 100).unwrap().amount, 1);
        assert!(odd.scale(1, 0).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::new(100_000, "USD").to_string(), "1000.00 USD");
        assert_eq!(Money::new(-5, "EUR").to_string(), "-0.05 EUR");
    }
}
