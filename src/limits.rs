//! Wager limit checks
//!
//! Limit bookkeeping (deposit/loss/session limits, self exclusion) belongs to
//! the responsible-gaming service. The core only needs the single-wager
//! check, so two small implementations live here.

use crate::common::money::Money;
use crate::common::traits::{LimitError, WagerLimits};
use async_trait::async_trait;
use dashmap::DashMap;

/// Accepts every wager.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWagerLimits;

#[async_trait]
impl WagerLimits for NoWagerLimits {
    async fn check_wager_limit(&self, _player_id: &str, _amount: &Money) -> Result<(), LimitError> {
        Ok(())
    }
}

/// Per-player cap on a single wager.
#[derive(Debug, Default)]
pub struct PerWagerCaps {
    caps: DashMap<String, Money>,
}

impl PerWagerCaps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cap(&self, player_id: &str, cap: Money) {
        self.caps.insert(player_id.to_string(), cap);
    }

    pub fn clear_cap(&self, player_id: &str) {
        self.caps.remove(player_id);
    }
}

#[async_trait]
impl WagerLimits for PerWagerCaps {
    async fn check_wager_limit(&self, player_id: &str, amount: &Money) -> Result<(), LimitError> {
        let Some(cap) = self.caps.get(player_id).map(|c| c.clone()) else {
            return Ok(());
        };
        if amount.currency != cap.currency || amount.amount > cap.amount {
            return Err(LimitError::LimitExceeded {
                player_id: player_id.to_string(),
                requested: amount.clone(),
                limit: cap,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_limits() {
        assert!(NoWagerLimits
            .check_wager_limit("p1", &Money::new(i64::MAX, "USD"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_per_wager_cap() {
        let caps = PerWagerCaps::new();
        caps.set_cap("p1", Money::new(1_000, "USD"));

        assert!(caps.check_wager_limit("p1", &Money::new(1_000, "USD")).await.is_ok());
        let err = caps
            .check_wager_limit("p1", &Money::new(1_001, "USD"))
            .await
            .unwrap_err();
        assert!(matches!(err, LimitError::LimitExceeded { .. }));
        assert!(caps.check_wager_limit("p2", &Money::new(1_001, "USD")).await.is_ok());

        caps.clear_cap("p1");
        assert!(caps.check_wager_limit("p1", &Money::new(1_001, "USD")).await.is_ok());
    }
}
