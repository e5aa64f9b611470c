//! Monte Carlo RTP simulation
//!
//! Spins an evaluator repeatedly at one unit stake and reports hit rate and
//! empirical return. Used by the `rtp-sim` tool and by paytable tests.

use super::OutcomeEvaluator;
use crate::rng::{DrawSource, RngError};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub spins: u64,
    pub hits: u64,
    pub hit_rate: f64,
    pub total_staked: i64,
    pub total_returned: i64,
    pub rtp: f64,
    pub largest_multiplier: i64,
    pub elapsed: Duration,
}

impl SimulationReport {
    pub fn spins_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.spins as f64 / secs
        } else {
            0.0
        }
    }
}

pub fn simulate_rtp(
    evaluator: &dyn OutcomeEvaluator,
    draws: &dyn DrawSource,
    spins: u64,
    unit_stake: i64,
) -> Result<SimulationReport, RngError> {
    let start = Instant::now();
    let mut hits = 0u64;
    let mut total_returned = 0i64;
    let mut largest_multiplier = 0i64;

    for _ in 0..spins {
        let outcome = evaluator.evaluate(draws)?;
        let multiplier = outcome.total_multiplier();
        if outcome.is_win() {
            hits += 1;
        }
        total_returned = total_returned.saturating_add(multiplier);
        largest_multiplier = largest_multiplier.max(multiplier);
    }

    let total_staked = unit_stake.saturating_mul(spins as i64);
    let hit_rate = if spins > 0 { hits as f64 / spins as f64 } else { 0.0 };
    let rtp = if total_staked > 0 {
        total_returned as f64 / total_staked as f64
    } else {
        0.0
    };

    Ok(SimulationReport {
        spins,
        hits,
        hit_rate,
        total_staked,
        total_returned,
        rtp,
        largest_multiplier,
        elapsed: start.elapsed(),
    })
}
