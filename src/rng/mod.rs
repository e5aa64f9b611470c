//! Random number engine
//!
//! Unbiased integers via rejection sampling, floats, Fisher-Yates shuffles
//! and weighted selection over a pluggable entropy source, plus a
//! chi-square self test. One mutex guards the source and the counters, so
//! every draw consumes a fresh slice of the stream.

pub mod entropy;
pub mod scripted;

pub use entropy::{EntropySource, OsEntropy, SeededEntropy};
pub use scripted::ScriptedDraws;

use crate::errors::ErrorCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, error};

/// 2^63 - 1, the size of the draw space after masking.
const MAX_63: u64 = i64::MAX as u64;

/// A working source rejects with probability < 1/2 per draw; a run this
/// long means the source is stuck.
const MAX_REJECTIONS: u32 = 128;

pub const HEALTH_SAMPLE_SIZE: usize = 1_000;
pub const HEALTH_BINS: usize = 100;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RngError {
    #[error("entropy unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    #[error("health check failed: chi-square {chi_square:.2} >= critical value {critical_value:.2}")]
    HealthCheckFailed { chi_square: f64, critical_value: f64 },
}

impl RngError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RngError::EntropyUnavailable(_) => ErrorCategory::Resource,
            RngError::InvalidRange(_) | RngError::InvalidWeights(_) => ErrorCategory::Validation,
            RngError::HealthCheckFailed { .. } => ErrorCategory::Integrity,
        }
    }
}

/// Result of a statistical self test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub timestamp: DateTime<Utc>,
    pub samples_generated: u64,
    pub chi_square: f64,
    pub critical_value: f64,
    pub chi_square_passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The only capability outcome evaluators get: a uniform index below `bound`.
pub trait DrawSource: Send + Sync {
    fn draw_index(&self, bound: usize) -> Result<usize, RngError>;
}

struct RngState {
    source: Box<dyn EntropySource>,
    samples_generated: u64,
    last_health_check: Option<DateTime<Utc>>,
}

pub struct RngEngine {
    state: Mutex<RngState>,
    source_name: &'static str,
}

impl RngEngine {
    pub fn new(source: Box<dyn EntropySource>) -> Self {
        let source_name = source.name();
        Self {
            state: Mutex::new(RngState {
                source,
                samples_generated: 0,
                last_health_check: None,
            }),
            source_name,
        }
    }

    /// Engine over the operating-system CSPRNG.
    pub fn os() -> Self {
        Self::new(Box::new(OsEntropy))
    }

    /// Reproducible engine for simulations and tests.
    pub fn seeded(seed: u64) -> Self {
        Self::new(Box::new(SeededEntropy::new(seed)))
    }

    pub fn source_name(&self) -> &'static str {
        self.source_name
    }

    fn lock(&self) -> Result<MutexGuard<'_, RngState>, RngError> {
        self.state
            .lock()
            .map_err(|_| RngError::EntropyUnavailable("rng state lock poisoned".to_string()))
    }

    pub fn bytes(&self, n: usize) -> Result<Vec<u8>, RngError> {
        let mut buf = vec![0u8; n];
        let mut state = self.lock()?;
        state.source.fill(&mut buf)?;
        Ok(buf)
    }

    /// Uniform integer in `[0, max)`.
    pub fn int(&self, max: i64) -> Result<i64, RngError> {
        if max <= 0 {
            return Err(RngError::InvalidRange(format!("max must be > 0, got {}", max)));
        }
        let max = max as u64;
        let threshold = (MAX_63 / max) * max;

        let mut state = self.lock()?;
        let mut buf = [0u8; 8];
        for _ in 0..MAX_REJECTIONS {
            state.source.fill(&mut buf)?;
            let n = u64::from_be_bytes(buf) & MAX_63;
            if n < threshold {
                state.samples_generated += 1;
                return Ok((n % max) as i64);
            }
        }

        error!("rejection sampling did not converge for max {}", max);
        Err(RngError::EntropyUnavailable(format!(
            "{} consecutive rejections for max {}",
            MAX_REJECTIONS, max
        )))
    }

    /// Uniform integer in `[lo, hi]`.
    pub fn int_range(&self, lo: i64, hi: i64) -> Result<i64, RngError> {
        if lo > hi {
            return Err(RngError::InvalidRange(format!("lo {} > hi {}", lo, hi)));
        }
        let span = hi as i128 - lo as i128 + 1;
        let span = i64::try_from(span)
            .map_err(|_| RngError::InvalidRange(format!("range [{}, {}] too wide", lo, hi)))?;
        Ok(lo + self.int(span)?)
    }

    /// Uniform float in `[0.0, 1.0)` with 53 bits of precision.
    pub fn float(&self) -> Result<f64, RngError> {
        const SCALE: i64 = 1 << 53;
        Ok(self.int(SCALE)? as f64 / SCALE as f64)
    }

    /// In-place Fisher-Yates.
    pub fn shuffle<T>(&self, items: &mut [T]) -> Result<(), RngError> {
        for i in (1..items.len()).rev() {
            let j = self.int(i as i64 + 1)? as usize;
            items.swap(i, j);
        }
        Ok(())
    }

    /// Index chosen with probability proportional to its weight.
    pub fn select_weighted(&self, weights: &[f64]) -> Result<usize, RngError> {
        if weights.is_empty() {
            return Err(RngError::InvalidWeights("no weights given".to_string()));
        }
        if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(RngError::InvalidWeights(format!("weight {} is not allowed", bad)));
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(RngError::InvalidWeights("total weight must be > 0".to_string()));
        }

        let r = self.float()? * total;
        let mut cumulative = 0.0;
        for (i, weight) in weights.iter().enumerate() {
            cumulative += weight;
            if r < cumulative {
                return Ok(i);
            }
        }

        // Float rounding can leave r == total; fall back to the last reachable index.
        weights
            .iter()
            .rposition(|w| *w > 0.0)
            .ok_or_else(|| RngError::InvalidWeights("no positive weight".to_string()))
    }

    pub fn samples_generated(&self) -> u64 {
        self.lock().map(|s| s.samples_generated).unwrap_or(0)
    }

    pub fn last_health_check(&self) -> Option<DateTime<Utc>> {
        self.lock().ok().and_then(|s| s.last_health_check)
    }

    /// Chi-square test over `HEALTH_SAMPLE_SIZE` draws in `[0, HEALTH_BINS)`.
    pub fn health_check(&self) -> HealthReport {
        self.health_check_with(HEALTH_SAMPLE_SIZE, HEALTH_BINS)
    }

    pub fn health_check_with(&self, sample_size: usize, bins: usize) -> HealthReport {
        let critical = critical_value(bins);
        let mut counts = vec![0u64; bins];
        let mut failure = None;

        for _ in 0..sample_size {
            match self.int(bins as i64) {
                Ok(value) => counts[value as usize] += 1,
                Err(e) => {
                    failure = Some(e.to_string());
                    break;
                }
            }
        }

        let timestamp = Utc::now();
        let (chi_square, passed) = match failure {
            Some(_) => (f64::INFINITY, false),
            None => {
                let chi = chi_square_statistic(&counts, sample_size as f64 / bins as f64);
                (chi, chi < critical)
            }
        };

        let samples_generated = match self.lock() {
            Ok(mut state) => {
                state.last_health_check = Some(timestamp);
                state.samples_generated
            }
            Err(_) => 0,
        };

        debug!(
            "rng health check: chi-square {:.2} (critical {:.2}) passed={}",
            chi_square, critical, passed
        );

        HealthReport {
            healthy: passed,
            timestamp,
            samples_generated,
            chi_square,
            critical_value: critical,
            chi_square_passed: passed,
            error: failure,
        }
    }

    /// Run the self test and turn a failure into an integrity error.
    pub fn ensure_healthy(&self) -> Result<HealthReport, RngError> {
        let report = self.health_check();
        if let Some(err) = &report.error {
            return Err(RngError::EntropyUnavailable(err.clone()));
        }
        if !report.healthy {
            return Err(RngError::HealthCheckFailed {
                chi_square: report.chi_square,
                critical_value: report.critical_value,
            });
        }
        Ok(report)
    }
}

impl DrawSource for RngEngine {
    fn draw_index(&self, bound: usize) -> Result<usize, RngError> {
        let bound = i64::try_from(bound)
            .map_err(|_| RngError::InvalidRange(format!("bound {} too large", bound)))?;
        Ok(self.int(bound)? as usize)
    }
}

/// Pearson chi-square statistic against a flat expectation.
pub fn chi_square_statistic(counts: &[u64], expected: f64) -> f64 {
    counts
        .iter()
        .map(|&observed| {
            let diff = observed as f64 - expected;
            diff * diff / expected
        })
        .sum()
}

/// 99% critical value for `bins - 1` degrees of freedom.
pub fn critical_value(bins: usize) -> f64 {
    if bins == 100 {
        return 134.6;
    }
    let df = bins.saturating_sub(1) as f64;
    df + 2.576 * (2.0 * df).sqrt()
}
