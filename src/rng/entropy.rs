//! Entropy sources behind the RNG engine

use super::RngError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_core::{OsRng, RngCore};

/// Raw byte source. Called with the engine lock held.
pub trait EntropySource: Send {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), RngError>;

    fn name(&self) -> &'static str;
}

/// Operating-system CSPRNG. Read failures are surfaced, never papered over.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), RngError> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| RngError::EntropyUnavailable(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "os"
    }
}

/// Deterministic stream for simulations and tests. Not for real-money play.
pub struct SeededEntropy {
    rng: StdRng,
}

impl SeededEntropy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl EntropySource for SeededEntropy {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), RngError> {
        self.rng.fill_bytes(buf);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "seeded"
    }
}
