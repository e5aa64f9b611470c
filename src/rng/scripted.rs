//! Scripted draw source for deterministic evaluator and orchestrator tests

use super::{DrawSource, RngError};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Returns pre-recorded indices in order; fails with `EntropyUnavailable`
/// once the script runs out.
#[derive(Debug, Default)]
pub struct ScriptedDraws {
    script: Mutex<VecDeque<usize>>,
}

impl ScriptedDraws {
    pub fn new(draws: impl IntoIterator<Item = usize>) -> Self {
        Self {
            script: Mutex::new(draws.into_iter().collect()),
        }
    }

    /// A source that fails on the first draw.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn push(&self, draws: impl IntoIterator<Item = usize>) {
        if let Ok(mut script) = self.script.lock() {
            script.extend(draws);
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl DrawSource for ScriptedDraws {
    fn draw_index(&self, bound: usize) -> Result<usize, RngError> {
        let mut script = self
            .script
            .lock()
            .map_err(|_| RngError::EntropyUnavailable("script lock poisoned".to_string()))?;
        let next = script
            .pop_front()
            .ok_or_else(|| RngError::EntropyUnavailable("draw script exhausted".to_string()))?;
        if next >= bound {
            return Err(RngError::InvalidRange(format!(
                "scripted draw {} outside [0, {})",
                next, bound
            )));
        }
        Ok(next)
    }
}
