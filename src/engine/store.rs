//! Session and cycle persistence
//!
//! Key layout:
//! - `rgs:session:{id}` session row
//! - `rgs:cycle:{id}` cycle row
//! - `rgs:history:` | player | inv_started_millis(be) | cycle id, newest first
//! - `rgs:interrupted:` | player | cycle id, present while a cycle is interrupted
//!
//! Player segments are length-prefixed (`storage::owned_prefix`).

use super::cycle::{CycleStatus, GameCycle, GameSession};
use super::GameError;
use crate::errors::StorageError;
use crate::storage::{owned_prefix, KvStore, StoreBatch};

const SESSION_PREFIX: &str = "rgs:session:";
const CYCLE_PREFIX: &str = "rgs:cycle:";
const HISTORY_PREFIX: &str = "rgs:history:";
const INTERRUPTED_PREFIX: &str = "rgs:interrupted:";

fn session_key(session_id: &str) -> Vec<u8> {
    format!("{}{}", SESSION_PREFIX, session_id).into_bytes()
}

fn cycle_key(cycle_id: &str) -> Vec<u8> {
    format!("{}{}", CYCLE_PREFIX, cycle_id).into_bytes()
}

fn history_prefix(player_id: &str) -> Vec<u8> {
    owned_prefix(HISTORY_PREFIX, player_id)
}

fn history_key(cycle: &GameCycle) -> Vec<u8> {
    let inv_millis = u64::MAX - cycle.started_at.timestamp_millis().max(0) as u64;
    let mut key = history_prefix(&cycle.player_id);
    key.extend_from_slice(&inv_millis.to_be_bytes());
    key.extend_from_slice(cycle.id.as_bytes());
    key
}

fn interrupted_prefix(player_id: &str) -> Vec<u8> {
    owned_prefix(INTERRUPTED_PREFIX, player_id)
}

fn interrupted_key(cycle: &GameCycle) -> Vec<u8> {
    let mut key = interrupted_prefix(&cycle.player_id);
    key.extend_from_slice(cycle.id.as_bytes());
    key
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T, GameError> {
    serde_json::from_slice(bytes).map_err(|e| {
        GameError::Storage(StorageError::CorruptedData(format!(
            "Failed to decode {}: {}",
            what, e
        )))
    })
}

fn encode<T: serde::Serialize>(value: &T, what: &str) -> Result<Vec<u8>, GameError> {
    serde_json::to_vec(value).map_err(|e| {
        GameError::Storage(StorageError::WriteFailed(format!(
            "Failed to encode {}: {}",
            what, e
        )))
    })
}

pub fn load_session(store: &dyn KvStore, session_id: &str) -> Result<Option<GameSession>, GameError> {
    match store.get(&session_key(session_id))? {
        Some(bytes) => Ok(Some(decode(&bytes, "session")?)),
        None => Ok(None),
    }
}

pub fn load_cycle(store: &dyn KvStore, cycle_id: &str) -> Result<Option<GameCycle>, GameError> {
    match store.get(&cycle_key(cycle_id))? {
        Some(bytes) => Ok(Some(decode(&bytes, "cycle")?)),
        None => Ok(None),
    }
}

/// Newest first.
pub fn load_history(store: &dyn KvStore, player_id: &str, limit: usize) -> Result<Vec<GameCycle>, GameError> {
    let rows = store.scan_prefix(&history_prefix(player_id), limit)?;
    let mut cycles = Vec::with_capacity(rows.len());
    for (_, value) in rows {
        let cycle_id = String::from_utf8_lossy(&value);
        if let Some(cycle) = load_cycle(store, &cycle_id)? {
            cycles.push(cycle);
        }
    }
    Ok(cycles)
}

pub fn load_interrupted(store: &dyn KvStore, player_id: &str) -> Result<Vec<GameCycle>, GameError> {
    let rows = store.scan_prefix(&interrupted_prefix(player_id), usize::MAX)?;
    let mut cycles = Vec::with_capacity(rows.len());
    for (_, value) in rows {
        let cycle_id = String::from_utf8_lossy(&value);
        if let Some(cycle) = load_cycle(store, &cycle_id)? {
            if cycle.status == CycleStatus::Interrupted {
                cycles.push(cycle);
            }
        }
    }
    cycles.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
    Ok(cycles)
}

pub fn stage_session(batch: &mut StoreBatch, session: &GameSession) -> Result<(), GameError> {
    batch.put(session_key(&session.id), encode(session, "session")?);
    Ok(())
}

/// Cycle row plus its history and interrupted index entries.
pub fn stage_cycle(batch: &mut StoreBatch, cycle: &GameCycle) -> Result<(), GameError> {
    batch.put(cycle_key(&cycle.id), encode(cycle, "cycle")?);
    batch.put(history_key(cycle), cycle.id.as_bytes().to_vec());
    if cycle.status == CycleStatus::Interrupted {
        batch.put(interrupted_key(cycle), cycle.id.as_bytes().to_vec());
    } else {
        batch.delete(interrupted_key(cycle));
    }
    Ok(())
}

pub fn save_cycle(store: &dyn KvStore, cycle: &GameCycle) -> Result<(), GameError> {
    let mut batch = StoreBatch::new();
    stage_cycle(&mut batch, cycle)?;
    store.write_batch(batch)?;
    Ok(())
}

pub fn save_session(store: &dyn KvStore, session: &GameSession) -> Result<(), GameError> {
    let mut batch = StoreBatch::new();
    stage_session(&mut batch, session)?;
    store.write_batch(batch)?;
    Ok(())
}

/// Settled cycle and updated session totals in one write.
pub fn complete_cycle(store: &dyn KvStore, cycle: &GameCycle, session: &GameSession) -> Result<(), GameError> {
    let mut batch = StoreBatch::new();
    stage_cycle(&mut batch, cycle)?;
    stage_session(&mut batch, session)?;
    store.write_batch(batch)?;
    Ok(())
}
