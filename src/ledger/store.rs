//! Ledger key layout and record encoding
//!
//! Balance rows, the per-player transaction log (newest first by inverted
//! version) and the cycle reference index. Every posting stages all three
//! into one batch.

use super::LedgerError;
use crate::common::types::{Balance, Transaction, TransactionType};
use crate::errors::StorageError;
use crate::storage::{owned_prefix, KvStore, StoreBatch};

pub const BALANCE_PREFIX: &str = "ledger:balance:";
const TX_PREFIX: &str = "ledger:tx:";
const REF_PREFIX: &str = "ledger:ref:";

pub fn balance_key(player_id: &str) -> Vec<u8> {
    format!("{}{}", BALANCE_PREFIX, player_id).into_bytes()
}

pub fn tx_log_prefix(player_id: &str) -> Vec<u8> {
    owned_prefix(TX_PREFIX, player_id)
}

fn tx_log_key(player_id: &str, version: u64) -> Vec<u8> {
    // prefix | inv_version(be) so a forward scan yields newest first
    let mut key = tx_log_prefix(player_id);
    key.extend_from_slice(&(u64::MAX - version).to_be_bytes());
    key
}

fn reference_key(reference: &str, tx_type: TransactionType) -> Vec<u8> {
    format!("{}{}:{}", REF_PREFIX, reference, tx_type.as_str()).into_bytes()
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T, LedgerError> {
    serde_json::from_slice(bytes).map_err(|e| {
        LedgerError::Storage(StorageError::CorruptedData(format!(
            "Failed to decode {}: {}",
            what, e
        )))
    })
}

fn encode<T: serde::Serialize>(value: &T, what: &str) -> Result<Vec<u8>, LedgerError> {
    serde_json::to_vec(value).map_err(|e| {
        LedgerError::Storage(StorageError::WriteFailed(format!(
            "Failed to encode {}: {}",
            what, e
        )))
    })
}

pub fn load_balance(store: &dyn KvStore, player_id: &str) -> Result<Option<Balance>, LedgerError> {
    match store.get(&balance_key(player_id))? {
        Some(bytes) => Ok(Some(decode(&bytes, "balance")?)),
        None => Ok(None),
    }
}

pub fn load_all_balances(store: &dyn KvStore, limit: usize) -> Result<Vec<Balance>, LedgerError> {
    store
        .scan_prefix(BALANCE_PREFIX.as_bytes(), limit)?
        .into_iter()
        .map(|(_, bytes)| decode(&bytes, "balance"))
        .collect()
}

pub fn load_reference(
    store: &dyn KvStore,
    reference: &str,
    tx_type: TransactionType,
) -> Result<Option<Transaction>, LedgerError> {
    match store.get(&reference_key(reference, tx_type))? {
        Some(bytes) => Ok(Some(decode(&bytes, "reference")?)),
        None => Ok(None),
    }
}

/// Newest first.
pub fn load_transactions(
    store: &dyn KvStore,
    player_id: &str,
    limit: usize,
) -> Result<Vec<Transaction>, LedgerError> {
    store
        .scan_prefix(&tx_log_prefix(player_id), limit)?
        .into_iter()
        .map(|(_, bytes)| decode(&bytes, "transaction"))
        .collect()
}

pub fn stage_balance(batch: &mut StoreBatch, balance: &Balance) -> Result<(), LedgerError> {
    batch.put(balance_key(&balance.player_id), encode(balance, "balance")?);
    Ok(())
}

/// Balance row, log entry and (for cycle postings) the reference index.
pub fn stage_posting(
    batch: &mut StoreBatch,
    balance: &Balance,
    tx: &Transaction,
) -> Result<(), LedgerError> {
    stage_balance(batch, balance)?;
    let tx_bytes = encode(tx, "transaction")?;
    if tx.tx_type.is_cycle_linked() && !tx.reference.is_empty() {
        batch.put(reference_key(&tx.reference, tx.tx_type), tx_bytes.clone());
    }
    batch.put(tx_log_key(&balance.player_id, balance.version), tx_bytes);
    Ok(())
}
