//! Key-value storage layer
//!
//! RocksDB in production, an in-memory B-tree for tests and development.
//! All multi-key writes go through `StoreBatch` and are applied atomically.

use crate::config::{CompressionType, StorageBackend, StorageConfig};
use crate::errors::StorageError;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// `namespace | len(owner) as u32 be | owner`
///
/// Scan prefix for rows owned by one id. The length prefix keeps free-text
/// ids from matching each other, so `alice` never scans into `alice:x`.
pub fn owned_prefix(namespace: &str, owner: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(namespace.len() + 4 + owner.len());
    key.extend_from_slice(namespace.as_bytes());
    key.extend_from_slice(&(owner.len() as u32).to_be_bytes());
    key.extend_from_slice(owner.as_bytes());
    key
}

/// Ordered set of writes applied as one unit
#[derive(Debug, Clone, Default)]
pub struct StoreBatch {
    ops: Vec<BatchOp>,
}

impl StoreBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Put(key.into(), value.into()));
        self
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Delete(key.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    fn write_batch(&self, batch: StoreBatch) -> Result<(), StorageError>;

    /// Entries whose key starts with `prefix`, in key order, at most `limit`.
    fn scan_prefix(&self, prefix: &[u8], limit: usize) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let mut batch = StoreBatch::new();
        batch.put(key, value);
        self.write_batch(batch)
    }
}

/// Open the backend selected in configuration.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn KvStore>, StorageError> {
    match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory storage");
            Ok(Arc::new(MemoryStorage::new()))
        }
        StorageBackend::RocksDb => {
            if config.clear_on_start && Path::new(&config.data_directory).exists() {
                std::fs::remove_dir_all(&config.data_directory).map_err(|e| {
                    StorageError::DatabaseOpenFailed(format!(
                        "Failed to clear {}: {}",
                        config.data_directory, e
                    ))
                })?;
            }
            info!("Opening RocksDB at {}", config.data_directory);
            Ok(Arc::new(OptimizedStorage::open(&config.data_directory, config)?))
        }
    }
}

/// RocksDB-backed store
#[derive(Clone)]
pub struct OptimizedStorage {
    db: Arc<DB>,
}

impl OptimizedStorage {
    pub fn open<P: AsRef<Path>>(path: P, config: &StorageConfig) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size_mb * 1024 * 1024);
        opts.set_max_write_buffer_number(config.max_write_buffer_number);
        opts.set_compression_type(match config.compression {
            CompressionType::None => rocksdb::DBCompressionType::None,
            CompressionType::Snappy => rocksdb::DBCompressionType::Snappy,
            CompressionType::Lz4 => rocksdb::DBCompressionType::Lz4,
            CompressionType::Zstd => rocksdb::DBCompressionType::Zstd,
        });

        let db = DB::open(&opts, path)
            .map_err(|e| StorageError::DatabaseOpenFailed(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Open read-only for offline inspection tools.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let opts = Options::default();
        let db = DB::open_for_read_only(&opts, path, false)
            .map_err(|e| StorageError::DatabaseOpenFailed(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }
}

impl KvStore for OptimizedStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.db
            .get(key)
            .map_err(|e| StorageError::ReadFailed(e.to_string()))
    }

    fn write_batch(&self, batch: StoreBatch) -> Result<(), StorageError> {
        let mut wb = WriteBatch::default();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(key, value) => wb.put(key, value),
                BatchOp::Delete(key) => wb.delete(key),
            }
        }
        self.db.write(wb)?;
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8], limit: usize) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut rows = Vec::new();
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix) || rows.len() >= limit {
                break;
            }
            rows.push((key.to_vec(), value.to_vec()));
        }
        Ok(rows)
    }
}

/// In-memory store; a batch is applied under a single write lock.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned(what: &str) -> StorageError {
    StorageError::CorruptedData(format!("memory store lock poisoned during {}", what))
}

impl KvStore for MemoryStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let data = self.data.read().map_err(|_| poisoned("read"))?;
        Ok(data.get(key).cloned())
    }

    fn write_batch(&self, batch: StoreBatch) -> Result<(), StorageError> {
        let mut data = self.data.write().map_err(|_| poisoned("write"))?;
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(key, value) => {
                    data.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8], limit: usize) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let data = self.data.read().map_err(|_| poisoned("scan"))?;
        Ok(data
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
