//! Raw key-value storage on RocksDB
//!
//! Untyped bytes in, bytes out. Typed records and the settlement
//! transaction scope live in [`crate::store`].

use crate::config::{CompressionType, StorageConfig};
use crate::errors::{StorageError, StorageResult};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;

/// One mutation inside an atomic batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

#[derive(Clone)]
pub struct OptimizedStorage {
    db: Arc<DB>,
}

impl OptimizedStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::open(path.as_ref(), &StorageConfig::default())
    }

    /// Open the database described by `config`, wiping it first when
    /// `clear_on_start` is set
    pub fn new_with_config(config: &StorageConfig) -> StorageResult<Self> {
        let path = Path::new(&config.data_directory);
        if config.clear_on_start && path.exists() {
            std::fs::remove_dir_all(path).map_err(|e| {
                StorageError::DatabaseOpenFailed(format!(
                    "Failed to clear {}: {}",
                    config.data_directory, e
                ))
            })?;
        }
        Self::open(path, config)
    }

    fn open(path: &Path, config: &StorageConfig) -> StorageResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size_mb * 1024 * 1024);
        opts.set_max_write_buffer_number(config.max_write_buffer_number as i32);
        opts.set_compression_type(match config.compression_type {
            CompressionType::None => rocksdb::DBCompressionType::None,
            CompressionType::Snappy => rocksdb::DBCompressionType::Snappy,
            CompressionType::Lz4 => rocksdb::DBCompressionType::Lz4,
            CompressionType::Zstd => rocksdb::DBCompressionType::Zstd,
        });

        let db = DB::open(&opts, path)
            .map_err(|e| StorageError::DatabaseOpenFailed(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.db
            .get(key)
            .map_err(|e| StorageError::ReadFailed(e.to_string()))
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.db.put(key, value)?;
        Ok(())
    }

    /// Apply every operation atomically: all of them land or none do
    pub fn apply_batch(&self, ops: &[BatchOp]) -> StorageResult<()> {
        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                BatchOp::Put(key, value) => batch.put(key, value),
                BatchOp::Delete(key) => batch.delete(key),
            }
        }
        self.db.write(batch)?;
        Ok(())
    }

    /// Forward scan of keys under `prefix`, starting strictly after `after`
    pub fn scan_prefix(
        &self,
        prefix: &[u8],
        after: Option<&[u8]>,
        limit: usize,
    ) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let start = after.unwrap_or(prefix);
        let iter = self.db.iterator(IteratorMode::From(start, Direction::Forward));

        let mut rows = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            if after.map_or(false, |a| &key[..] == a) {
                continue;
            }
            rows.push((key.to_vec(), value.to_vec()));
            if rows.len() >= limit {
                break;
            }
        }
        Ok(rows)
    }

    /// Backward scan of keys under `prefix`, highest key first
    pub fn scan_prefix_rev(
        &self,
        prefix: &[u8],
        limit: usize,
    ) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let upper = prefix_upper_bound(prefix);
        let iter = self.db.iterator(IteratorMode::From(upper.as_slice(), Direction::Reverse));

        let mut rows = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if &key[..] >= upper.as_slice() {
                continue;
            }
            if !key.starts_with(prefix) {
                break;
            }
            rows.push((key.to_vec(), value.to_vec()));
            if rows.len() >= limit {
                break;
            }
        }
        Ok(rows)
    }

    /// Highest key stored under `prefix`
    pub fn last_key_with_prefix(&self, prefix: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .scan_prefix_rev(prefix, 1)?
            .into_iter()
            .next()
            .map(|(key, _)| key))
    }
}

/// `prefix` followed by 17 0xFF bytes. Bounds every key carrying at most
/// 16 bytes after the prefix, which covers the one or two u64 ids used here.
fn prefix_upper_bound(prefix: &[u8]) -> Vec<u8> {
    let mut upper = prefix.to_vec();
    upper.extend_from_slice(&[0xFF; 17]);
    upper
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_storage() -> (tempfile::TempDir, OptimizedStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = OptimizedStorage::new(dir.path()).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_apply_batch_and_get() {
        let (_dir, storage) = temp_storage();
        storage.put(b"a:0", b"stale").unwrap();
        storage
            .apply_batch(&[
                BatchOp::Put(b"a:1".to_vec(), b"one".to_vec()),
                BatchOp::Put(b"a:2".to_vec(), b"two".to_vec()),
                BatchOp::Delete(b"a:0".to_vec()),
            ])
            .unwrap();

        assert_eq!(storage.get(b"a:1").unwrap(), Some(b"one".to_vec()));
        assert_eq!(storage.get(b"a:0").unwrap(), None);
        assert_eq!(storage.get(b"a:3").unwrap(), None);
    }

    #[test]
    fn test_prefix_scans() {
        let (_dir, storage) = temp_storage();
        for key in [b"a:1", b"a:2", b"a:3", b"b:1"] {
            storage.put(key, b"").unwrap();
        }

        let forward = storage.scan_prefix(b"a:", None, 10).unwrap();
        assert_eq!(forward.len(), 3);
        assert_eq!(forward[0].0, b"a:1".to_vec());

        let after = storage.scan_prefix(b"a:", Some(&b"a:1"[..]), 10).unwrap();
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].0, b"a:2".to_vec());

        let backward = storage.scan_prefix_rev(b"a:", 2).unwrap();
        assert_eq!(backward[0].0, b"a:3".to_vec());
        assert_eq!(backward[1].0, b"a:2".to_vec());

        assert_eq!(storage.last_key_with_prefix(b"b:").unwrap(), Some(b"b:1".to_vec()));
        assert_eq!(storage.last_key_with_prefix(b"c:").unwrap(), None);
    }

    #[test]
    fn test_reverse_scan_reaches_two_max_ids() {
        let (_dir, storage) = temp_storage();
        let mut largest = b"p:".to_vec();
        largest.extend_from_slice(&u64::MAX.to_be_bytes());
        largest.extend_from_slice(&u64::MAX.to_be_bytes());
        let mut smaller = b"p:".to_vec();
        smaller.extend_from_slice(&1u64.to_be_bytes());
        storage.put(&smaller, b"").unwrap();
        storage.put(&largest, b"").unwrap();
        storage.put(b"q:", b"").unwrap();

        assert_eq!(storage.last_key_with_prefix(b"p:").unwrap(), Some(largest));
        assert!(prefix_upper_bound(b"p:") > b"p:".iter().copied().chain([0xFF; 16]).collect::<Vec<u8>>());
    }
}
