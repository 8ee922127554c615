// Database - RocksDB handle shared by the peer collection and block store
use rocksdb::{Options, DB};
use std::path::Path;
use std::sync::Arc;

use crate::config::StoreConfig;

/// Cloneable handle around a RocksDB instance
///
/// The handle is opened once by the caller and injected into every store;
/// dropping the last clone closes the database.
#[derive(Clone)]
pub struct Database {
    db: Arc<DB>,
}

impl Database {
    /// Open or create a database with default tuning
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        Self::open_with(path, &StoreConfig::default())
    }

    /// Open or create a database tuned by `config`
    pub fn open_with<P: AsRef<Path>>(path: P, config: &StoreConfig) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(config.max_open_files);
        opts.set_keep_log_file_num(config.keep_log_file_num);
        opts.set_max_manifest_file_size(64 * 1024 * 1024);
        opts.set_max_background_jobs(2);
        opts.set_recycle_log_file_num(2);

        let db = DB::open(&opts, path).map_err(|e| StorageError::OpenFailed(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.db
            .get(key)
            .map_err(|e| StorageError::ReadFailed(e.to_string()))
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.db
            .put(key, value)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))
    }

    pub fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.db
            .delete(key)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))
    }

    pub fn exists(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }

    /// Apply all operations atomically
    pub fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StorageError> {
        let mut batch = rocksdb::WriteBatch::default();

        for op in ops {
            match op {
                WriteOp::Put { key, value } => batch.put(&key, &value),
                WriteOp::Delete { key } => batch.delete(&key),
            }
        }

        self.db
            .write(batch)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))
    }

    /// Iterate over every key starting with `prefix`, in key order
    ///
    /// Read errors are surfaced per item so callers decide whether to abort.
    pub fn prefix_iterator<'a>(
        &'a self,
        prefix: &'a [u8],
    ) -> impl Iterator<Item = Result<(Vec<u8>, Vec<u8>), StorageError>> + 'a {
        self.prefix_iterator_from(prefix, prefix)
    }

    /// Like [`prefix_iterator`](Self::prefix_iterator), starting at `start`
    /// instead of the first key of the prefix
    pub fn prefix_iterator_from<'a>(
        &'a self,
        prefix: &'a [u8],
        start: &[u8],
    ) -> impl Iterator<Item = Result<(Vec<u8>, Vec<u8>), StorageError>> + 'a {
        self.db
            .iterator(rocksdb::IteratorMode::From(start, rocksdb::Direction::Forward))
            .map(|item| {
                item.map(|(key, value)| (key.to_vec(), value.to_vec()))
                    .map_err(|e| StorageError::ReadFailed(e.to_string()))
            })
            .take_while(move |result| match result {
                Ok((key, _)) => key.starts_with(prefix),
                Err(_) => true,
            })
    }

    /// Flush memtables to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db
            .flush()
            .map_err(|e| StorageError::WriteFailed(e.to_string()))
    }
}

/// Single write inside an atomic batch
#[derive(Debug, Clone)]
pub enum WriteOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// Storage engine errors, passed through the registry unwrapped
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to open database: {0}")]
    OpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    #[error("Duplicate key for unique index {index}")]
    DuplicateKey { index: String },

    #[error("Index {name} already exists with a different definition")]
    IndexConflict { name: String },
}

impl StorageError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StorageError::DuplicateKey { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_database_basic_ops() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open(temp_dir.path()).unwrap();

        db.put(b"key1", b"value1").unwrap();
        assert_eq!(db.get(b"key1").unwrap(), Some(b"value1".to_vec()));

        assert!(db.exists(b"key1").unwrap());
        assert!(!db.exists(b"key2").unwrap());

        db.delete(b"key1").unwrap();
        assert!(!db.exists(b"key1").unwrap());
    }

    #[test]
    fn test_database_batch() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open(temp_dir.path()).unwrap();
        db.put(b"stale", b"x").unwrap();

        let ops = vec![
            WriteOp::Put {
                key: b"key1".to_vec(),
                value: b"value1".to_vec(),
            },
            WriteOp::Put {
                key: b"key2".to_vec(),
                value: b"value2".to_vec(),
            },
            WriteOp::Delete {
                key: b"stale".to_vec(),
            },
        ];

        db.batch_write(ops).unwrap();

        assert!(db.exists(b"key1").unwrap());
        assert!(db.exists(b"key2").unwrap());
        assert!(!db.exists(b"stale").unwrap());
    }

    #[test]
    fn test_prefix_iterator_stops_at_prefix_end() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open(temp_dir.path()).unwrap();

        db.put(b"a:1", b"1").unwrap();
        db.put(b"b:1", b"2").unwrap();
        db.put(b"b:2", b"3").unwrap();
        db.put(b"c:1", b"4").unwrap();

        let keys: Vec<Vec<u8>> = db
            .prefix_iterator(b"b:")
            .map(|item| item.unwrap().0)
            .collect();
        assert_eq!(keys, vec![b"b:1".to_vec(), b"b:2".to_vec()]);

        let from_second: Vec<Vec<u8>> = db
            .prefix_iterator_from(b"b:", b"b:15")
            .map(|item| item.unwrap().0)
            .collect();
        assert_eq!(from_second, vec![b"b:2".to_vec()]);
    }
}
