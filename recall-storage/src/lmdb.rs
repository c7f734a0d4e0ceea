//! LMDB-backed durable store.
//!
//! Uses the heed crate (Rust bindings for LMDB). One environment is opened
//! when the adapter is built and held for its whole lifetime; dropping the
//! last adapter sharing that environment closes it.
//!
//! # Layout
//!
//! Each namespace is its own named database inside the environment, keyed
//! by the 8-character hash of the logical key. `clear` empties only that
//! database.
//!
//! # Transactions
//!
//! Every operation runs inside a single short read or write transaction.
//! Transactions are opened and committed synchronously and never held across
//! an `.await`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use recall_core::{
    hash_key, system_clock, CacheRecord, Clock, StaleTime, StorageError, StorageResult,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::adapter::StorageAdapter;

/// Maximum number of namespaces (named databases) per environment.
pub const MAX_NAMESPACES: u32 = 32;

/// Error type for LMDB operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// The requested map size does not fit in `usize` bytes.
    #[error("Map size of {0} MB overflows usize")]
    MapSize(usize),

    /// Failed to open the namespace database.
    #[error("Failed to open database {namespace}: {reason}")]
    DbOpen { namespace: String, reason: String },

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<heed::Error> for LmdbError {
    fn from(e: heed::Error) -> Self {
        LmdbError::Transaction(e.to_string())
    }
}

impl From<LmdbError> for StorageError {
    fn from(e: LmdbError) -> Self {
        match e {
            LmdbError::EnvOpen(reason) => StorageError::Unavailable { reason },
            map_size @ LmdbError::MapSize(_) => StorageError::Unavailable {
                reason: map_size.to_string(),
            },
            LmdbError::Io(io) => StorageError::Unavailable {
                reason: io.to_string(),
            },
            other => StorageError::TransactionFailed {
                reason: other.to_string(),
            },
        }
    }
}

/// LMDB storage adapter.
///
/// # Example
///
/// ```ignore
/// use recall_storage::{LmdbAdapter, StorageAdapter};
/// use recall_core::StaleTime;
///
/// let adapter = LmdbAdapter::open("/var/cache/recall", 64, "api", StaleTime::from_secs(300))?;
/// adapter.set_item("/todos/1", &todo, None).await?;
/// ```
pub struct LmdbAdapter {
    env: Env,
    db: Database<Str, Bytes>,
    namespace: String,
    default_stale_time: StaleTime,
    clock: Arc<dyn Clock>,
}

impl LmdbAdapter {
    /// Open (or create) an LMDB environment at `path` and the database for
    /// `namespace` inside it.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_size_mb` overflows when converted to bytes,
    /// the directory cannot be created, the environment
    /// cannot be opened, or the namespace database cannot be created.
    pub fn open<P: AsRef<Path>>(
        path: P,
        max_size_mb: usize,
        namespace: impl Into<String>,
        default_stale_time: StaleTime,
    ) -> Result<Self, LmdbError> {
        let map_size = max_size_mb
            .checked_mul(1024 * 1024)
            .ok_or(LmdbError::MapSize(max_size_mb))?;
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per adapter tree and the
        // files are not modified outside LMDB while it is open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_NAMESPACES)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbError::EnvOpen(e.to_string()))?;

        Self::from_env(env, namespace.into(), default_stale_time, system_clock())
    }

    /// An adapter for another namespace in the same environment.
    ///
    /// The new adapter keeps this adapter's default staleness window and
    /// clock.
    pub fn sibling(&self, namespace: impl Into<String>) -> Result<Self, LmdbError> {
        Self::from_env(
            self.env.clone(),
            namespace.into(),
            self.default_stale_time,
            Arc::clone(&self.clock),
        )
    }

    fn from_env(
        env: Env,
        namespace: String,
        default_stale_time: StaleTime,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LmdbError> {
        let mut wtxn = env.write_txn()?;
        let db: Database<Str, Bytes> = env
            .create_database(&mut wtxn, Some(namespace.as_str()))
            .map_err(|e| LmdbError::DbOpen {
                namespace: namespace.clone(),
                reason: e.to_string(),
            })?;
        wtxn.commit()?;

        Ok(Self {
            env,
            db,
            namespace,
            default_stale_time,
            clock,
        })
    }

    /// Replace the clock used to stamp and age records.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Number of records (fresh or not) in this namespace.
    pub fn len(&self) -> Result<u64, LmdbError> {
        let rtxn = self.env.read_txn()?;
        Ok(self.db.len(&rtxn)?)
    }

    pub fn is_empty(&self) -> Result<bool, LmdbError> {
        Ok(self.len()? == 0)
    }

    /// Store raw bytes under a logical key, bypassing record encoding.
    #[doc(hidden)]
    pub fn put_raw(&self, key: &str, bytes: &[u8]) -> Result<(), LmdbError> {
        self.write_raw(&hash_key(key), bytes)
    }

    fn read_raw(&self, physical: &str) -> Result<Option<Vec<u8>>, LmdbError> {
        let rtxn = self.env.read_txn()?;
        Ok(self.db.get(&rtxn, physical)?.map(<[u8]>::to_vec))
    }

    fn write_raw(&self, physical: &str, bytes: &[u8]) -> Result<(), LmdbError> {
        let mut wtxn = self.env.write_txn()?;
        self.db.put(&mut wtxn, physical, bytes)?;
        wtxn.commit()?;
        Ok(())
    }

    fn delete_raw(&self, physical: &str) -> Result<bool, LmdbError> {
        let mut wtxn = self.env.write_txn()?;
        let deleted = self.db.delete(&mut wtxn, physical)?;
        wtxn.commit()?;
        Ok(deleted)
    }

    /// Delete `physical` only if it still holds `expected`.
    fn delete_if_unchanged(&self, physical: &str, expected: &[u8]) -> Result<bool, LmdbError> {
        let mut wtxn = self.env.write_txn()?;
        let unchanged = self.db.get(&wtxn, physical)? == Some(expected);
        let deleted = unchanged && self.db.delete(&mut wtxn, physical)?;
        wtxn.commit()?;
        Ok(deleted)
    }

    fn clear_all(&self) -> Result<(), LmdbError> {
        let mut wtxn = self.env.write_txn()?;
        self.db.clear(&mut wtxn)?;
        wtxn.commit()?;
        Ok(())
    }

    fn evict(&self, physical: &str, raw: &[u8]) {
        if let Err(err) = self.delete_if_unchanged(physical, raw) {
            tracing::warn!(namespace = %self.namespace, key = physical, error = %err, "lmdb eviction failed");
        }
    }
}

impl std::fmt::Debug for LmdbAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbAdapter")
            .field("namespace", &self.namespace)
            .field("default_stale_time", &self.default_stale_time)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StorageAdapter for LmdbAdapter {
    async fn get_item<T>(&self, key: &str) -> StorageResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let physical = hash_key(key);

        let raw = match self.read_raw(&physical) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(None),
            Err(err) => {
                tracing::warn!(namespace = %self.namespace, key = %physical, error = %err, "lmdb read failed, treating as miss");
                return Ok(None);
            }
        };

        match CacheRecord::<T>::decode(&raw) {
            Ok(record) if !record.is_stale_at(self.clock.now_millis()) => {
                Ok(Some(record.into_value()))
            }
            Ok(_) => {
                tracing::debug!(namespace = %self.namespace, key = %physical, "evicting stale record");
                self.evict(&physical, &raw);
                Ok(None)
            }
            Err(err) => {
                tracing::warn!(namespace = %self.namespace, key = %physical, error = %err, "evicting corrupt record");
                self.evict(&physical, &raw);
                Ok(None)
            }
        }
    }

    async fn set_item<T>(
        &self,
        key: &str,
        value: &T,
        stale_time: Option<StaleTime>,
    ) -> StorageResult<bool>
    where
        T: Serialize + Sync,
    {
        let physical = hash_key(key);
        let record = CacheRecord::new(
            value,
            self.clock.now_millis(),
            stale_time.unwrap_or(self.default_stale_time),
        );

        let bytes = match record.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(namespace = %self.namespace, key = %physical, error = %err, "failed to serialize record");
                return Ok(false);
            }
        };

        match self.write_raw(&physical, &bytes) {
            Ok(()) => Ok(true),
            Err(err) => {
                tracing::warn!(namespace = %self.namespace, key = %physical, error = %err, "lmdb write failed");
                Ok(false)
            }
        }
    }

    async fn remove_item(&self, key: &str) -> StorageResult<bool> {
        let physical = hash_key(key);
        match self.delete_raw(&physical) {
            Ok(_) => Ok(true),
            Err(err) => {
                tracing::warn!(namespace = %self.namespace, key = %physical, error = %err, "lmdb delete failed");
                Ok(false)
            }
        }
    }

    async fn clear(&self) -> StorageResult<bool> {
        match self.clear_all() {
            Ok(()) => Ok(true),
            Err(err) => {
                tracing::warn!(namespace = %self.namespace, error = %err, "lmdb clear failed");
                Ok(false)
            }
        }
    }
}
