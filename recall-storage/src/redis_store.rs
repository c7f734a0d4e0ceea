//! Redis-backed external store.
//!
//! Records are stored as their JSON encoding under `"{namespace}:{hash}"`.
//! Bounded records also get a Redis expiry one millisecond past their
//! staleness window, so Redis never drops a record that is still fresh while
//! expired records do not linger. The record's own timestamp remains the
//! authority for staleness.
//!
//! A single [`ConnectionManager`] is created at construction and cloned per
//! operation; it reconnects on its own after transient failures.
//!
//! A server that cannot be reached at construction is a configuration error,
//! the same as a malformed URI. After construction, connection-level failures
//! (refused, dropped, timed out, I/O) surface as [`StorageError::Unavailable`].
//! Every other Redis error is absorbed.

use std::sync::Arc;

use async_trait::async_trait;
use recall_core::{
    system_clock, CacheRecord, Clock, ConfigError, RecallResult, StaleTime, StorageError,
    StorageResult,
};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, RedisResult};
use serde::{de::DeserializeOwned, Serialize};

use crate::adapter::StorageAdapter;
use crate::keys::{namespace_prefix, scoped_key};

/// Keys requested per `SCAN` round trip during `clear`.
const SCAN_BATCH: usize = 200;

/// Redis storage adapter.
#[derive(Clone)]
pub struct RedisAdapter {
    manager: ConnectionManager,
    namespace: String,
    default_stale_time: StaleTime,
    clock: Arc<dyn Clock>,
}

impl RedisAdapter {
    /// Connect to the Redis server at `uri`.
    ///
    /// # Errors
    ///
    /// A malformed URI or a server that cannot be reached is
    /// [`ConfigError::InvalidValue`] on `external_uri`.
    pub async fn connect(
        uri: &str,
        namespace: impl Into<String>,
        default_stale_time: StaleTime,
    ) -> RecallResult<Self> {
        let client = redis::Client::open(uri).map_err(|e| ConfigError::InvalidValue {
            field: "external_uri".to_string(),
            value: uri.to_string(),
            reason: e.to_string(),
        })?;

        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| ConfigError::InvalidValue {
                field: "external_uri".to_string(),
                value: uri.to_string(),
                reason: format!("endpoint unreachable: {e}"),
            })?;

        let namespace = namespace.into();
        tracing::debug!(namespace = %namespace, "connected to redis");

        Ok(Self {
            manager,
            namespace,
            default_stale_time,
            clock: system_clock(),
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

    /// The physical key a logical key is stored under.
    pub fn physical_key(&self, key: &str) -> String {
        scoped_key(&self.namespace, key)
    }

    /// Map a Redis error to the adapter's failure model.
    fn absorb<T>(&self, op: &'static str, key: &str, err: RedisError, fallback: T) -> StorageResult<T> {
        if is_unreachable(&err) {
            return Err(StorageError::Unavailable {
                reason: err.to_string(),
            });
        }
        tracing::warn!(op, namespace = %self.namespace, key, error = %err, "redis operation failed");
        Ok(fallback)
    }

    async fn evict(&self, physical: &str) {
        let mut conn = self.manager.clone();
        let result: RedisResult<i64> = conn.del(physical).await;
        if let Err(err) = result {
            tracing::warn!(namespace = %self.namespace, key = physical, error = %err, "redis eviction failed");
        }
    }
}

impl std::fmt::Debug for RedisAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisAdapter")
            .field("namespace", &self.namespace)
            .field("default_stale_time", &self.default_stale_time)
            .finish_non_exhaustive()
    }
}

fn is_unreachable(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout()
}

/// Redis `PX` expiry for a staleness window, if any.
fn expiry_millis(stale_time: StaleTime) -> Option<u64> {
    stale_time.as_millis().map(|window| window.saturating_add(1))
}

#[async_trait]
impl StorageAdapter for RedisAdapter {
    async fn get_item<T>(&self, key: &str) -> StorageResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let physical = self.physical_key(key);
        let mut conn = self.manager.clone();

        let raw: Option<String> = match conn.get(&physical).await {
            Ok(raw) => raw,
            Err(err) => return self.absorb("get", &physical, err, None),
        };
        let Some(raw) = raw else {
            return Ok(None);
        };

        match CacheRecord::<T>::decode(raw.as_bytes()) {
            Ok(record) if !record.is_stale_at(self.clock.now_millis()) => {
                Ok(Some(record.into_value()))
            }
            Ok(_) => {
                tracing::debug!(key = %physical, "evicting stale record");
                self.evict(&physical).await;
                Ok(None)
            }
            Err(err) => {
                tracing::warn!(key = %physical, error = %err, "evicting corrupt record");
                self.evict(&physical).await;
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
        let physical = self.physical_key(key);
        let stale_time = stale_time.unwrap_or(self.default_stale_time);
        let record = CacheRecord::new(value, self.clock.now_millis(), stale_time);

        let encoded = match serde_json::to_string(&record) {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::warn!(key = %physical, error = %err, "failed to serialize record");
                return Ok(false);
            }
        };

        let mut cmd = redis::cmd("SET");
        cmd.arg(&physical).arg(encoded);
        if let Some(px) = expiry_millis(stale_time) {
            cmd.arg("PX").arg(px);
        }

        let mut conn = self.manager.clone();
        let result: RedisResult<()> = cmd.query_async(&mut conn).await;
        match result {
            Ok(()) => Ok(true),
            Err(err) => self.absorb("set", &physical, err, false),
        }
    }

    async fn remove_item(&self, key: &str) -> StorageResult<bool> {
        let physical = self.physical_key(key);
        let mut conn = self.manager.clone();
        let result: RedisResult<i64> = conn.del(&physical).await;
        match result {
            Ok(_) => Ok(true),
            Err(err) => self.absorb("remove", &physical, err, false),
        }
    }

    async fn clear(&self) -> StorageResult<bool> {
        let pattern = format!("{}*", namespace_prefix(&self.namespace));
        let mut conn = self.manager.clone();
        let mut cursor: u64 = 0;

        loop {
            let scanned: RedisResult<(u64, Vec<String>)> = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await;
            let (next, keys) = match scanned {
                Ok(page) => page,
                Err(err) => return self.absorb("clear", &pattern, err, false),
            };

            if !keys.is_empty() {
                let deleted: RedisResult<i64> = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await;
                if let Err(err) = deleted {
                    return self.absorb("clear", &pattern, err, false);
                }
            }

            if next == 0 {
                return Ok(true);
            }
            cursor = next;
        }
    }
}
