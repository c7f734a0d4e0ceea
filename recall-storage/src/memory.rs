//! Process-local in-memory backend.
//!
//! Records are kept as their persisted JSON text in a map that can be
//! shared between several adapters. Each adapter only sees keys under its
//! own namespace prefix, so `clear` on one leaves the others intact.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use recall_core::{system_clock, CacheRecord, Clock, StaleTime, StorageResult, DEFAULT_NAMESPACE};
use serde::{de::DeserializeOwned, Serialize};

use crate::adapter::StorageAdapter;
use crate::keys::{namespace_prefix, scoped_key};

/// The physical map behind one or more [`MemoryAdapter`]s.
pub type SharedMemoryStore = Arc<RwLock<HashMap<String, String>>>;

/// In-memory storage adapter.
pub struct MemoryAdapter {
    store: SharedMemoryStore,
    namespace: String,
    default_stale_time: StaleTime,
    clock: Arc<dyn Clock>,
}

impl MemoryAdapter {
    /// Create an adapter over a fresh, private map.
    pub fn new(namespace: impl Into<String>, default_stale_time: StaleTime) -> Self {
        Self::with_store(SharedMemoryStore::default(), namespace, default_stale_time)
    }

    /// Create an adapter over an existing map, possibly shared with other
    /// namespaces.
    pub fn with_store(
        store: SharedMemoryStore,
        namespace: impl Into<String>,
        default_stale_time: StaleTime,
    ) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            default_stale_time,
            clock: system_clock(),
        }
    }

    /// Replace the clock used to stamp and age records.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The underlying map.
    pub fn store(&self) -> &SharedMemoryStore {
        &self.store
    }

    /// The physical key a logical key is stored under.
    pub fn physical_key(&self, key: &str) -> String {
        scoped_key(&self.namespace, key)
    }

    /// Number of records (fresh or not) in this namespace.
    pub fn len(&self) -> usize {
        let prefix = namespace_prefix(&self.namespace);
        self.store
            .read()
            .map(|map| map.keys().filter(|k| k.starts_with(&prefix)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove `physical` only if it still holds `expected`, so a concurrent
    /// writer's fresh record survives a lazy eviction.
    fn evict_if_unchanged(&self, physical: &str, expected: &str) {
        match self.store.write() {
            Ok(mut map) => {
                if map.get(physical).map(String::as_str) == Some(expected) {
                    map.remove(physical);
                }
            }
            Err(_) => tracing::warn!(key = physical, "memory store lock poisoned during eviction"),
        }
    }
}

impl std::fmt::Debug for MemoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAdapter")
            .field("namespace", &self.namespace)
            .field("default_stale_time", &self.default_stale_time)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn get_item<T>(&self, key: &str) -> StorageResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let physical = self.physical_key(key);

        let raw = match self.store.read() {
            Ok(map) => map.get(&physical).cloned(),
            Err(_) => {
                tracing::warn!(key = %physical, "memory store lock poisoned, treating as miss");
                return Ok(None);
            }
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
                self.evict_if_unchanged(&physical, &raw);
                Ok(None)
            }
            Err(err) => {
                tracing::warn!(key = %physical, error = %err, "evicting corrupt record");
                self.evict_if_unchanged(&physical, &raw);
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
        let record = CacheRecord::new(
            value,
            self.clock.now_millis(),
            stale_time.unwrap_or(self.default_stale_time),
        );

        let encoded = match serde_json::to_string(&record) {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::warn!(key = %physical, error = %err, "failed to serialize record");
                return Ok(false);
            }
        };

        match self.store.write() {
            Ok(mut map) => {
                map.insert(physical, encoded);
                Ok(true)
            }
            Err(_) => {
                tracing::warn!(key = %physical, "memory store lock poisoned, write dropped");
                Ok(false)
            }
        }
    }

    async fn remove_item(&self, key: &str) -> StorageResult<bool> {
        let physical = self.physical_key(key);
        match self.store.write() {
            Ok(mut map) => {
                map.remove(&physical);
                Ok(true)
            }
            Err(_) => {
                tracing::warn!(key = %physical, "memory store lock poisoned, remove dropped");
                Ok(false)
            }
        }
    }

    async fn clear(&self) -> StorageResult<bool> {
        let prefix = namespace_prefix(&self.namespace);
        match self.store.write() {
            Ok(mut map) => {
                map.retain(|k, _| !k.starts_with(&prefix));
                Ok(true)
            }
            Err(_) => {
                tracing::warn!(namespace = %self.namespace, "memory store lock poisoned, clear dropped");
                Ok(false)
            }
        }
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE, recall_core::DEFAULT_STALE_TIME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::ManualClock;
    use serde_json::{json, Value};

    fn adapter_at(start: i64) -> (MemoryAdapter, ManualClock) {
        let clock = ManualClock::new(start);
        let adapter = MemoryAdapter::new("test", StaleTime::from_secs(60))
            .with_clock(Arc::new(clock.clone()));
        (adapter, clock)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (adapter, _clock) = adapter_at(0);
        assert!(adapter.set_item("/todos/1", &json!({"id": 1}), None).await.unwrap());
        let value: Option<Value> = adapter.get_item("/todos/1").await.unwrap();
        assert_eq!(value, Some(json!({"id": 1})));
    }

    #[tokio::test]
    async fn test_missing_key_is_absent() {
        let (adapter, _clock) = adapter_at(0);
        let value: Option<Value> = adapter.get_item("/nothing").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_stale_boundary_and_eviction() {
        let (adapter, clock) = adapter_at(1_000);
        adapter
            .set_item("k", &"v", Some(StaleTime::from_millis(500)))
            .await
            .unwrap();

        clock.set(1_500);
        assert_eq!(adapter.get_item::<String>("k").await.unwrap().as_deref(), Some("v"));

        clock.set(1_501);
        assert_eq!(adapter.get_item::<String>("k").await.unwrap(), None);
        assert!(adapter.is_empty(), "stale record should be gone from the store");
    }

    #[tokio::test]
    async fn test_never_stale_survives_any_elapsed_time() {
        let (adapter, clock) = adapter_at(0);
        adapter.set_item("k", &7, Some(StaleTime::Never)).await.unwrap();
        assert_eq!(adapter.get_item::<i32>("k").await.unwrap(), Some(7));
        clock.set(i64::MAX / 2);
        assert_eq!(adapter.get_item::<i32>("k").await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_default_stale_time_applies() {
        let (adapter, clock) = adapter_at(0);
        adapter.set_item("k", &1, None).await.unwrap();
        clock.set(60_000);
        assert_eq!(adapter.get_item::<i32>("k").await.unwrap(), Some(1));
        clock.set(60_001);
        assert_eq!(adapter.get_item::<i32>("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite_resets_timestamp() {
        let (adapter, clock) = adapter_at(0);
        adapter.set_item("k", &"old", Some(StaleTime::from_millis(100))).await.unwrap();
        clock.set(90);
        adapter.set_item("k", &"new", Some(StaleTime::from_millis(100))).await.unwrap();
        clock.set(150);
        assert_eq!(adapter.get_item::<String>("k").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_corrupt_record_is_removed() {
        let (adapter, _clock) = adapter_at(0);
        let physical = adapter.physical_key("k");
        adapter
            .store()
            .write()
            .unwrap()
            .insert(physical.clone(), "{not json".to_string());

        assert_eq!(adapter.get_item::<Value>("k").await.unwrap(), None);
        assert!(!adapter.store().read().unwrap().contains_key(&physical));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (adapter, _clock) = adapter_at(0);
        adapter.set_item("k", &1, None).await.unwrap();
        assert!(adapter.remove_item("k").await.unwrap());
        assert!(adapter.remove_item("k").await.unwrap());
        assert_eq!(adapter.get_item::<i32>("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_is_scoped_to_namespace() {
        let store = SharedMemoryStore::default();
        let a = MemoryAdapter::with_store(store.clone(), "a", StaleTime::Never);
        let b = MemoryAdapter::with_store(store.clone(), "b", StaleTime::Never);
        store
            .write()
            .unwrap()
            .insert("unrelated".to_string(), "keep me".to_string());

        a.set_item("k", &1, None).await.unwrap();
        b.set_item("k", &2, None).await.unwrap();

        assert!(a.clear().await.unwrap());
        assert_eq!(a.get_item::<i32>("k").await.unwrap(), None);
        assert_eq!(b.get_item::<i32>("k").await.unwrap(), Some(2));
        assert!(store.read().unwrap().contains_key("unrelated"));
    }
}
