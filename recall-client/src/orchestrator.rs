//! Read-through / write-back around an arbitrary async call.
//!
//! For one call, with caching enabled and a key resolved:
//!
//! 1. A fresh record under the key is returned as-is; the call never runs.
//! 2. Otherwise the call runs.
//! 3. A successful result is written back under the key before it is
//!    returned. The write outcome never changes what the caller sees.
//! 4. A failed call propagates unchanged and nothing is written.
//!
//! Concurrent misses on the same key are not coalesced: each runs the call
//! and each writes, last write wins.

use std::future::Future;
use std::sync::Arc;

use recall_core::ResolvedCacheOptions;
use recall_storage::StorageAdapter;
use serde::{de::DeserializeOwned, Serialize};

use crate::stats::{CacheStats, StatsRecorder};

/// A value produced by [`ReadThroughCache::with_cache`], tagged with where
/// it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<T> {
    value: T,
    was_cache_hit: bool,
}

impl<T> CacheRead<T> {
    /// A value served from the cache.
    pub fn from_cache(value: T) -> Self {
        Self {
            value,
            was_cache_hit: true,
        }
    }

    /// A value produced by running the underlying call.
    pub fn from_call(value: T) -> Self {
        Self {
            value,
            was_cache_hit: false,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            was_cache_hit: self.was_cache_hit,
        }
    }
}

/// Read-through cache over a shared storage adapter.
pub struct ReadThroughCache<A> {
    adapter: Arc<A>,
    stats: StatsRecorder,
}

impl<A> ReadThroughCache<A>
where
    A: StorageAdapter,
{
    pub fn new(adapter: Arc<A>) -> Self {
        Self {
            adapter,
            stats: StatsRecorder::default(),
        }
    }

    /// Get a reference to the storage adapter.
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// A shared handle to the storage adapter.
    pub fn shared_adapter(&self) -> Arc<A> {
        Arc::clone(&self.adapter)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Run `call` behind the cache as described by `resolved`.
    ///
    /// Adapter read failures count as a miss. Adapter write failures are
    /// logged and counted; the call's value is returned regardless.
    pub async fn with_cache<T, E, F, Fut>(
        &self,
        resolved: &ResolvedCacheOptions,
        call: F,
    ) -> Result<CacheRead<T>, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(key) = resolved.active_key() else {
            self.stats.bypass();
            return call().await.map(CacheRead::from_call);
        };

        match self.adapter.get_item::<T>(key).await {
            Ok(Some(value)) => {
                tracing::debug!(key, "cache hit");
                self.stats.hit();
                return Ok(CacheRead::from_cache(value));
            }
            Ok(None) => tracing::debug!(key, "cache miss"),
            Err(err) => tracing::warn!(key, error = %err, "cache read failed, treating as miss"),
        }
        self.stats.miss();

        let value = call().await?;

        let accepted = match self
            .adapter
            .set_item(key, &value, Some(resolved.stale_time))
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!(key, "cache write was not persisted");
                false
            }
            Err(err) => {
                tracing::warn!(key, error = %err, "cache write failed");
                false
            }
        };
        self.stats.write(accepted);

        Ok(CacheRead::from_call(value))
    }
}

impl<A> std::fmt::Debug for ReadThroughCache<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadThroughCache")
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::{StaleTime, TransportError};
    use recall_storage::MemoryAdapter;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn resolved(key: &str) -> ResolvedCacheOptions {
        ResolvedCacheOptions {
            key: Some(key.to_string()),
            use_cache: true,
            stale_time: StaleTime::from_secs(60),
        }
    }

    fn cache() -> ReadThroughCache<MemoryAdapter> {
        ReadThroughCache::new(Arc::new(MemoryAdapter::new("test", StaleTime::Never)))
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let cache = cache();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let call = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TransportError>(json!({"id": 1}))
        };

        let first = cache.with_cache(&resolved("/todos/1"), call).await.unwrap();
        let second = cache.with_cache(&resolved("/todos/1"), call).await.unwrap();

        assert!(!first.was_cache_hit());
        assert!(second.was_cache_hit());
        assert_eq!(second.into_value(), json!({"id": 1}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().writes, 1);
    }

    #[tokio::test]
    async fn test_failed_call_is_not_written() {
        let cache = cache();
        let err = cache
            .with_cache(&resolved("/boom"), || async {
                Err::<Value, _>(TransportError::Timeout)
            })
            .await
            .unwrap_err();

        assert_eq!(err, TransportError::Timeout);
        assert!(cache.adapter().is_empty());
        assert_eq!(cache.stats().writes, 0);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_runs_the_call() {
        let cache = cache();
        let options = ResolvedCacheOptions {
            use_cache: false,
            ..resolved("/todos/1")
        };
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let call = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TransportError>(json!(1))
        };

        cache.with_cache(&options, call).await.unwrap();
        cache.with_cache(&options, call).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.adapter().is_empty());
        assert_eq!(cache.stats().bypassed, 2);
    }

    #[tokio::test]
    async fn test_missing_key_bypasses_cache() {
        let cache = cache();
        let options = ResolvedCacheOptions {
            key: None,
            use_cache: true,
            stale_time: StaleTime::Never,
        };

        let read = cache
            .with_cache(&options, || async { Ok::<_, TransportError>(json!("x")) })
            .await
            .unwrap();

        assert!(!read.was_cache_hit());
        assert!(cache.adapter().is_empty());
    }

    #[tokio::test]
    async fn test_cached_null_is_a_hit() {
        let cache = cache();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let call = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TransportError>(Value::Null)
        };

        cache.with_cache(&resolved("/empty"), call).await.unwrap();
        let read = cache.with_cache(&resolved("/empty"), call).await.unwrap();

        assert!(read.was_cache_hit());
        assert_eq!(read.into_value(), Value::Null);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cache_read_map_keeps_origin() {
        let read = CacheRead::from_cache(2).map(|v| v * 10);
        assert!(read.was_cache_hit());
        assert_eq!(*read.value(), 20);
    }
}
