//! Cache-aware HTTP client.
//!
//! [`CachedClient`] mirrors the transport's verbs. Each verb resolves cache
//! options for the call, then routes the uncached transport call through
//! the [`ReadThroughCache`]. Callers get the response payload decoded into
//! their own type.
//!
//! # Example
//!
//! ```ignore
//! let client = CachedClient::connect(ReqwestTransport::new(), RecallConfig::default()).await?;
//!
//! // First call hits the network, the second is served from the cache.
//! let todo: Todo = client.get("https://example.com/todos/1", &CacheOptions::new()).await?;
//! let again: Todo = client.get("https://example.com/todos/1", &CacheOptions::new()).await?;
//!
//! // Drop the entry so the next call refetches.
//! client.revalidate(["https://example.com/todos/1"]).await;
//! ```

use std::sync::Arc;

use recall_core::{
    resolve_cache_options, CacheOptions, DefaultCacheOptions, HttpRequest, HttpResponse, Method,
    RecallConfig, RecallError, RecallResult, ResolvedCacheOptions, Transport, TransportError,
};
use recall_storage::{StorageAdapter, StorageBackend};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::orchestrator::{CacheRead, ReadThroughCache};
use crate::stats::CacheStats;

/// An HTTP client whose responses are cached through a storage adapter.
pub struct CachedClient<T, A = StorageBackend> {
    transport: T,
    cache: ReadThroughCache<A>,
    defaults: DefaultCacheOptions,
}

impl<T> CachedClient<T, StorageBackend>
where
    T: Transport,
{
    /// Build a client whose storage backend is selected by `config`.
    ///
    /// Configuration problems fail here as [`recall_core::ConfigError`]:
    /// a missing URI or path, a backend this build lacks, or an external
    /// store that cannot be reached.
    pub async fn connect(transport: T, config: RecallConfig) -> RecallResult<Self> {
        config.validate()?;
        let defaults = config.default_cache_options;
        let backend = StorageBackend::connect(&config.storage, defaults.stale_time).await?;
        tracing::debug!(
            kind = %backend.kind(),
            namespace = backend.namespace(),
            "cached client ready"
        );
        Ok(Self::with_adapter(transport, backend, defaults))
    }
}

impl<T, A> CachedClient<T, A>
where
    T: Transport,
    A: StorageAdapter,
{
    /// Build a client over an existing adapter.
    pub fn with_adapter(transport: T, adapter: A, defaults: DefaultCacheOptions) -> Self {
        Self::with_shared_adapter(transport, Arc::new(adapter), defaults)
    }

    /// Build a client over an adapter that is also used elsewhere.
    pub fn with_shared_adapter(
        transport: T,
        adapter: Arc<A>,
        defaults: DefaultCacheOptions,
    ) -> Self {
        Self {
            transport,
            cache: ReadThroughCache::new(adapter),
            defaults,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn adapter(&self) -> &A {
        self.cache.adapter()
    }

    pub fn defaults(&self) -> &DefaultCacheOptions {
        &self.defaults
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn get<R>(&self, url: &str, options: &CacheOptions) -> RecallResult<R>
    where
        R: DeserializeOwned,
    {
        self.without_body(Method::Get, url, options).await
    }

    pub async fn delete<R>(&self, url: &str, options: &CacheOptions) -> RecallResult<R>
    where
        R: DeserializeOwned,
    {
        self.without_body(Method::Delete, url, options).await
    }

    pub async fn head<R>(&self, url: &str, options: &CacheOptions) -> RecallResult<R>
    where
        R: DeserializeOwned,
    {
        self.without_body(Method::Head, url, options).await
    }

    pub async fn options<R>(&self, url: &str, options: &CacheOptions) -> RecallResult<R>
    where
        R: DeserializeOwned,
    {
        self.without_body(Method::Options, url, options).await
    }

    /// POST `data` to `url`. The payload takes part in the cache key.
    pub async fn post<D, R>(
        &self,
        url: &str,
        data: Option<&D>,
        options: &CacheOptions,
    ) -> RecallResult<R>
    where
        D: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        self.with_body(Method::Post, url, data, options).await
    }

    pub async fn put<D, R>(
        &self,
        url: &str,
        data: Option<&D>,
        options: &CacheOptions,
    ) -> RecallResult<R>
    where
        D: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        self.with_body(Method::Put, url, data, options).await
    }

    pub async fn patch<D, R>(
        &self,
        url: &str,
        data: Option<&D>,
        options: &CacheOptions,
    ) -> RecallResult<R>
    where
        D: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        self.with_body(Method::Patch, url, data, options).await
    }

    /// Send a fully described request. The key is derived from its URL and
    /// body.
    pub async fn request<R>(&self, request: HttpRequest, options: &CacheOptions) -> RecallResult<R>
    where
        R: DeserializeOwned,
    {
        let resolved =
            resolve_cache_options(&self.defaults, &request.url, request.body.as_ref(), Some(options));
        self.send_cached(request, Ok(()), &resolved).await
    }

    /// Like [`CachedClient::request`], but returns the raw payload tagged
    /// with whether it came from the cache.
    pub async fn request_raw(
        &self,
        request: HttpRequest,
        options: &CacheOptions,
    ) -> RecallResult<CacheRead<Value>> {
        let resolved =
            resolve_cache_options(&self.defaults, &request.url, request.body.as_ref(), Some(options));
        self.fetch(request, Ok(()), &resolved).await
    }

    /// Remove each key from the cache. Failures are logged and the batch
    /// carries on.
    pub async fn revalidate<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        for key in keys {
            let key = key.as_ref();
            match self.adapter().remove_item(key).await {
                Ok(true) => tracing::debug!(key, "revalidated"),
                Ok(false) => tracing::warn!(key, "revalidate could not remove entry"),
                Err(err) => tracing::warn!(key, error = %err, "revalidate failed"),
            }
        }
    }

    /// Remove every entry in this client's namespace.
    pub async fn clear_cache(&self) -> RecallResult<bool> {
        Ok(self.adapter().clear().await?)
    }

    async fn without_body<R>(&self, method: Method, url: &str, options: &CacheOptions) -> RecallResult<R>
    where
        R: DeserializeOwned,
    {
        let resolved = resolve_cache_options::<Value>(&self.defaults, url, None, Some(options));
        self.send_cached(HttpRequest::new(method, url), Ok(()), &resolved)
            .await
    }

    async fn with_body<D, R>(
        &self,
        method: Method,
        url: &str,
        data: Option<&D>,
        options: &CacheOptions,
    ) -> RecallResult<R>
    where
        D: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let resolved = resolve_cache_options(&self.defaults, url, data, Some(options));

        let mut request = HttpRequest::new(method, url);
        // An unencodable body only fails the call if the transport is reached.
        let encoded = match data.map(serde_json::to_value).transpose() {
            Ok(body) => {
                request.body = body;
                Ok(())
            }
            Err(err) => Err(TransportError::InvalidBody {
                reason: err.to_string(),
            }),
        };

        self.send_cached(request, encoded, &resolved).await
    }

    async fn send_cached<R>(
        &self,
        request: HttpRequest,
        encoded: Result<(), TransportError>,
        resolved: &ResolvedCacheOptions,
    ) -> RecallResult<R>
    where
        R: DeserializeOwned,
    {
        let data = self.fetch(request, encoded, resolved).await?.into_value();
        serde_json::from_value(data).map_err(|err| RecallError::Decode {
            reason: err.to_string(),
        })
    }

    async fn fetch(
        &self,
        request: HttpRequest,
        encoded: Result<(), TransportError>,
        resolved: &ResolvedCacheOptions,
    ) -> RecallResult<CacheRead<Value>> {
        let transport = &self.transport;
        let read = self
            .cache
            .with_cache(resolved, move || async move {
                encoded?;
                transport
                    .send(request)
                    .await
                    .map(HttpResponse::into_data)
            })
            .await?;
        Ok(read)
    }
}

impl<T, A> std::fmt::Debug for CachedClient<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedClient")
            .field("defaults", &self.defaults)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
