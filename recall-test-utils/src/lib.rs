//! Recall Test Utilities
//!
//! Shared test infrastructure for the recall workspace:
//! - Mock transport and a storage adapter that fails on demand
//! - Proptest generators for payloads and options
//! - Test fixtures for common scenarios
//! - Custom assertions for recall-specific errors

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

// Re-export core types for convenience
pub use recall_core::{
    CacheOptions, ConfigError, DefaultCacheOptions, HttpRequest, HttpResponse, ManualClock,
    Method, RecallConfig, RecallError, RecallResult, StaleTime, StorageConfig, StorageError,
    StorageKind, StorageResult, Transport, TransportError,
};
pub use recall_storage::{MemoryAdapter, StorageAdapter};

/// Initialize test logging (call once per test binary).
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,recall_client=debug,recall_storage=debug")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

/// In-process transport with canned responses per URL.
///
/// URLs without a canned response answer `{"url": <url>}`. Every call is
/// counted and recorded.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, Result<serde_json::Value, TransportError>>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests to `url` with `data`.
    pub fn with_response(self, url: impl Into<String>, data: serde_json::Value) -> Self {
        self.set_response(url, Ok(data));
        self
    }

    /// Fail requests to `url` with `error`.
    pub fn with_failure(self, url: impl Into<String>, error: TransportError) -> Self {
        self.set_response(url, Err(error));
        self
    }

    /// Replace the canned outcome for `url`.
    pub fn set_response(
        &self,
        url: impl Into<String>,
        outcome: Result<serde_json::Value, TransportError>,
    ) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(url.into(), outcome);
        }
    }

    /// Number of requests that reached the transport.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request seen so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let canned = self
            .responses
            .lock()
            .ok()
            .and_then(|responses| responses.get(&request.url).cloned());
        let url = request.url.clone();
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        match canned {
            Some(outcome) => outcome.map(HttpResponse::ok),
            None => Ok(HttpResponse::ok(serde_json::json!({ "url": url }))),
        }
    }
}

// ============================================================================
// FAILING STORAGE
// ============================================================================

/// How a [`FailingAdapter`] fails an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// The operation reports `false` (or absence for reads).
    Refuse,
    /// The operation returns [`StorageError::Unavailable`].
    Unavailable,
}

/// Storage adapter that fails chosen operations and delegates the rest to
/// an in-memory adapter.
#[derive(Debug)]
pub struct FailingAdapter {
    inner: MemoryAdapter,
    reads: Option<FailureMode>,
    writes: Option<FailureMode>,
    removes: Option<FailureMode>,
}

impl FailingAdapter {
    /// An adapter that fails nothing until configured.
    pub fn new() -> Self {
        Self {
            inner: MemoryAdapter::new("failing", StaleTime::Never),
            reads: None,
            writes: None,
            removes: None,
        }
    }

    /// Every write fails with `mode`.
    pub fn failing_writes(mode: FailureMode) -> Self {
        Self::new().with_writes(mode)
    }

    /// Every operation fails with `mode`.
    pub fn failing_everything(mode: FailureMode) -> Self {
        Self::new()
            .with_reads(mode)
            .with_writes(mode)
            .with_removes(mode)
    }

    pub fn with_reads(mut self, mode: FailureMode) -> Self {
        self.reads = Some(mode);
        self
    }

    pub fn with_writes(mut self, mode: FailureMode) -> Self {
        self.writes = Some(mode);
        self
    }

    pub fn with_removes(mut self, mode: FailureMode) -> Self {
        self.removes = Some(mode);
        self
    }

    /// The delegate holding whatever was successfully written.
    pub fn inner(&self) -> &MemoryAdapter {
        &self.inner
    }
}

impl Default for FailingAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn unavailable() -> StorageError {
    StorageError::Unavailable {
        reason: "simulated outage".to_string(),
    }
}

#[async_trait]
impl StorageAdapter for FailingAdapter {
    async fn get_item<T>(&self, key: &str) -> StorageResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.reads {
            Some(FailureMode::Refuse) => Ok(None),
            Some(FailureMode::Unavailable) => Err(unavailable()),
            None => self.inner.get_item(key).await,
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
        match self.writes {
            Some(FailureMode::Refuse) => Ok(false),
            Some(FailureMode::Unavailable) => Err(unavailable()),
            None => self.inner.set_item(key, value, stale_time).await,
        }
    }

    async fn remove_item(&self, key: &str) -> StorageResult<bool> {
        match self.removes {
            Some(FailureMode::Refuse) => Ok(false),
            Some(FailureMode::Unavailable) => Err(unavailable()),
            None => self.inner.remove_item(key).await,
        }
    }

    async fn clear(&self) -> StorageResult<bool> {
        match self.removes {
            Some(FailureMode::Refuse) => Ok(false),
            Some(FailureMode::Unavailable) => Err(unavailable()),
            None => self.inner.clear().await,
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating test data.

    use super::*;
    use proptest::prelude::*;
    use serde_json::{Map, Value};

    /// Generate a JSON scalar.
    pub fn arb_json_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,16}".prop_map(Value::String),
        ]
    }

    /// Generate a JSON value up to a few levels deep.
    pub fn arb_json_value() -> impl Strategy<Value = Value> {
        arb_json_scalar().prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                    .prop_map(|map| Value::Object(map.into_iter().collect::<Map<_, _>>())),
            ]
        })
    }

    /// Generate a JSON object payload.
    pub fn arb_json_object() -> impl Strategy<Value = Value> {
        prop::collection::btree_map("[a-z]{1,8}", arb_json_value(), 0..8)
            .prop_map(|map| Value::Object(map.into_iter().collect()))
    }

    /// Generate a request path.
    pub fn arb_url_path() -> impl Strategy<Value = String> {
        prop::collection::vec("[a-z0-9]{1,8}", 1..4).prop_map(|segments| {
            format!("/{}", segments.join("/"))
        })
    }

    /// Generate a bounded staleness window, or `Never`.
    pub fn arb_stale_time() -> impl Strategy<Value = StaleTime> {
        prop_oneof![
            Just(StaleTime::Never),
            (0u64..=24 * 60 * 60 * 1000).prop_map(StaleTime::from_millis),
        ]
    }

    /// Generate per-call cache options.
    pub fn arb_cache_options() -> impl Strategy<Value = CacheOptions> {
        (
            prop::option::of(any::<bool>()),
            prop::option::of("[a-z:/]{0,12}"),
            prop::option::of(arb_stale_time()),
        )
            .prop_map(|(use_cache, key, stale_time)| CacheOptions {
                use_cache,
                key,
                stale_time,
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use serde_json::{json, Value};

    /// A single todo item as served by a typical JSON API.
    pub fn todo() -> Value {
        json!({
            "userId": 1,
            "id": 1,
            "title": "delectus aut autem",
            "completed": false
        })
    }

    /// A transport that serves [`todo`] at `/todos/1`.
    pub fn todo_transport() -> MockTransport {
        MockTransport::new().with_response("/todos/1", todo())
    }

    /// An in-memory adapter with a five-minute default window.
    pub fn memory_adapter() -> MemoryAdapter {
        MemoryAdapter::new("test", recall_core::DEFAULT_STALE_TIME)
    }

    /// Defaults with caching on and records that never go stale.
    pub fn permanent_defaults() -> DefaultCacheOptions {
        DefaultCacheOptions::default().with_stale_time(StaleTime::Never)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for recall-specific validation.

    use super::*;

    /// Assert that a RecallResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &RecallResult<T>) {
        match result {
            Err(RecallError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that a RecallResult is a specific Transport error.
    #[track_caller]
    pub fn assert_transport_error<T: std::fmt::Debug>(
        result: &RecallResult<T>,
        expected: &TransportError,
    ) {
        match result {
            Err(RecallError::Transport(err)) => assert_eq!(err, expected),
            other => panic!("Expected Transport error {:?}, got: {:?}", expected, other),
        }
    }

    /// Assert that a RecallResult is a Decode error.
    #[track_caller]
    pub fn assert_decode_error<T: std::fmt::Debug>(result: &RecallResult<T>) {
        match result {
            Err(RecallError::Decode { .. }) => {}
            other => panic!("Expected Decode error, got: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_transport_counts_and_records() {
        let transport = MockTransport::new().with_response("/a", json!(1));

        let first = transport.send(HttpRequest::get("/a")).await.unwrap();
        let second = transport.send(HttpRequest::get("/b")).await.unwrap();

        assert_eq!(first.data, json!(1));
        assert_eq!(second.data, json!({"url": "/b"}));
        assert_eq!(transport.calls(), 2);
        assert_eq!(transport.requests()[1].url, "/b");
    }

    #[tokio::test]
    async fn test_mock_transport_failure() {
        let transport = MockTransport::new().with_failure("/down", TransportError::Timeout);
        let err = transport.send(HttpRequest::get("/down")).await.unwrap_err();
        assert_eq!(err, TransportError::Timeout);
    }

    #[tokio::test]
    async fn test_failing_adapter_modes() {
        let refusing = FailingAdapter::failing_writes(FailureMode::Refuse);
        assert!(!refusing.set_item("k", &1, None).await.unwrap());
        assert_eq!(refusing.get_item::<i32>("k").await.unwrap(), None);

        let down = FailingAdapter::failing_everything(FailureMode::Unavailable);
        assert!(down.get_item::<i32>("k").await.is_err());
        assert!(down.set_item("k", &1, None).await.is_err());
        assert!(down.remove_item("k").await.is_err());
        assert!(down.clear().await.is_err());
    }

    #[tokio::test]
    async fn test_failing_adapter_delegates_when_healthy() {
        let adapter = FailingAdapter::new();
        assert!(adapter.set_item("k", &"v", None).await.unwrap());
        assert_eq!(adapter.get_item::<String>("k").await.unwrap().as_deref(), Some("v"));
        assert!(!adapter.inner().is_empty());
    }
}
