//! Recall Client - cached HTTP client façade
//!
//! Wraps any [`recall_core::Transport`] with read-through / write-back
//! caching over a [`recall_storage::StorageAdapter`]:
//!
//! - [`ReadThroughCache`]: the orchestrator deciding hit, miss and write-back
//! - [`CachedClient`]: cache-aware HTTP verbs, `revalidate` and `clear_cache`
//! - [`ReqwestTransport`]: a `reqwest`-backed transport

pub mod client;
pub mod orchestrator;
pub mod reqwest_transport;
pub mod stats;

pub use client::CachedClient;
pub use orchestrator::{CacheRead, ReadThroughCache};
pub use reqwest_transport::ReqwestTransport;
pub use stats::CacheStats;

// Re-export the types callers need to configure and call a client.
pub use recall_core::{
    CacheOptions, DefaultCacheOptions, HttpRequest, HttpResponse, Method, RecallConfig,
    RecallError, RecallResult, StaleTime, StorageConfig, StorageKind, Transport, TransportError,
};
pub use recall_storage::{StorageAdapter, StorageBackend};
