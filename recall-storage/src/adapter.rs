//! The storage adapter contract.
//!
//! Every backend exposes the same four operations. The orchestrator and the
//! client façade only ever talk to this trait, so backends are drop-in
//! replacements for each other.

use async_trait::async_trait;
use recall_core::{StaleTime, StorageResult};
use serde::{de::DeserializeOwned, Serialize};

/// Storage adapter for cache records.
///
/// # Keys
///
/// Callers pass logical keys. Adapters hash them with
/// [`recall_core::hash_key`] and scope them to their namespace before
/// touching the backend.
///
/// # Failure model
///
/// Backend failures are absorbed at this boundary: reads report absence,
/// writes report `false`. `Err` is reserved for a backend that cannot be
/// reached at all.
///
/// # Concurrency
///
/// Adapters are shared between concurrent requests. No ordering is
/// guaranteed between operations issued by different requests on the same
/// key; the last write wins.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Read a fresh value.
    ///
    /// Stale and corrupt records are removed before `None` is returned.
    async fn get_item<T>(&self, key: &str) -> StorageResult<Option<T>>
    where
        T: DeserializeOwned + Send;

    /// Write a value, replacing any existing record and resetting its
    /// timestamp.
    ///
    /// `stale_time` overrides the adapter's default staleness window.
    async fn set_item<T>(
        &self,
        key: &str,
        value: &T,
        stale_time: Option<StaleTime>,
    ) -> StorageResult<bool>
    where
        T: Serialize + Sync;

    /// Remove a record. Removing an absent key succeeds.
    async fn remove_item(&self, key: &str) -> StorageResult<bool>;

    /// Remove every record in this adapter's namespace, and nothing else.
    async fn clear(&self) -> StorageResult<bool>;
}
