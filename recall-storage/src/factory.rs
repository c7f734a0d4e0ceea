//! Backend selection.
//!
//! [`StorageBackend`] is the closed set of backends this crate ships. It is
//! built from a [`StorageConfig`] and implements [`StorageAdapter`] by
//! delegating to the selected variant.

use std::sync::Arc;

use async_trait::async_trait;
use recall_core::{
    system_clock, Clock, ConfigError, RecallResult, StaleTime, StorageConfig, StorageError,
    StorageKind, StorageResult,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::adapter::StorageAdapter;
use crate::lmdb::LmdbAdapter;
use crate::memory::MemoryAdapter;
#[cfg(feature = "redis")]
use crate::redis_store::RedisAdapter;

/// A storage adapter chosen at construction time.
#[derive(Debug)]
pub enum StorageBackend {
    /// Process-local map (`synchronous`).
    Memory(MemoryAdapter),
    /// LMDB environment (`indexed`).
    Lmdb(LmdbAdapter),
    /// Redis server (`external`).
    #[cfg(feature = "redis")]
    Redis(RedisAdapter),
}

macro_rules! dispatch {
    ($self:expr, $adapter:ident => $call:expr) => {
        match $self {
            StorageBackend::Memory($adapter) => $call,
            StorageBackend::Lmdb($adapter) => $call,
            #[cfg(feature = "redis")]
            StorageBackend::Redis($adapter) => $call,
        }
    };
}

impl StorageBackend {
    /// Validate `config` for this build without touching any backend.
    ///
    /// Fails when required fields are missing or when the selected backend
    /// was compiled out.
    pub fn check(config: &StorageConfig) -> Result<(), ConfigError> {
        config.validate()?;
        if config.effective_kind() == StorageKind::External && !cfg!(feature = "redis") {
            return Err(ConfigError::BackendUnavailable {
                backend: StorageKind::External.to_string(),
            });
        }
        Ok(())
    }

    /// Build the backend described by `config`.
    pub async fn connect(config: &StorageConfig, default_stale_time: StaleTime) -> RecallResult<Self> {
        Self::connect_with_clock(config, default_stale_time, system_clock()).await
    }

    /// Build the backend described by `config`, stamping records with `clock`.
    pub async fn connect_with_clock(
        config: &StorageConfig,
        default_stale_time: StaleTime,
        clock: Arc<dyn Clock>,
    ) -> RecallResult<Self> {
        Self::check(config)?;

        let kind = config.effective_kind();
        tracing::debug!(kind = %kind, namespace = %config.namespace, "building storage backend");

        match kind {
            StorageKind::Indexed => {
                let path = config.path.as_ref().ok_or_else(|| ConfigError::MissingRequired {
                    field: "path".to_string(),
                })?;
                let adapter = LmdbAdapter::open(
                    path,
                    config.max_size_mb,
                    config.namespace.clone(),
                    default_stale_time,
                )
                .map_err(StorageError::from)?
                .with_clock(clock);
                Ok(Self::Lmdb(adapter))
            }
            StorageKind::External => connect_external(config, default_stale_time, clock).await,
            StorageKind::Synchronous | StorageKind::Auto => Ok(Self::Memory(
                MemoryAdapter::new(config.namespace.clone(), default_stale_time).with_clock(clock),
            )),
        }
    }

    /// The kind of backend this is.
    pub fn kind(&self) -> StorageKind {
        match self {
            Self::Memory(_) => StorageKind::Synchronous,
            Self::Lmdb(_) => StorageKind::Indexed,
            #[cfg(feature = "redis")]
            Self::Redis(_) => StorageKind::External,
        }
    }

    pub fn namespace(&self) -> &str {
        dispatch!(self, adapter => adapter.namespace())
    }
}

#[cfg(feature = "redis")]
async fn connect_external(
    config: &StorageConfig,
    default_stale_time: StaleTime,
    clock: Arc<dyn Clock>,
) -> RecallResult<StorageBackend> {
    let uri = config
        .external_uri
        .as_deref()
        .ok_or_else(|| ConfigError::MissingRequired {
            field: "external_uri".to_string(),
        })?;
    let adapter = RedisAdapter::connect(uri.trim(), config.namespace.clone(), default_stale_time)
        .await?
        .with_clock(clock);
    Ok(StorageBackend::Redis(adapter))
}

#[cfg(not(feature = "redis"))]
async fn connect_external(
    _config: &StorageConfig,
    _default_stale_time: StaleTime,
    _clock: Arc<dyn Clock>,
) -> RecallResult<StorageBackend> {
    Err(ConfigError::BackendUnavailable {
        backend: StorageKind::External.to_string(),
    }
    .into())
}

#[async_trait]
impl StorageAdapter for StorageBackend {
    async fn get_item<T>(&self, key: &str) -> StorageResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        dispatch!(self, adapter => adapter.get_item(key).await)
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
        dispatch!(self, adapter => adapter.set_item(key, value, stale_time).await)
    }

    async fn remove_item(&self, key: &str) -> StorageResult<bool> {
        dispatch!(self, adapter => adapter.remove_item(key).await)
    }

    async fn clear(&self) -> StorageResult<bool> {
        dispatch!(self, adapter => adapter.clear().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::{ManualClock, RecallError};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_synchronous_builds_memory_backend() {
        let backend = StorageBackend::connect(&StorageConfig::synchronous(), StaleTime::Never)
            .await
            .expect("memory backend should build");
        assert_eq!(backend.kind(), StorageKind::Synchronous);
        assert_eq!(backend.namespace(), "recall");
    }

    #[tokio::test]
    async fn test_auto_with_path_builds_lmdb_backend() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let config = StorageConfig::new(StorageKind::Auto)
            .with_path(temp_dir.path())
            .with_max_size_mb(10);
        let backend = StorageBackend::connect(&config, StaleTime::Never)
            .await
            .expect("lmdb backend should build");
        assert_eq!(backend.kind(), StorageKind::Indexed);
    }

    #[tokio::test]
    async fn test_overflowing_map_size_is_config_error() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let config = StorageConfig::indexed(temp_dir.path()).with_max_size_mb(usize::MAX / 1024);
        let err = StorageBackend::connect(&config, StaleTime::Never)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecallError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "max_size_mb"
        ));
    }

    #[tokio::test]
    async fn test_external_without_uri_fails_before_connecting() {
        let config = StorageConfig::new(StorageKind::External);
        let err = StorageBackend::connect(&config, StaleTime::Never)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RecallError::Config(ConfigError::MissingRequired {
                field: "external_uri".to_string()
            })
        );
    }

    #[cfg(not(feature = "redis"))]
    #[test]
    fn test_external_is_unavailable_without_redis_feature() {
        let config = StorageConfig::external("redis://127.0.0.1:6379");
        assert!(matches!(
            StorageBackend::check(&config),
            Err(ConfigError::BackendUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_backend_delegates_to_adapter() {
        let clock = ManualClock::new(0);
        let backend = StorageBackend::connect_with_clock(
            &StorageConfig::synchronous(),
            StaleTime::from_millis(10),
            Arc::new(clock.clone()),
        )
        .await
        .expect("memory backend should build");

        assert!(backend.set_item("k", &json!([1, 2]), None).await.unwrap());
        assert_eq!(backend.get_item::<Value>("k").await.unwrap(), Some(json!([1, 2])));

        clock.advance(11);
        assert_eq!(backend.get_item::<Value>("k").await.unwrap(), None);

        assert!(backend.remove_item("k").await.unwrap());
        assert!(backend.clear().await.unwrap());
    }
}
