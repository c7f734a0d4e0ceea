//! Construction-time configuration.
//!
//! Configuration is an explicit value handed to the client at construction.
//! Nothing here reads the process environment.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::options::DefaultCacheOptions;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "recall";

/// Default LMDB map size in megabytes.
pub const DEFAULT_MAX_SIZE_MB: usize = 64;

const BYTES_PER_MB: usize = 1024 * 1024;

/// Which storage backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Durable, transactional local store (LMDB).
    Indexed,
    /// Process-local in-memory store.
    Synchronous,
    /// Networked external data store (Redis).
    External,
    /// `Indexed` when a path is configured, otherwise `Synchronous`.
    Auto,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Indexed => "indexed",
            Self::Synchronous => "synchronous",
            Self::External => "external",
            Self::Auto => "auto",
        }
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage backend selection and its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub kind: StorageKind,
    /// Connection URI for the external store, e.g. `redis://127.0.0.1:6379`.
    #[serde(default)]
    pub external_uri: Option<String>,
    /// Directory for the indexed store.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Scope of this cache inside a shared backend.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Map size of the indexed store.
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: usize,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_max_size_mb() -> usize {
    DEFAULT_MAX_SIZE_MB
}

impl StorageConfig {
    pub fn new(kind: StorageKind) -> Self {
        Self {
            kind,
            external_uri: None,
            path: None,
            namespace: default_namespace(),
            max_size_mb: DEFAULT_MAX_SIZE_MB,
        }
    }

    /// In-memory storage.
    pub fn synchronous() -> Self {
        Self::new(StorageKind::Synchronous)
    }

    /// LMDB storage rooted at `path`.
    pub fn indexed(path: impl Into<PathBuf>) -> Self {
        Self::new(StorageKind::Indexed).with_path(path)
    }

    /// Redis storage at `uri`.
    pub fn external(uri: impl Into<String>) -> Self {
        Self::new(StorageKind::External).with_external_uri(uri)
    }

    pub fn with_external_uri(mut self, uri: impl Into<String>) -> Self {
        self.external_uri = Some(uri.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_max_size_mb(mut self, max_size_mb: usize) -> Self {
        self.max_size_mb = max_size_mb;
        self
    }

    /// The LMDB map size in bytes, or `None` if it does not fit in `usize`.
    pub fn map_size_bytes(&self) -> Option<usize> {
        self.max_size_mb.checked_mul(BYTES_PER_MB)
    }

    /// The concrete kind after resolving [`StorageKind::Auto`].
    pub fn effective_kind(&self) -> StorageKind {
        match self.kind {
            StorageKind::Auto if self.path.is_some() => StorageKind::Indexed,
            StorageKind::Auto => StorageKind::Synchronous,
            kind => kind,
        }
    }

    /// Check that the selected backend has everything it needs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_namespace(&self.namespace)?;

        match self.effective_kind() {
            StorageKind::External => {
                let uri = self.external_uri.as_deref().map(str::trim).unwrap_or("");
                if uri.is_empty() {
                    return Err(ConfigError::MissingRequired {
                        field: "external_uri".to_string(),
                    });
                }
            }
            StorageKind::Indexed => {
                if self.path.is_none() {
                    return Err(ConfigError::MissingRequired {
                        field: "path".to_string(),
                    });
                }
                if self.max_size_mb == 0 {
                    return Err(ConfigError::InvalidValue {
                        field: "max_size_mb".to_string(),
                        value: "0".to_string(),
                        reason: "map size must be at least 1 MB".to_string(),
                    });
                }
                if self.map_size_bytes().is_none() {
                    return Err(ConfigError::InvalidValue {
                        field: "max_size_mb".to_string(),
                        value: self.max_size_mb.to_string(),
                        reason: "map size in bytes overflows usize".to_string(),
                    });
                }
            }
            StorageKind::Synchronous | StorageKind::Auto => {}
        }

        Ok(())
    }
}

fn validate_namespace(namespace: &str) -> Result<(), ConfigError> {
    let reason = if namespace.is_empty() {
        Some("namespace must not be empty")
    } else if namespace.contains(['*', '?', '[', ']', ':']) {
        Some("namespace must not contain '*', '?', '[', ']' or ':'")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ConfigError::InvalidValue {
            field: "namespace".to_string(),
            value: namespace.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Master configuration for a cached client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallConfig {
    pub storage: StorageConfig,
    #[serde(default)]
    pub default_cache_options: DefaultCacheOptions,
}

impl RecallConfig {
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage,
            default_cache_options: DefaultCacheOptions::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: DefaultCacheOptions) -> Self {
        self.default_cache_options = defaults;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.storage.validate()
    }
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self::new(StorageConfig::synchronous())
    }
}
