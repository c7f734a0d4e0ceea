//! Per-call and process-wide cache options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::record::StaleTime;

/// Default staleness window: five minutes.
pub const DEFAULT_STALE_TIME: StaleTime = StaleTime::After(Duration::from_secs(5 * 60));

/// Process-wide defaults merged into every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DefaultCacheOptions {
    /// Whether calls use the cache when they do not say otherwise.
    pub use_cache: bool,
    /// Staleness window for calls that do not set one.
    pub stale_time: StaleTime,
}

impl Default for DefaultCacheOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            stale_time: DEFAULT_STALE_TIME,
        }
    }
}

impl DefaultCacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable caching by default.
    pub fn with_use_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    /// Set the default staleness window.
    pub fn with_stale_time(mut self, stale_time: impl Into<StaleTime>) -> Self {
        self.stale_time = stale_time.into();
        self
    }
}

/// Cache options supplied alongside a single request.
///
/// Every field is optional; unset fields fall back to
/// [`DefaultCacheOptions`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheOptions {
    pub use_cache: Option<bool>,
    /// Explicit cache key. Bypasses key derivation when non-empty.
    pub key: Option<String>,
    pub stale_time: Option<StaleTime>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that force the cache on for this call.
    pub fn cached() -> Self {
        Self::default().with_use_cache(true)
    }

    /// Options that bypass the cache for this call.
    pub fn uncached() -> Self {
        Self::default().with_use_cache(false)
    }

    pub fn with_use_cache(mut self, enabled: bool) -> Self {
        self.use_cache = Some(enabled);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_stale_time(mut self, stale_time: impl Into<StaleTime>) -> Self {
        self.stale_time = Some(stale_time.into());
        self
    }
}

/// The outcome of merging per-call options with defaults for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCacheOptions {
    /// Logical cache key; `None` disables caching for the call.
    pub key: Option<String>,
    pub use_cache: bool,
    pub stale_time: StaleTime,
}

impl ResolvedCacheOptions {
    /// The key to use, if this call reads from and writes to the cache.
    pub fn active_key(&self) -> Option<&str> {
        if self.use_cache {
            self.key.as_deref()
        } else {
            None
        }
    }
}
