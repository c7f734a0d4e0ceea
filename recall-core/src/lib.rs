//! Recall Core - shared types for the recall response cache
//!
//! Record model and staleness rule, per-call options and key resolution,
//! physical key hashing, configuration, the transport abstraction and the
//! error taxonomy. Storage backends live in `recall-storage`; the
//! orchestrator and client façade live in `recall-client`.

pub mod clock;
pub mod config;
pub mod error;
pub mod hash;
pub mod key;
pub mod options;
pub mod record;
pub mod transport;

pub use clock::{system_clock, Clock, ManualClock, SystemClock};
pub use config::{RecallConfig, StorageConfig, StorageKind, DEFAULT_NAMESPACE};
pub use error::{
    ConfigError, RecallError, RecallResult, StorageError, StorageResult, TransportError,
};
pub use hash::hash_key;
pub use key::{canonicalize, derive_cache_key, resolve_cache_options};
pub use options::{CacheOptions, DefaultCacheOptions, ResolvedCacheOptions, DEFAULT_STALE_TIME};
pub use record::{CacheRecord, StaleTime, NEVER_STALE};
pub use transport::{HttpRequest, HttpResponse, Method, Transport};
