//! Error types for recall operations

use thiserror::Error;

/// Configuration errors.
///
/// Raised while building a client or a storage backend. These are never
/// caught internally.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Storage backend {backend} is not available in this build")]
    BackendUnavailable { backend: String },
}

/// Storage backend errors.
///
/// Adapters absorb most of these at their boundary. Only
/// [`StorageError::Unavailable`] is expected to escape an adapter call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage backend unreachable: {reason}")]
    Unavailable { reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },
}

/// Errors produced by the underlying HTTP transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request to {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("Network error: {reason}")]
    Network { reason: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Request body could not be encoded: {reason}")]
    InvalidBody { reason: String },

    #[error("Invalid response: {reason}")]
    InvalidResponse { reason: String },
}

/// Master error type for all recall errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecallError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Payload could not be decoded: {reason}")]
    Decode { reason: String },
}

/// Result type alias for recall operations.
pub type RecallResult<T> = Result<T, RecallError>;

/// Result type alias for storage adapter operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// TESTS
// =============================================================================
