//! Recall Storage - adapter contract and backends
//!
//! Defines the [`StorageAdapter`] contract shared by every cache backend and
//! ships three implementations:
//!
//! - [`MemoryAdapter`]: process-local map (`synchronous`)
//! - [`LmdbAdapter`]: durable LMDB environment (`indexed`)
//! - `RedisAdapter`: Redis server (`external`, behind the `redis` feature)
//!
//! [`StorageBackend`] selects one of them from a
//! [`recall_core::StorageConfig`].

pub mod adapter;
pub mod factory;
pub mod keys;
pub mod lmdb;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;

pub use adapter::StorageAdapter;
pub use factory::StorageBackend;
pub use lmdb::{LmdbAdapter, LmdbError};
pub use memory::{MemoryAdapter, SharedMemoryStore};
#[cfg(feature = "redis")]
pub use redis_store::RedisAdapter;
