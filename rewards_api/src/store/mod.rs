//! Key-value store abstraction used by the reward ledger
//!
//! The ledger only needs a handful of primitives from its backing store:
//! plain strings, hashes, sorted sets, cursor scans, conditional sets with a
//! TTL and pipelined batches. Stores that can run an atomic
//! compare-and-delete advertise it through [`KvStore::atomic`].

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

pub mod memory;
pub mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::{RedisStore, RedisStoreConfig};

/// Store failures. "Key missing" is never an error, it is `None`/empty.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("stored value could not be decoded: {0}")]
    Serialization(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One write inside a pipelined batch
#[derive(Debug, Clone, PartialEq)]
pub enum KvCommand {
    Set { key: String, value: String },
    /// Replace a hash wholesale (delete then set every field)
    HReplace { key: String, fields: Vec<(String, String)> },
    /// Update only the given hash fields
    HSet { key: String, fields: Vec<(String, String)> },
    /// Replace a sorted set wholesale
    ZReplace { key: String, members: Vec<(String, f64)> },
}

/// Basic store primitives
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    async fn del(&self, key: &str) -> StoreResult<()>;

    /// `SET key value NX EX ttl`; true when the key was written
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> StoreResult<bool>;

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// Pipelined `HGETALL` for many keys, results in input order
    async fn hgetall_many(&self, keys: &[String]) -> StoreResult<Vec<HashMap<String, String>>>;

    async fn hset_multiple(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()>;

    /// Members ordered by descending score, inclusive indices (`-1` = last)
    async fn zrevrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> StoreResult<Vec<(String, f64)>>;

    /// Zero-based rank by descending score
    async fn zrevrank(&self, key: &str, member: &str) -> StoreResult<Option<u64>>;

    async fn zcard(&self, key: &str) -> StoreResult<u64>;

    /// One `SCAN cursor MATCH pattern COUNT count` round
    async fn scan_match(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> StoreResult<(u64, Vec<String>)>;

    /// Execute all commands in one transactional pipeline
    async fn exec_batch(&self, commands: Vec<KvCommand>) -> StoreResult<()>;

    /// Cheap reachability probe
    async fn ping(&self) -> StoreResult<()>;

    /// Atomic scripting capability, if this backend offers it
    fn atomic(&self) -> Option<&dyn AtomicStore>;
}

/// Stores able to check-and-delete a key in one server-side step
#[async_trait]
pub trait AtomicStore: Send + Sync {
    /// Delete `key` only if it currently holds `expected`
    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool>;
}
