//! Backing stores shared by the scorer and the scheduler
//!
//! Two out-of-process stores back the control plane: a per-address counter
//! hash and a score-ordered live pool, plus a side metadata record per pool
//! member. All three are expressed as traits so the Redis deployment and the
//! in-memory test double share exact field-level semantics.

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::ProxyRecord;

/// Key prefix for per-address counter hashes
pub const METRICS_KEY_PREFIX: &str = "proxy:metrics:";
/// Key prefix for per-member metadata records
pub const META_KEY_PREFIX: &str = "proxy:meta:";
/// Key of the score-ordered set of selectable proxies
pub const LIVE_POOL_KEY: &str = "proxies:available";

// Counter hash fields. Counters are decimal strings; timestamps are RFC 3339
// UTC strings.
pub const FIELD_SUCCESS_COUNT: &str = "success_count";
pub const FIELD_FAILURE_COUNT: &str = "failure_count";
pub const FIELD_TOTAL_LATENCY_MS: &str = "total_latency_ms";
pub const FIELD_ANONYMITY_LEVEL: &str = "anonymity_level";
pub const FIELD_LAST_SEEN_TIME: &str = "last_seen_time";
pub const FIELD_LAST_SUCCESS_TIME: &str = "last_success_time";
pub const FIELD_CONSECUTIVE_FAILS: &str = "consecutive_fails";

pub(crate) fn metrics_key(address: &str) -> String {
    format!("{}{}", METRICS_KEY_PREFIX, address)
}

pub(crate) fn meta_key(member: &str) -> String {
    format!("{}{}", META_KEY_PREFIX, member)
}

/// One field change inside an atomic counter update.
#[derive(Debug, Clone)]
pub enum FieldOp {
    Set(&'static str, String),
    Incr(&'static str, i64),
}

/// Per-address counter hash store.
///
/// `apply` commits all field changes of a single observation atomically with
/// respect to concurrent readers; partial states are never visible.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn apply(&self, address: &str, ops: &[FieldOp]) -> Result<()>;

    /// Raw hash fields for an address. An empty map means the proxy has never
    /// been observed.
    async fn fetch(&self, address: &str) -> Result<HashMap<String, String>>;

    async fn remove(&self, address: &str) -> Result<()>;
}

/// A live-pool member with its cached score.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolEntry {
    pub member: String,
    pub score: f64,
}

/// Score-ordered set of currently selectable proxies.
#[async_trait]
pub trait LivePool: Send + Sync {
    /// Insert or update a member with the given score.
    async fn upsert(&self, member: &str, score: f64) -> Result<()>;

    async fn remove(&self, member: &str) -> Result<()>;

    /// Members in descending score order, starting at `offset`, at most
    /// `count` entries.
    async fn top_range(&self, offset: usize, count: usize) -> Result<Vec<PoolEntry>>;

    async fn count(&self) -> Result<usize>;
}

/// Side store for per-member proxy metadata (country, credentials, provider).
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn put(&self, member: &str, record: &ProxyRecord) -> Result<()>;

    async fn get(&self, member: &str) -> Result<Option<ProxyRecord>>;

    async fn remove(&self, member: &str) -> Result<()>;
}
