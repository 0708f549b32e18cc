//! Redis-backed store implementation
//!
//! Counter hashes are written through a MULTI/EXEC pipeline so every
//! observation lands atomically; the live pool is a sorted set keyed by
//! quality score.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::Result;
use crate::models::ProxyRecord;
use crate::store::{
    meta_key, metrics_key, FieldOp, LivePool, MetadataStore, MetricsStore, PoolEntry,
    LIVE_POOL_KEY,
};

/// Redis implementation of all three backing stores over one shared
/// connection manager.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis and start the reconnecting connection manager.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl MetricsStore for RedisStore {
    async fn apply(&self, address: &str, ops: &[FieldOp]) -> Result<()> {
        let key = metrics_key(address);
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in ops {
            match op {
                FieldOp::Set(field, value) => {
                    pipe.hset(&key, *field, value).ignore();
                }
                FieldOp::Incr(field, delta) => {
                    pipe.hincr(&key, *field, *delta).ignore();
                }
            }
        }
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn fetch(&self, address: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        // HGETALL on a missing key yields an empty map, the "new proxy"
        // sentinel callers expect.
        let fields: HashMap<String, String> = conn.hgetall(metrics_key(address)).await?;
        Ok(fields)
    }

    async fn remove(&self, address: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(metrics_key(address)).await?;
        Ok(())
    }
}

#[async_trait]
impl LivePool for RedisStore {
    async fn upsert(&self, member: &str, score: f64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.zadd(LIVE_POOL_KEY, member, score).await?;
        Ok(())
    }

    async fn remove(&self, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.zrem(LIVE_POOL_KEY, member).await?;
        Ok(())
    }

    async fn top_range(&self, offset: usize, count: usize) -> Result<Vec<PoolEntry>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let stop = offset + count - 1;
        let entries: Vec<(String, f64)> = conn
            .zrevrange_withscores(LIVE_POOL_KEY, offset as isize, stop as isize)
            .await?;
        Ok(entries
            .into_iter()
            .map(|(member, score)| PoolEntry { member, score })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let mut conn = self.conn.clone();
        let count: usize = conn.zcard(LIVE_POOL_KEY).await?;
        Ok(count)
    }
}

#[async_trait]
impl MetadataStore for RedisStore {
    async fn put(&self, member: &str, record: &ProxyRecord) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        let _: () = conn.set(meta_key(member), payload).await?;
        Ok(())
    }

    async fn get(&self, member: &str) -> Result<Option<ProxyRecord>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(meta_key(member)).await?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(meta_key(member)).await?;
        Ok(())
    }
}
