//! In-memory store implementation
//!
//! Mirrors the Redis field-level semantics so tests and single-process
//! deployments exercise the exact code paths the scorer and scheduler use in
//! production.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::error::Result;
use crate::models::ProxyRecord;
use crate::store::{FieldOp, LivePool, MetadataStore, MetricsStore, PoolEntry};

/// In-memory implementation of all three backing stores.
#[derive(Default)]
pub struct MemoryStore {
    metrics: DashMap<String, HashMap<String, String>>,
    pool: RwLock<HashMap<String, f64>>,
    meta: DashMap<String, ProxyRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricsStore for MemoryStore {
    async fn apply(&self, address: &str, ops: &[FieldOp]) -> Result<()> {
        // The entry guard serializes writers per address, so a whole update
        // batch is visible all-or-nothing.
        let mut hash = self.metrics.entry(address.to_string()).or_default();
        for op in ops {
            match op {
                FieldOp::Set(field, value) => {
                    hash.insert((*field).to_string(), value.clone());
                }
                FieldOp::Incr(field, delta) => {
                    let current: i64 = hash
                        .get(*field)
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    hash.insert((*field).to_string(), (current + delta).to_string());
                }
            }
        }
        Ok(())
    }

    async fn fetch(&self, address: &str) -> Result<HashMap<String, String>> {
        Ok(self
            .metrics
            .get(address)
            .map(|hash| hash.clone())
            .unwrap_or_default())
    }

    async fn remove(&self, address: &str) -> Result<()> {
        self.metrics.remove(address);
        Ok(())
    }
}

#[async_trait]
impl LivePool for MemoryStore {
    async fn upsert(&self, member: &str, score: f64) -> Result<()> {
        self.pool.write().insert(member.to_string(), score);
        Ok(())
    }

    async fn remove(&self, member: &str) -> Result<()> {
        self.pool.write().remove(member);
        Ok(())
    }

    async fn top_range(&self, offset: usize, count: usize) -> Result<Vec<PoolEntry>> {
        let mut entries: Vec<PoolEntry> = self
            .pool
            .read()
            .iter()
            .map(|(member, score)| PoolEntry {
                member: member.clone(),
                score: *score,
            })
            .collect();

        // Descending by score, ties broken by member for determinism.
        entries.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.member.cmp(&b.member))
        });

        Ok(entries.into_iter().skip(offset).take(count).collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.pool.read().len())
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn put(&self, member: &str, record: &ProxyRecord) -> Result<()> {
        self.meta.insert(member.to_string(), record.clone());
        Ok(())
    }

    async fn get(&self, member: &str) -> Result<Option<ProxyRecord>> {
        Ok(self.meta.get(member).map(|r| r.clone()))
    }

    async fn remove(&self, member: &str) -> Result<()> {
        self.meta.remove(member);
        Ok(())
    }
}
