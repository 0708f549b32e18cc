//! Quality scoring
//!
//! Owns the per-address counters and turns them into a bounded quality score
//! on demand. The score is a pure function of the counters; the live pool
//! only caches the last computed value.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{error, warn};

use crate::error::Result;
use crate::models::{AnonymityLevel, ProbeResult};
use crate::store::{
    FieldOp, MetricsStore, FIELD_ANONYMITY_LEVEL, FIELD_CONSECUTIVE_FAILS, FIELD_FAILURE_COUNT,
    FIELD_LAST_SEEN_TIME, FIELD_LAST_SUCCESS_TIME, FIELD_SUCCESS_COUNT, FIELD_TOTAL_LATENCY_MS,
};

/// Seed score for a proxy with no recorded observations yet
pub const INITIAL_SCORE: f64 = 0.5;

/// Latency above which a proxy earns no latency credit (linear decay to here)
const MAX_LATENCY_MS: f64 = 5000.0;

/// Window over which a recent success still earns a recency bonus
const RECENT_HOURS: f64 = 24.0;

/// Consecutive failures at which the stability penalty saturates; the
/// retirement sweep uses the same threshold
pub const MAX_CONSECUTIVE_FAILS: u64 = 5;

const WEIGHT_SUCCESS_RATE: f64 = 0.50;
const WEIGHT_LATENCY: f64 = 0.30;
const WEIGHT_ANONYMITY: f64 = 0.15;
const WEIGHT_STABILITY: f64 = 0.05;

/// Parsed view of a per-address counter hash.
#[derive(Debug, Clone, Default)]
pub struct ProxyMetrics {
    pub success_count: u64,
    pub failure_count: u64,
    pub total_latency_ms: u64,
    pub anonymity_level: AnonymityLevel,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u64,
}

impl ProxyMetrics {
    /// Parse raw hash fields. Unparseable counters count as 0 and unparseable
    /// timestamps as absent; both are logged, neither aborts the read.
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        Self {
            success_count: parse_counter(fields, FIELD_SUCCESS_COUNT),
            failure_count: parse_counter(fields, FIELD_FAILURE_COUNT),
            total_latency_ms: parse_counter(fields, FIELD_TOTAL_LATENCY_MS),
            anonymity_level: fields
                .get(FIELD_ANONYMITY_LEVEL)
                .map(|s| AnonymityLevel::from_str(s))
                .unwrap_or_default(),
            last_seen_at: parse_timestamp(fields, FIELD_LAST_SEEN_TIME),
            last_success_at: parse_timestamp(fields, FIELD_LAST_SUCCESS_TIME),
            consecutive_failures: parse_counter(fields, FIELD_CONSECUTIVE_FAILS),
        }
    }

    pub fn total_observations(&self) -> u64 {
        self.success_count + self.failure_count
    }
}

fn parse_counter(fields: &HashMap<String, String>, field: &str) -> u64 {
    match fields.get(field) {
        None => 0,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(field, value = %raw, "Unparseable counter value, treating as 0");
            0
        }),
    }
}

fn parse_timestamp(fields: &HashMap<String, String>, field: &str) -> Option<DateTime<Utc>> {
    let raw = fields.get(field)?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            warn!(field, value = %raw, "Unparseable timestamp: {}", e);
            None
        }
    }
}

/// Quality scorer capability consumed by the scheduler and the retirement
/// sweep.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Fold one probe or usage outcome into the counters. Store failures are
    /// logged and swallowed so neither the ingestion nor the request path
    /// blocks on counter I/O.
    async fn update_on_result(&self, address: &str, result: &ProbeResult);

    /// Quality score in [0, 1]. 0.5 for a never-observed address, 0.0 when
    /// the counter store cannot be read.
    async fn score(&self, address: &str) -> f64;

    /// Parsed counters for an address; None on a miss or store failure.
    async fn metrics(&self, address: &str) -> Option<ProxyMetrics>;

    async fn remove_metrics(&self, address: &str) -> Result<()>;
}

/// Counter-store backed scorer implementing the weighted quality formula.
pub struct QualityScorer {
    store: Arc<dyn MetricsStore>,
}

impl QualityScorer {
    pub fn new(store: Arc<dyn MetricsStore>) -> Self {
        Self { store }
    }

    /// Apply a result's counter changes with an explicit timestamp.
    async fn apply_update(&self, address: &str, result: &ProbeResult, now: DateTime<Utc>) {
        let now_str = now.to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut ops = vec![FieldOp::Set(FIELD_LAST_SEEN_TIME, now_str.clone())];
        if result.available {
            ops.push(FieldOp::Incr(FIELD_SUCCESS_COUNT, 1));
            ops.push(FieldOp::Incr(
                FIELD_TOTAL_LATENCY_MS,
                result.latency.as_millis() as i64,
            ));
            ops.push(FieldOp::Set(FIELD_LAST_SUCCESS_TIME, now_str));
            ops.push(FieldOp::Set(
                FIELD_ANONYMITY_LEVEL,
                result.anonymity.as_str().to_string(),
            ));
            ops.push(FieldOp::Set(FIELD_CONSECUTIVE_FAILS, "0".to_string()));
        } else {
            ops.push(FieldOp::Incr(FIELD_FAILURE_COUNT, 1));
            ops.push(FieldOp::Incr(FIELD_CONSECUTIVE_FAILS, 1));
        }

        if let Err(e) = self.store.apply(address, &ops).await {
            error!("Failed to update metrics for {}: {}", address, e);
        }
    }
}

#[async_trait]
impl Scorer for QualityScorer {
    async fn update_on_result(&self, address: &str, result: &ProbeResult) {
        self.apply_update(address, result, Utc::now()).await;
    }

    async fn score(&self, address: &str) -> f64 {
        let fields = match self.store.fetch(address).await {
            Ok(fields) => fields,
            Err(e) => {
                error!("Failed to fetch metrics for {}: {}", address, e);
                // Do not promote proxies we cannot measure.
                return 0.0;
            }
        };

        if fields.is_empty() {
            return INITIAL_SCORE;
        }

        let metrics = ProxyMetrics::from_fields(&fields);
        if metrics.total_observations() == 0 {
            return INITIAL_SCORE;
        }

        compute_score(&metrics, Utc::now())
    }

    async fn metrics(&self, address: &str) -> Option<ProxyMetrics> {
        let fields = match self.store.fetch(address).await {
            Ok(fields) => fields,
            Err(e) => {
                error!("Failed to fetch metrics for {}: {}", address, e);
                return None;
            }
        };
        if fields.is_empty() {
            return None;
        }
        Some(ProxyMetrics::from_fields(&fields))
    }

    async fn remove_metrics(&self, address: &str) -> Result<()> {
        self.store.remove(address).await
    }
}

/// Weighted quality score for a set of counters, clamped to [0, 1].
pub fn compute_score(metrics: &ProxyMetrics, now: DateTime<Utc>) -> f64 {
    let score = success_rate_score(metrics) * WEIGHT_SUCCESS_RATE
        + latency_score(metrics) * WEIGHT_LATENCY
        + anonymity_score(metrics.anonymity_level) * WEIGHT_ANONYMITY
        + stability_score(metrics, now) * WEIGHT_STABILITY;

    score.clamp(0.0, 1.0)
}

fn success_rate_score(m: &ProxyMetrics) -> f64 {
    let total = m.total_observations();
    if total == 0 {
        return 0.0;
    }
    m.success_count as f64 / total as f64
}

fn latency_score(m: &ProxyMetrics) -> f64 {
    if m.success_count == 0 {
        return 0.0;
    }
    let avg_latency = m.total_latency_ms as f64 / m.success_count as f64;
    (1.0 - avg_latency / MAX_LATENCY_MS).max(0.0)
}

pub(crate) fn anonymity_score(level: AnonymityLevel) -> f64 {
    match level {
        AnonymityLevel::Elite => 1.0,
        AnonymityLevel::Anonymous => 0.7,
        AnonymityLevel::Transparent => 0.3,
        AnonymityLevel::Unknown => 0.1,
    }
}

fn stability_score(m: &ProxyMetrics, now: DateTime<Utc>) -> f64 {
    let fail_penalty = (m.consecutive_failures as f64 / MAX_CONSECUTIVE_FAILS as f64).min(1.0);

    let recency_bonus = match m.last_success_at {
        Some(last_success) => {
            let hours_since = (now - last_success).num_seconds() as f64 / 3600.0;
            (1.0 - hours_since / RECENT_HOURS).max(0.0)
        }
        None => 0.0,
    };

    ((1.0 - fail_penalty) * (0.5 + 0.5 * recency_bonus)).max(0.0)
}
