//! Proxy scheduling
//!
//! Owns the live pool: enrolls validated proxies, serves best-match
//! selections in descending score order, and folds usage feedback back into
//! the scorer and the pool index. The scheduler keeps no mutable state of its
//! own; the backing stores provide the atomicity.

use std::sync::Arc;

use tracing::{error, warn};

use crate::error::{PoolError, Result};
use crate::models::{
    parse_member, AnonymityLevel, ProxyRecord, SelectionRequest, UsageResult,
};
use crate::scorer::{Scorer, MAX_CONSECUTIVE_FAILS};
use crate::store::{LivePool, MetadataStore};

/// Page size used when scanning the pool in descending score order
const SELECT_PAGE_SIZE: usize = 100;

/// Schedules proxies out of the live pool.
pub struct Scheduler {
    scorer: Arc<dyn Scorer>,
    pool: Arc<dyn LivePool>,
    meta: Arc<dyn MetadataStore>,
    /// Retire on the usage path once consecutive failures reach the shared
    /// threshold, instead of re-indexing
    auto_retire: bool,
}

impl Scheduler {
    pub fn new(
        scorer: Arc<dyn Scorer>,
        pool: Arc<dyn LivePool>,
        meta: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            scorer,
            pool,
            meta,
            auto_retire: false,
        }
    }

    pub fn with_auto_retire(mut self, auto_retire: bool) -> Self {
        self.auto_retire = auto_retire;
        self
    }

    /// Add a proxy to the live pool, indexed by its current score (the
    /// initial score for a first-ever observation). Failures are logged;
    /// enrollment is best-effort.
    pub async fn enroll(&self, proxy: &ProxyRecord) {
        let member = proxy.member();
        let score = self.scorer.score(&proxy.address).await;

        if let Err(e) = self.pool.upsert(&member, score).await {
            error!("Failed to enroll {} in live pool: {}", member, e);
            return;
        }
        if let Err(e) = self.meta.put(&member, proxy).await {
            error!("Failed to store metadata for {}: {}", member, e);
        }
    }

    /// Remove a proxy from the live pool and drop its counters. Each failure
    /// is logged independently; retirement is best-effort.
    pub async fn retire(&self, proxy: &ProxyRecord) {
        let member = proxy.member();

        if let Err(e) = self.pool.remove(&member).await {
            error!("Failed to remove {} from live pool: {}", member, e);
        }
        if let Err(e) = self.meta.remove(&member).await {
            error!("Failed to remove metadata for {}: {}", member, e);
        }
        if let Err(e) = self.scorer.remove_metrics(&proxy.address).await {
            error!("Failed to remove metrics for {}: {}", proxy.address, e);
        }
    }

    /// Select the highest-scored proxy satisfying the request filter.
    ///
    /// Members are scanned in descending score order; malformed members are
    /// logged and skipped. Returns `PoolError::NoProxyAvailable` when the
    /// pool is empty or fully filtered out.
    pub async fn select_best(&self, request: &SelectionRequest) -> Result<ProxyRecord> {
        let mut offset = 0;

        loop {
            let page = self.pool.top_range(offset, SELECT_PAGE_SIZE).await?;
            if page.is_empty() {
                return Err(PoolError::NoProxyAvailable);
            }

            for entry in &page {
                let (address, port) = match parse_member(&entry.member) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!("Skipping malformed pool member: {}", e);
                        continue;
                    }
                };

                if self.matches(&entry.member, &address, request).await {
                    return Ok(self.resolve_record(&entry.member, address, port).await);
                }
            }

            offset += SELECT_PAGE_SIZE;
        }
    }

    /// Fold a usage outcome back into the counters and the pool index.
    pub async fn report_usage(&self, usage: &UsageResult) {
        let address = &usage.proxy.address;
        let probe = usage.to_probe_result();

        self.scorer.update_on_result(address, &probe).await;

        if self.auto_retire && !usage.success {
            if let Some(metrics) = self.scorer.metrics(address).await {
                if metrics.consecutive_failures >= MAX_CONSECUTIVE_FAILS {
                    warn!(
                        proxy = %usage.proxy,
                        consecutive_failures = metrics.consecutive_failures,
                        "Retiring proxy after repeated failures"
                    );
                    self.retire(&usage.proxy).await;
                    return;
                }
            }
        }

        let score = self.scorer.score(address).await;
        let member = usage.proxy.member();
        if let Err(e) = self.pool.upsert(&member, score).await {
            error!("Failed to re-index {} after usage report: {}", member, e);
        }
    }

    async fn matches(&self, member: &str, address: &str, request: &SelectionRequest) -> bool {
        if let Some(wanted) = request.country.as_deref() {
            let country = match self.meta.get(member).await {
                Ok(Some(record)) => record.country,
                Ok(None) => None,
                Err(e) => {
                    warn!("Failed to read metadata for {}: {}", member, e);
                    None
                }
            };
            match country {
                Some(country) if country.eq_ignore_ascii_case(wanted) => {}
                _ => return false,
            }
        }

        if !request.allow_insecure {
            let anonymity = self
                .scorer
                .metrics(address)
                .await
                .map(|m| m.anonymity_level)
                .unwrap_or(AnonymityLevel::Unknown);
            if anonymity != AnonymityLevel::Elite {
                return false;
            }
        }

        true
    }

    /// Build the returned record, preferring stored metadata over the bare
    /// parsed identity. Callers tolerate missing optional fields.
    async fn resolve_record(&self, member: &str, address: String, port: u16) -> ProxyRecord {
        match self.meta.get(member).await {
            Ok(Some(record)) => record,
            Ok(None) => ProxyRecord::new(address, port),
            Err(e) => {
                warn!("Failed to read metadata for {}: {}", member, e);
                ProxyRecord::new(address, port)
            }
        }
    }
}
