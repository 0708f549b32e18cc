//! Proxy ingestion
//!
//! Periodically polls every configured provider, probes the candidates
//! through the validator with bounded concurrency, feeds each outcome into
//! the scorer, and enrolls proxies that came back available. Provider
//! failures discard that provider's batch for the round and are retried on
//! the next tick; they never mutate per-proxy state.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info, instrument, warn};

use crate::models::{CheckTarget, ProxyRecord};
use crate::providers::{FetchFilter, ProxyProvider};
use crate::scheduler::Scheduler;
use crate::scorer::Scorer;
use crate::validator::Validator;

/// Ingestion service configuration
#[derive(Clone)]
pub struct IngestionConfig {
    /// Interval between provider polls
    pub poll_interval: Duration,
    /// Page size requested from providers
    pub page_size: u32,
    /// Upper bound on pages fetched per provider per round
    pub max_pages: u32,
    /// Concurrent validation probes per round
    pub validation_workers: usize,
    /// Reflection target probed through each candidate
    pub check_target: CheckTarget,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
            page_size: 100,
            max_pages: 10,
            validation_workers: 20,
            check_target: CheckTarget::default(),
        }
    }
}

/// Ingestion service: providers in, enrolled proxies out.
pub struct IngestionService {
    providers: Vec<Arc<dyn ProxyProvider>>,
    validator: Arc<Validator>,
    scorer: Arc<dyn Scorer>,
    scheduler: Arc<Scheduler>,
    config: IngestionConfig,
}

impl IngestionService {
    pub fn new(
        providers: Vec<Arc<dyn ProxyProvider>>,
        validator: Arc<Validator>,
        scorer: Arc<dyn Scorer>,
        scheduler: Arc<Scheduler>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            providers,
            validator,
            scorer,
            scheduler,
            config,
        }
    }

    /// Run the ingestion loop (call in a spawned task)
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting ingestion with {}s interval, {} provider(s)",
            self.config.poll_interval.as_secs(),
            self.providers.len()
        );

        let mut ticker = interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Ingestion shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One full ingestion round: fetch, validate, score, enroll.
    pub async fn poll_once(&self) {
        let candidates = self.fetch_candidates().await;
        if candidates.is_empty() {
            return;
        }

        let total = candidates.len();
        let enrolled = futures::stream::iter(candidates)
            .map(|record| async move {
                let probe = self
                    .validator
                    .validate(&record, &self.config.check_target)
                    .await;

                self.scorer.update_on_result(&record.address, &probe).await;

                if probe.available {
                    let mut record = record;
                    record.last_seen_at = probe.observed_at;
                    self.scheduler.enroll(&record).await;
                    true
                } else {
                    false
                }
            })
            .buffer_unordered(self.config.validation_workers)
            .filter(|enrolled| futures::future::ready(*enrolled))
            .count()
            .await;

        info!(
            "Ingestion round complete: {} candidate(s), {} enrolled",
            total, enrolled
        );
    }

    /// Page through every provider, collecting candidates. A provider error
    /// discards the rest of that provider's batch for this round.
    async fn fetch_candidates(&self) -> Vec<ProxyRecord> {
        let mut candidates = Vec::new();

        for provider in &self.providers {
            let mut page = 1;
            loop {
                let filter = FetchFilter {
                    page,
                    page_size: self.config.page_size,
                };

                match provider.fetch_batch(&filter).await {
                    Ok(records) => {
                        let fetched = records.len();
                        candidates.extend(records);
                        if fetched < self.config.page_size as usize
                            || page >= self.config.max_pages
                        {
                            break;
                        }
                        page += 1;
                    }
                    Err(e) => {
                        error!("Provider {} fetch failed: {}", provider.name(), e);
                        break;
                    }
                }
            }
        }

        if candidates.is_empty() {
            warn!("No candidates fetched from any provider");
        }
        candidates
    }
}

/// Guard for managing the ingestion service lifecycle
pub struct IngestionHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl IngestionHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for IngestionHandle {
    fn default() -> Self {
        Self::new().0
    }
}
