//! Retirement sweep
//!
//! Periodically walks the live pool and retires proxies whose consecutive
//! failure count has reached the same threshold the stability sub-score
//! saturates at, so tuning one tunes the other.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::models::{parse_member, ProxyRecord};
use crate::scheduler::Scheduler;
use crate::scorer::{Scorer, MAX_CONSECUTIVE_FAILS};
use crate::store::LivePool;

/// Page size used when walking the pool
const SWEEP_PAGE_SIZE: usize = 100;

/// Retirement sweep configuration
#[derive(Clone)]
pub struct RetirementConfig {
    /// How often to sweep the pool
    pub sweep_interval: Duration,
}

impl Default for RetirementConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Retirement sweep service
pub struct RetirementService {
    scheduler: Arc<Scheduler>,
    scorer: Arc<dyn Scorer>,
    pool: Arc<dyn LivePool>,
    config: RetirementConfig,
}

impl RetirementService {
    pub fn new(
        scheduler: Arc<Scheduler>,
        scorer: Arc<dyn Scorer>,
        pool: Arc<dyn LivePool>,
        config: RetirementConfig,
    ) -> Self {
        Self {
            scheduler,
            scorer,
            pool,
            config,
        }
    }

    /// Run the retirement sweep (call in a spawned task)
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting retirement sweep with {}s interval",
            self.config.sweep_interval.as_secs()
        );

        let mut ticker = interval(self.config.sweep_interval);
        ticker.tick().await; // Skip immediate tick

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        warn!("Retirement sweep failed: {}", e);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Retirement sweep shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One full sweep over the pool.
    pub async fn sweep_once(&self) -> Result<()> {
        // Collect candidates first; retiring while paging would shift
        // offsets under the scan.
        let mut expired: Vec<ProxyRecord> = Vec::new();
        let mut offset = 0;

        loop {
            let page = self.pool.top_range(offset, SWEEP_PAGE_SIZE).await?;
            if page.is_empty() {
                break;
            }

            for entry in &page {
                let (address, port) = match parse_member(&entry.member) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!("Skipping malformed pool member: {}", e);
                        continue;
                    }
                };

                if let Some(metrics) = self.scorer.metrics(&address).await {
                    if metrics.consecutive_failures >= MAX_CONSECUTIVE_FAILS {
                        expired.push(ProxyRecord::new(address, port));
                    }
                }
            }

            offset += SWEEP_PAGE_SIZE;
        }

        let retired = expired.len();
        for proxy in &expired {
            self.scheduler.retire(proxy).await;
        }

        if retired > 0 {
            info!(count = retired, "Retired persistently failing proxies");
        }

        Ok(())
    }
}

/// Guard for managing the retirement sweep lifecycle
pub struct RetirementHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl RetirementHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for RetirementHandle {
    fn default() -> Self {
        Self::new().0
    }
}
