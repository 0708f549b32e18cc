//! Provider adapters
//!
//! Each upstream vendor is one implementation of [`ProxyProvider`]: a single
//! capability that fetches a page of candidates and normalizes them into
//! canonical records. Adapters share no state; the ingestion loop decides
//! retry and backoff from the errors they surface.

pub mod webshare;

pub use webshare::{WebshareConfig, WebshareProvider};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::ProxyRecord;

/// Paging filter for a provider fetch.
#[derive(Debug, Clone)]
pub struct FetchFilter {
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
}

impl Default for FetchFilter {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 100,
        }
    }
}

/// One upstream proxy vendor.
#[async_trait]
pub trait ProxyProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Fetch one page of candidate proxies, normalized into canonical
    /// records. Entries the upstream marks invalid are filtered out before
    /// return. No per-proxy state is mutated on error.
    async fn fetch_batch(&self, filter: &FetchFilter) -> Result<Vec<ProxyRecord>>;
}
