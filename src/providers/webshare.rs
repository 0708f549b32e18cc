//! Webshare provider adapter
//!
//! Speaks the Webshare `/proxy/list/` API: token auth, page/page_size
//! pagination, and a `valid` flag per entry used to drop dead proxies before
//! they reach the validator queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{PoolError, Result};
use crate::models::ProxyRecord;
use crate::providers::{FetchFilter, ProxyProvider};

const DEFAULT_BASE_URL: &str = "https://proxy.webshare.io/api/v2";

/// Upstream error bodies are truncated to this many characters for diagnostics
const MAX_ERROR_BODY_LEN: usize = 512;

/// Webshare adapter configuration
#[derive(Debug, Clone)]
pub struct WebshareConfig {
    pub api_key: String,
    /// Override of the vendor base URL, mainly for tests
    pub base_url: String,
}

impl WebshareConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Top-level shape of the Webshare proxy list response
#[derive(Debug, Deserialize)]
struct ListResponse {
    #[allow(dead_code)]
    count: u64,
    #[allow(dead_code)]
    next: Option<String>,
    #[allow(dead_code)]
    previous: Option<String>,
    results: Vec<ListEntry>,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    id: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    proxy_address: String,
    port: u16,
    valid: bool,
    #[serde(default)]
    last_verification: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    city_name: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

/// Webshare implementation of [`ProxyProvider`].
pub struct WebshareProvider {
    client: reqwest::Client,
    config: WebshareConfig,
}

impl WebshareProvider {
    pub fn new(config: WebshareConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl ProxyProvider for WebshareProvider {
    fn name(&self) -> &'static str {
        "webshare"
    }

    async fn fetch_batch(&self, filter: &FetchFilter) -> Result<Vec<ProxyRecord>> {
        let url = format!(
            "{}/proxy/list/?mode=direct&page={}&page_size={}",
            self.config.base_url, filter.page, filter.page_size
        );

        let response = self
            .client
            .get(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Token {}", self.config.api_key),
            )
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = body.chars().take(MAX_ERROR_BODY_LEN).collect();
            return Err(PoolError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed: ListResponse = serde_json::from_str(&body)?;

        let fetched_at = Utc::now();
        Ok(parsed
            .results
            .into_iter()
            .filter(|entry| entry.valid)
            .map(|entry| to_record(entry, fetched_at))
            .collect())
    }
}

fn to_record(entry: ListEntry, fetched_at: DateTime<Utc>) -> ProxyRecord {
    ProxyRecord {
        address: entry.proxy_address,
        port: entry.port,
        username: entry.username.filter(|s| !s.is_empty()),
        password: entry.password.filter(|s| !s.is_empty()),
        country: entry.country_code.filter(|s| !s.is_empty()),
        city: entry.city_name.filter(|s| !s.is_empty()),
        provider_id: entry.id,
        first_seen: parse_upstream_time(entry.created_at.as_deref(), fetched_at),
        last_seen_at: parse_upstream_time(entry.last_verification.as_deref(), fetched_at),
    }
}

fn parse_upstream_time(raw: Option<&str>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> WebshareProvider {
        WebshareProvider::new(WebshareConfig {
            api_key: "test-key".to_string(),
            base_url: server.uri(),
        })
    }

    const LIST_BODY: &str = r#"{
        "count": 3,
        "next": null,
        "previous": null,
        "results": [
            {
                "id": "p1",
                "username": "u1",
                "password": "s1",
                "proxy_address": "1.1.1.1",
                "port": 8080,
                "valid": true,
                "last_verification": "2025-07-01T00:00:00Z",
                "country_code": "US",
                "city_name": "Dallas",
                "created_at": "2025-06-01T00:00:00Z"
            },
            {
                "id": "p2",
                "username": "u2",
                "password": "s2",
                "proxy_address": "2.2.2.2",
                "port": 9090,
                "valid": true,
                "last_verification": "not a timestamp",
                "country_code": "",
                "city_name": "",
                "created_at": null
            },
            {
                "id": "p3",
                "username": "u3",
                "password": "s3",
                "proxy_address": "3.3.3.3",
                "port": 7070,
                "valid": false,
                "last_verification": null,
                "country_code": "DE",
                "city_name": "Berlin",
                "created_at": null
            }
        ]
    }"#;

    #[tokio::test]
    async fn test_fetch_batch_filters_invalid_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/proxy/list/"))
            .and(query_param("mode", "direct"))
            .and(query_param("page", "2"))
            .and(query_param("page_size", "50"))
            .and(header("Authorization", "Token test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LIST_BODY))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let records = provider
            .fetch_batch(&FetchFilter {
                page: 2,
                page_size: 50,
            })
            .await
            .unwrap();

        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.address, "1.1.1.1");
        assert_eq!(first.port, 8080);
        assert_eq!(first.username.as_deref(), Some("u1"));
        assert_eq!(first.country.as_deref(), Some("US"));
        assert_eq!(first.city.as_deref(), Some("Dallas"));
        assert_eq!(first.provider_id, "p1");
        assert_eq!(
            first.first_seen,
            DateTime::parse_from_rfc3339("2025-06-01T00:00:00Z").unwrap()
        );

        // Empty strings normalize to None; bad timestamps fall back to now.
        let second = &records[1];
        assert_eq!(second.address, "2.2.2.2");
        assert!(second.country.is_none());
        assert!(second.city.is_none());
        assert!(second.last_seen_at <= Utc::now());
    }

    #[tokio::test]
    async fn test_fetch_batch_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/proxy/list/"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider.fetch_batch(&FetchFilter::default()).await.unwrap_err();

        match err {
            PoolError::Upstream { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid token");
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_batch_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/proxy/list/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider.fetch_batch(&FetchFilter::default()).await.unwrap_err();
        assert!(matches!(err, PoolError::Decode(_)));
    }

    #[tokio::test]
    async fn test_fetch_batch_transport_error() {
        // Port from the discard service range with no listener.
        let provider = WebshareProvider::new(WebshareConfig {
            api_key: "test-key".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
        });

        let err = provider.fetch_batch(&FetchFilter::default()).await.unwrap_err();
        assert!(matches!(err, PoolError::Transport(_)));
    }
}
