//! Proxy validation
//!
//! Probes a proxy by fetching a reflection target through it, measures the
//! time to response headers, and classifies the anonymity level from the
//! echoed request headers. Probe failures are data, not errors: they come
//! back as `ProbeResult { available: false, .. }` and feed the scorer like
//! any other observation.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::{AnonymityLevel, CheckTarget, ProbeResult, ProxyRecord};

const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_IP_ECHO_URL: &str = "https://api.ipify.org";

/// Browser-like User-Agent so probe traffic resembles real client traffic
const PROBE_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

/// Header names whose presence marks a proxy as merely anonymous
const PROXY_HEADER_KEYS: [&str; 5] = [
    "Via",
    "X-Forwarded-For",
    "Forwarded",
    "X-Proxy-Id",
    "Proxy-Connection",
];

/// Validator configuration
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Timeout applied to each probe
    pub probe_timeout: Duration,
    /// Endpoint returning the caller's public IP as a plain-text body
    pub ip_echo_url: String,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            ip_echo_url: DEFAULT_IP_ECHO_URL.to_string(),
        }
    }
}

/// Shape of the reflection-target body; extra fields are tolerated.
#[derive(Debug, Deserialize)]
struct ReflectionBody {
    #[serde(default)]
    #[allow(dead_code)]
    origin: String,
    #[serde(default)]
    headers: HashMap<String, String>,
}

/// Probes proxies against a reflection target.
pub struct Validator {
    probe_timeout: Duration,
    /// The validator's own public IP, captured once at construction. Empty
    /// when discovery failed; transparent-vs-elite classification is then
    /// degraded but probing still works.
    public_ip: String,
}

impl Validator {
    /// Build a validator, discovering the local public IP via the configured
    /// echo endpoint.
    pub async fn new(config: ValidatorConfig) -> Self {
        let public_ip = match discover_public_ip(&config.ip_echo_url, config.probe_timeout).await {
            Ok(ip) => {
                debug!("Validator public IP: {}", ip);
                ip
            }
            Err(e) => {
                warn!(
                    "Failed to discover public IP, anonymity checks degraded: {}",
                    e
                );
                String::new()
            }
        };

        Self {
            probe_timeout: config.probe_timeout,
            public_ip,
        }
    }

    /// Build a validator with a known public IP (no discovery call).
    pub fn with_public_ip(probe_timeout: Duration, public_ip: impl Into<String>) -> Self {
        Self {
            probe_timeout,
            public_ip: public_ip.into(),
        }
    }

    /// Probe one proxy against the target. Never fails: every failure mode is
    /// encoded in the returned `ProbeResult`.
    pub async fn validate(&self, proxy: &ProxyRecord, target: &CheckTarget) -> ProbeResult {
        let client = match self.build_client(proxy) {
            Ok(client) => client,
            Err(e) => return ProbeResult::failure(e.to_string(), Duration::ZERO),
        };

        let start = Instant::now();
        let response = client
            .get(&target.url)
            .header(reqwest::header::USER_AGENT, PROBE_USER_AGENT)
            .send()
            .await;
        let latency = start.elapsed();

        let response = match response {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return ProbeResult::failure("context deadline exceeded", latency);
            }
            Err(e) => return ProbeResult::failure(e.to_string(), latency),
        };

        if response.status() != reqwest::StatusCode::OK {
            return ProbeResult::failure(
                format!("bad status code: {}", response.status().as_u16()),
                latency,
            );
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(_) => return ProbeResult::failure("failed to read response body", latency),
        };

        // The content check runs last so a dead upstream shows up as a bad
        // status rather than a mismatch; it catches captive portals and
        // blocked-page responses that still return 200.
        if !target.must_contain.is_empty() {
            let text = String::from_utf8_lossy(&body);
            if !text.contains(&target.must_contain) {
                warn!(proxy = %proxy, "Response body missing expected content");
                return ProbeResult::failure("response content mismatch", latency);
            }
        }

        ProbeResult::success(latency, self.detect_anonymity(&body))
    }

    fn build_client(&self, proxy: &ProxyRecord) -> reqwest::Result<reqwest::Client> {
        let mut routed = reqwest::Proxy::all(proxy.proxy_url())?;
        if proxy.has_credentials() {
            routed = routed.basic_auth(
                proxy.username.as_deref().unwrap_or_default(),
                proxy.password.as_deref().unwrap_or_default(),
            );
        }

        reqwest::Client::builder()
            .proxy(routed)
            .timeout(self.probe_timeout)
            .build()
    }

    /// Classify anonymity from the reflection body.
    fn detect_anonymity(&self, body: &[u8]) -> AnonymityLevel {
        let reflection: ReflectionBody = match serde_json::from_slice(body) {
            Ok(reflection) => reflection,
            Err(e) => {
                warn!("Failed to decode reflection body: {}", e);
                return AnonymityLevel::Unknown;
            }
        };

        if !self.public_ip.is_empty()
            && reflection
                .headers
                .values()
                .any(|value| value.contains(&self.public_ip))
        {
            return AnonymityLevel::Transparent;
        }

        let has_proxy_headers = reflection.headers.keys().any(|key| {
            PROXY_HEADER_KEYS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(key))
        });
        if has_proxy_headers {
            return AnonymityLevel::Anonymous;
        }

        AnonymityLevel::Elite
    }
}

async fn discover_public_ip(url: &str, timeout: Duration) -> crate::error::Result<String> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let body = client
        .get(url)
        .header(reqwest::header::USER_AGENT, "flotilla-validator")
        .send()
        .await?
        .text()
        .await?;
    Ok(body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{any, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FAKE_PUBLIC_IP: &str = "1.2.3.4";

    fn proxy_record_for(server: &MockServer) -> ProxyRecord {
        let addr = server.address();
        ProxyRecord::new(addr.ip().to_string(), addr.port())
    }

    fn check_target() -> CheckTarget {
        CheckTarget {
            // Plain-http target: the request is sent absolute-form to the
            // mock "proxy", which answers for it.
            url: "http://reflection.test/get".to_string(),
            must_contain: r#""origin""#.to_string(),
        }
    }

    async fn mock_proxy_replying(body: &str, status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(status).set_body_string(body.to_string()))
            .mount(&server)
            .await;
        server
    }

    async fn run_probe(server: &MockServer) -> ProbeResult {
        let validator = Validator::with_public_ip(Duration::from_millis(500), FAKE_PUBLIC_IP);
        validator
            .validate(&proxy_record_for(server), &check_target())
            .await
    }

    #[tokio::test]
    async fn test_elite_proxy() {
        let server = mock_proxy_replying(r#"{"origin":"5.5.5.5","headers":{}}"#, 200).await;
        let result = run_probe(&server).await;
        assert!(result.available);
        assert_eq!(result.anonymity, AnonymityLevel::Elite);
        assert!(result.error_message.is_none());
    }

    #[tokio::test]
    async fn test_anonymous_proxy_via_header() {
        let server = mock_proxy_replying(
            r#"{"origin":"5.5.5.5","headers":{"Via":"1.1 CachingProxy"}}"#,
            200,
        )
        .await;
        let result = run_probe(&server).await;
        assert!(result.available);
        assert_eq!(result.anonymity, AnonymityLevel::Anonymous);
    }

    #[tokio::test]
    async fn test_anonymous_proxy_case_insensitive_header() {
        let server = mock_proxy_replying(
            r#"{"origin":"5.5.5.5","headers":{"x-forwarded-for":"10.0.0.1"}}"#,
            200,
        )
        .await;
        let result = run_probe(&server).await;
        assert_eq!(result.anonymity, AnonymityLevel::Anonymous);
    }

    #[tokio::test]
    async fn test_transparent_proxy_leaks_public_ip() {
        let body = format!(
            r#"{{"origin":"5.5.5.5","headers":{{"X-Forwarded-For":"{}"}}}}"#,
            FAKE_PUBLIC_IP
        );
        let server = mock_proxy_replying(&body, 200).await;
        let result = run_probe(&server).await;
        assert!(result.available);
        assert_eq!(result.anonymity, AnonymityLevel::Transparent);
    }

    #[tokio::test]
    async fn test_non_json_body_with_expected_content_is_unknown() {
        let server = mock_proxy_replying(r#"plain text mentioning "origin" only"#, 200).await;
        let result = run_probe(&server).await;
        assert!(result.available);
        assert_eq!(result.anonymity, AnonymityLevel::Unknown);
    }

    #[tokio::test]
    async fn test_bad_status_code() {
        let server = mock_proxy_replying("not found", 404).await;
        let result = run_probe(&server).await;
        assert!(!result.available);
        assert_eq!(result.error_message.as_deref(), Some("bad status code: 404"));
    }

    #[tokio::test]
    async fn test_content_mismatch() {
        let server = mock_proxy_replying(r#"{"some_other_content":"nothing"}"#, 200).await;
        let result = run_probe(&server).await;
        assert!(!result.available);
        assert_eq!(
            result.error_message.as_deref(),
            Some("response content mismatch")
        );
    }

    #[tokio::test]
    async fn test_probe_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"origin":"5.5.5.5","headers":{}}"#)
                    .set_delay(Duration::from_millis(400)),
            )
            .mount(&server)
            .await;

        let validator = Validator::with_public_ip(Duration::from_millis(100), FAKE_PUBLIC_IP);
        let result = validator
            .validate(&proxy_record_for(&server), &check_target())
            .await;

        assert!(!result.available);
        assert!(result
            .error_message
            .as_deref()
            .unwrap()
            .contains("context deadline exceeded"));
    }

    #[tokio::test]
    async fn test_unreachable_proxy() {
        // Reserved port with nothing listening.
        let proxy = ProxyRecord::new("127.0.0.1", 9);
        let validator = Validator::with_public_ip(Duration::from_millis(500), FAKE_PUBLIC_IP);
        let result = validator.validate(&proxy, &check_target()).await;

        assert!(!result.available);
        assert!(result.error_message.is_some());
    }

    #[tokio::test]
    async fn test_public_ip_discovery() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("203.0.113.7\n"))
            .mount(&server)
            .await;

        let validator = Validator::new(ValidatorConfig {
            probe_timeout: Duration::from_millis(500),
            ip_echo_url: format!("{}/ip", server.uri()),
        })
        .await;

        assert_eq!(validator.public_ip, "203.0.113.7");
    }
}
