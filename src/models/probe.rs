use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ProxyRecord;

/// How much a proxy reveals about its client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnonymityLevel {
    /// No leak: the target sees neither the client IP nor the fact of proxying
    Elite,
    /// The target sees proxy headers but not the client IP
    Anonymous,
    /// The target sees the client IP
    Transparent,
    #[default]
    Unknown,
}

impl AnonymityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnonymityLevel::Elite => "elite",
            AnonymityLevel::Anonymous => "anonymous",
            AnonymityLevel::Transparent => "transparent",
            AnonymityLevel::Unknown => "unknown",
        }
    }

    /// Parse a stored level; anything unrecognized maps to `Unknown`.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "elite" => AnonymityLevel::Elite,
            "anonymous" => AnonymityLevel::Anonymous,
            "transparent" => AnonymityLevel::Transparent,
            _ => AnonymityLevel::Unknown,
        }
    }
}

impl std::fmt::Display for AnonymityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reflection target used to probe a proxy.
#[derive(Debug, Clone)]
pub struct CheckTarget {
    /// Endpoint that echoes the observed client IP and request headers
    pub url: String,
    /// Substring the body must include to count as a valid reflection
    /// response; guards against captive portals that still return 200
    pub must_contain: String,
}

impl Default for CheckTarget {
    fn default() -> Self {
        Self {
            url: "https://httpbin.org/get".to_string(),
            must_contain: r#""origin""#.to_string(),
        }
    }
}

/// Outcome of one validation attempt against a proxy.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub available: bool,
    /// Time from request start to response headers; only meaningful when
    /// available
    pub latency: Duration,
    pub anonymity: AnonymityLevel,
    pub error_message: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl ProbeResult {
    pub fn success(latency: Duration, anonymity: AnonymityLevel) -> Self {
        Self {
            available: true,
            latency,
            anonymity,
            error_message: None,
            observed_at: Utc::now(),
        }
    }

    pub fn failure(error_message: impl Into<String>, latency: Duration) -> Self {
        Self {
            available: false,
            latency,
            anonymity: AnonymityLevel::Unknown,
            error_message: Some(error_message.into()),
            observed_at: Utc::now(),
        }
    }
}

/// Outcome of one end-user request tunneled through a proxy.
#[derive(Debug, Clone)]
pub struct UsageResult {
    pub proxy: ProxyRecord,
    pub success: bool,
    pub latency: Duration,
    pub error_message: Option<String>,
}

impl UsageResult {
    /// Lift into a `ProbeResult` for the scorer. Anonymity is not observable
    /// on the usage path and is always `Unknown`.
    pub fn to_probe_result(&self) -> ProbeResult {
        ProbeResult {
            available: self.success,
            latency: self.latency,
            anonymity: AnonymityLevel::Unknown,
            error_message: self.error_message.clone(),
            observed_at: Utc::now(),
        }
    }
}

/// Filter carried by a selection request.
#[derive(Debug, Clone, Default)]
pub struct SelectionRequest {
    /// Desired country code (ISO 3166-1 alpha-2); no country filter when None
    pub country: Option<String>,
    /// Permit non-elite proxies
    pub allow_insecure: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymity_level_parsing() {
        assert_eq!(AnonymityLevel::from_str("elite"), AnonymityLevel::Elite);
        assert_eq!(AnonymityLevel::from_str("ELITE"), AnonymityLevel::Elite);
        assert_eq!(
            AnonymityLevel::from_str("anonymous"),
            AnonymityLevel::Anonymous
        );
        assert_eq!(
            AnonymityLevel::from_str("transparent"),
            AnonymityLevel::Transparent
        );
        assert_eq!(AnonymityLevel::from_str("garbage"), AnonymityLevel::Unknown);
        assert_eq!(AnonymityLevel::from_str(""), AnonymityLevel::Unknown);

        assert_eq!(AnonymityLevel::Elite.to_string(), "elite");
    }

    #[test]
    fn test_usage_result_lifting() {
        let usage = UsageResult {
            proxy: ProxyRecord::new("2.2.2.2", 8888),
            success: true,
            latency: Duration::from_millis(100),
            error_message: None,
        };

        let probe = usage.to_probe_result();
        assert!(probe.available);
        assert_eq!(probe.latency, Duration::from_millis(100));
        assert_eq!(probe.anonymity, AnonymityLevel::Unknown);
        assert!(probe.error_message.is_none());

        let failed = UsageResult {
            proxy: ProxyRecord::new("2.2.2.2", 8888),
            success: false,
            latency: Duration::from_secs(5),
            error_message: Some("connection reset".to_string()),
        };
        let probe = failed.to_probe_result();
        assert!(!probe.available);
        assert_eq!(probe.error_message.as_deref(), Some("connection reset"));
    }
}
