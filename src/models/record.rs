use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PoolError, Result};

/// Canonical identity of a proxy endpoint.
///
/// `(address, port)` is the unique key in the live pool; `address` alone keys
/// score aggregation, so a proxy exposing several ports shares reputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRecord {
    /// Textual IPv4/IPv6 literal, no port. IPv6 literals keep their brackets.
    pub address: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub password: Option<String>,
    /// ISO 3166-1 alpha-2 country code
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub city: Option<String>,
    /// Opaque identifier of the upstream source
    pub provider_id: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl ProxyRecord {
    /// Create a minimal record carrying only the endpoint identity.
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        let now = Utc::now();
        Self {
            address: address.into(),
            port,
            username: None,
            password: None,
            country: None,
            city: None,
            provider_id: String::new(),
            first_seen: now,
            last_seen_at: now,
        }
    }

    /// Live-pool member key for this record.
    pub fn member(&self) -> String {
        format_member(&self.address, self.port)
    }

    /// Proxy endpoint URL without credentials (credentials are passed
    /// out-of-band as basic auth).
    pub fn proxy_url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }

    pub fn has_credentials(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
    }
}

impl std::fmt::Display for ProxyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Format an `"<address>:<port>"` live-pool member.
pub fn format_member(address: &str, port: u16) -> String {
    format!("{}:{}", address, port)
}

/// Parse an `"<address>:<port>"` live-pool member.
///
/// Splits on the last `:` so bracketed IPv6 literals survive the round trip.
/// The port must be a decimal in [1, 65535].
pub fn parse_member(member: &str) -> Result<(String, u16)> {
    let (address, port_str) = member
        .rsplit_once(':')
        .ok_or_else(|| PoolError::InvalidMember(member.to_string()))?;

    if address.is_empty() {
        return Err(PoolError::InvalidMember(member.to_string()));
    }

    let port: u16 = port_str
        .parse()
        .map_err(|_| PoolError::InvalidMember(member.to_string()))?;
    if port == 0 {
        return Err(PoolError::InvalidMember(member.to_string()));
    }

    Ok((address.to_string(), port))
}
