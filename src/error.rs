use thiserror::Error;

/// Unified error type for the Flotilla control plane
#[derive(Error, Debug)]
pub enum PoolError {
    // Selection errors
    #[error("No proxy available")]
    NoProxyAvailable,

    // Provider errors
    #[error("Provider transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Provider returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Failed to decode provider response: {0}")]
    Decode(#[from] serde_json::Error),

    // Store errors
    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    // Pool integrity errors
    #[error("Invalid pool member: {0}")]
    InvalidMember(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for Flotilla operations
pub type Result<T> = std::result::Result<T, PoolError>;
