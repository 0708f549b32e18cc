use std::env;
use std::time::Duration;

use url::Url;

use crate::error::{PoolError, Result};
use crate::models::CheckTarget;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Backing store configuration
    pub store: StoreConfig,
    /// Webshare provider configuration
    pub webshare: WebshareSettings,
    /// Validator configuration
    pub validator: ValidatorSettings,
    /// Ingestion loop configuration
    pub ingestion: IngestionSettings,
    /// Retirement sweep configuration
    pub retirement: RetirementSettings,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Redis connection URL
    pub redis_url: String,
}

#[derive(Debug, Clone)]
pub struct WebshareSettings {
    /// API token; the webshare provider is disabled when empty
    pub api_key: String,
    /// Vendor base URL (overridable for tests)
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct ValidatorSettings {
    /// Per-probe timeout in seconds
    pub probe_timeout: u64,
    /// Endpoint echoing the caller's public IP
    pub ip_echo_url: String,
    /// Reflection target URL probed through each proxy
    pub check_url: String,
    /// Substring the reflection body must contain
    pub check_must_contain: String,
}

#[derive(Debug, Clone)]
pub struct IngestionSettings {
    /// Seconds between provider polls
    pub poll_interval: u64,
    /// Page size requested from providers
    pub page_size: u32,
    /// Page cap per provider per round
    pub max_pages: u32,
    /// Concurrent validation probes
    pub validation_workers: usize,
}

#[derive(Debug, Clone)]
pub struct RetirementSettings {
    /// Seconds between sweeps
    pub sweep_interval: u64,
    /// Whether the sweep runs at all
    pub enabled: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let webshare_base_url = get_env_or("WEBSHARE_BASE_URL", "https://proxy.webshare.io/api/v2");
        validate_url("WEBSHARE_BASE_URL", &webshare_base_url)?;

        let check_url = get_env_or("CHECK_URL", "https://httpbin.org/get");
        validate_url("CHECK_URL", &check_url)?;

        let ip_echo_url = get_env_or("IP_ECHO_URL", "https://api.ipify.org");
        validate_url("IP_ECHO_URL", &ip_echo_url)?;

        Ok(Config {
            store: StoreConfig {
                redis_url: get_env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            },
            webshare: WebshareSettings {
                api_key: get_env_or("WEBSHARE_API_KEY", ""),
                base_url: webshare_base_url,
            },
            validator: ValidatorSettings {
                probe_timeout: get_env_or("PROBE_TIMEOUT_SECS", "10")
                    .parse()
                    .unwrap_or(10),
                ip_echo_url,
                check_url,
                check_must_contain: get_env_or("CHECK_MUST_CONTAIN", r#""origin""#),
            },
            ingestion: IngestionSettings {
                poll_interval: get_env_or("POLL_INTERVAL_SECS", "300")
                    .parse()
                    .unwrap_or(300),
                page_size: get_env_or("PROVIDER_PAGE_SIZE", "100").parse().map_err(|_| {
                    PoolError::InvalidConfig("PROVIDER_PAGE_SIZE must be a positive number".into())
                })?,
                max_pages: get_env_or("PROVIDER_MAX_PAGES", "10").parse().unwrap_or(10),
                validation_workers: get_env_or("VALIDATION_WORKERS", "20")
                    .parse()
                    .map_err(|_| {
                        PoolError::InvalidConfig(
                            "VALIDATION_WORKERS must be a positive number".into(),
                        )
                    })?,
            },
            retirement: RetirementSettings {
                sweep_interval: get_env_or("RETIRE_SWEEP_INTERVAL_SECS", "60")
                    .parse()
                    .unwrap_or(60),
                enabled: get_env_or("RETIRE_SWEEP_ENABLED", "true")
                    .parse()
                    .unwrap_or(true),
            },
        })
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.validator.probe_timeout.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.ingestion.poll_interval.max(1))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retirement.sweep_interval.max(1))
    }

    pub fn check_target(&self) -> CheckTarget {
        CheckTarget {
            url: self.validator.check_url.clone(),
            must_contain: self.validator.check_must_contain.clone(),
        }
    }
}

fn validate_url(key: &str, value: &str) -> Result<()> {
    Url::parse(value)
        .map_err(|e| PoolError::InvalidConfig(format!("{} must be a valid URL: {}", key, e)))?;
    Ok(())
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const CONFIG_ENV_KEYS: &[&str] = &[
        "REDIS_URL",
        "WEBSHARE_API_KEY",
        "WEBSHARE_BASE_URL",
        "PROBE_TIMEOUT_SECS",
        "IP_ECHO_URL",
        "CHECK_URL",
        "CHECK_MUST_CONTAIN",
        "POLL_INTERVAL_SECS",
        "PROVIDER_PAGE_SIZE",
        "PROVIDER_MAX_PAGES",
        "VALIDATION_WORKERS",
        "RETIRE_SWEEP_INTERVAL_SECS",
        "RETIRE_SWEEP_ENABLED",
    ];

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|&key| {
                    let old = env::var(key).ok();
                    env::remove_var(key);
                    (key.to_string(), old)
                })
                .collect();

            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let config = Config::from_env().unwrap();

        assert_eq!(config.store.redis_url, "redis://127.0.0.1:6379");
        assert!(config.webshare.api_key.is_empty());
        assert_eq!(config.webshare.base_url, "https://proxy.webshare.io/api/v2");
        assert_eq!(config.probe_timeout(), Duration::from_secs(10));
        assert_eq!(config.poll_interval(), Duration::from_secs(300));
        assert_eq!(config.ingestion.page_size, 100);
        assert!(config.retirement.enabled);

        let target = config.check_target();
        assert_eq!(target.url, "https://httpbin.org/get");
        assert_eq!(target.must_contain, r#""origin""#);
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("REDIS_URL", "redis://redis.internal:6380/1");
        env::set_var("WEBSHARE_API_KEY", "secret");
        env::set_var("WEBSHARE_BASE_URL", "http://localhost:9000/api");
        env::set_var("PROBE_TIMEOUT_SECS", "3");
        env::set_var("PROVIDER_PAGE_SIZE", "25");
        env::set_var("VALIDATION_WORKERS", "8");
        env::set_var("RETIRE_SWEEP_ENABLED", "false");

        let config = Config::from_env().unwrap();

        assert_eq!(config.store.redis_url, "redis://redis.internal:6380/1");
        assert_eq!(config.webshare.api_key, "secret");
        assert_eq!(config.webshare.base_url, "http://localhost:9000/api");
        assert_eq!(config.probe_timeout(), Duration::from_secs(3));
        assert_eq!(config.ingestion.page_size, 25);
        assert_eq!(config.ingestion.validation_workers, 8);
        assert!(!config.retirement.enabled);
    }

    #[test]
    fn test_config_from_env_invalid_page_size() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("PROVIDER_PAGE_SIZE", "lots");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_from_env_invalid_check_url() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("CHECK_URL", "not a url");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[test]
    fn test_timeouts_have_a_floor() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("PROBE_TIMEOUT_SECS", "0");
        env::set_var("POLL_INTERVAL_SECS", "0");

        let config = Config::from_env().unwrap();
        assert_eq!(config.probe_timeout(), Duration::from_secs(1));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }
}
