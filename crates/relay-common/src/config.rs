//! Client configuration
//!
//! Loads configuration from environment variables with sensible defaults.

use relay_protocol::Intents;
use std::env;
use std::time::Duration;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Reconnect backoff parameters
///
/// Exponential backoff with jitter, capped at `max_ms`. Jitter spreads
/// simultaneous reconnects from many independent connections.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Base delay in milliseconds for the first retry
    pub base_ms: u64,
    /// Maximum delay cap in milliseconds
    pub max_ms: u64,
    /// Multiplier applied per failed attempt
    pub multiplier: f64,
    /// Jitter factor in `[0, 1]`, applied as `delay * (1 ± jitter * rand)`
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            max_ms: 60_000,
            multiplier: 2.0,
            jitter: 0.3,
        }
    }
}

/// REST dispatcher parameters
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Maximum in-flight requests across all buckets
    pub max_inflight: usize,
    /// How many times a single logical request may be re-submitted
    /// after a 429 or a transient network failure
    pub retry_budget: u32,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            max_inflight: 16,
            retry_budget: 3,
        }
    }
}

/// Main client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Authentication token
    pub token: String,

    /// Gateway WebSocket URL
    pub gateway_url: String,

    /// REST API base URL
    pub api_base_url: String,

    /// Capability bitmask sent with Identify
    pub intents: Intents,

    /// Reconnect backoff policy
    pub backoff: BackoffConfig,

    /// REST dispatcher limits
    pub rest: RestConfig,

    /// How long to wait for the server Hello after the socket opens
    pub handshake_timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration with defaults for everything but the token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            gateway_url: default_gateway_url(),
            api_base_url: default_api_base_url(),
            intents: Intents::default_set(),
            backoff: BackoffConfig::default(),
            rest: RestConfig::default(),
            handshake_timeout: Duration::from_secs(10),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// `RELAY_TOKEN` is required; everything else falls back to defaults:
    /// `RELAY_GATEWAY_URL`, `RELAY_API_BASE_URL`, `RELAY_INTENTS`,
    /// `RELAY_MAX_INFLIGHT`, `RELAY_RETRY_BUDGET`, `RELAY_BACKOFF_BASE_MS`,
    /// `RELAY_BACKOFF_MAX_MS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let token = env::var("RELAY_TOKEN").map_err(|_| ConfigError::MissingVar("RELAY_TOKEN"))?;
        let mut config = Self::new(token);

        if let Ok(url) = env::var("RELAY_GATEWAY_URL") {
            config.gateway_url = url;
        }
        if let Ok(url) = env::var("RELAY_API_BASE_URL") {
            config.api_base_url = url;
        }
        if let Ok(bits) = env::var("RELAY_INTENTS") {
            let bits: u64 = bits.parse().map_err(|_| ConfigError::InvalidValue {
                name: "RELAY_INTENTS",
                value: bits.clone(),
            })?;
            config.intents = Intents::from_bits_truncate(bits);
        }
        if let Ok(v) = env::var("RELAY_MAX_INFLIGHT") {
            config.rest.max_inflight = parse_var("RELAY_MAX_INFLIGHT", &v)?;
        }
        if let Ok(v) = env::var("RELAY_RETRY_BUDGET") {
            config.rest.retry_budget = parse_var("RELAY_RETRY_BUDGET", &v)?;
        }
        if let Ok(v) = env::var("RELAY_BACKOFF_BASE_MS") {
            config.backoff.base_ms = parse_var("RELAY_BACKOFF_BASE_MS", &v)?;
        }
        if let Ok(v) = env::var("RELAY_BACKOFF_MAX_MS") {
            config.backoff.max_ms = parse_var("RELAY_BACKOFF_MAX_MS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate invariants the rest of the client relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "token",
                value: "<empty>".to_string(),
            });
        }
        if self.rest.max_inflight == 0 {
            return Err(ConfigError::InvalidValue {
                name: "max_inflight",
                value: "0".to_string(),
            });
        }
        if self.backoff.base_ms == 0 || self.backoff.max_ms < self.backoff.base_ms {
            return Err(ConfigError::InvalidValue {
                name: "backoff",
                value: format!("base={} max={}", self.backoff.base_ms, self.backoff.max_ms),
            });
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

fn default_gateway_url() -> String {
    "ws://127.0.0.1:8081/gateway".to_string()
}

fn default_api_base_url() -> String {
    "http://127.0.0.1:8080/api/v1".to_string()
}
