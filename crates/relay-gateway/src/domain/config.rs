//! Relay configuration with validation.
//!
//! Read once at startup from environment variables. Every field has a
//! default, so an empty environment yields a working single-process relay
//! (local bus, permissive distributed limiters).

use relay_bus::{BusConfig, DEFAULT_BUS_CHANNEL, DEFAULT_RECENT_CAPACITY, DEFAULT_SUBSCRIBER_BUFFER};
use relay_ratelimit::{
    BucketParams, ChannelLimits, FailurePolicy, StoreMode, WindowParams, DEFAULT_BACKEND_TIMEOUT,
};
use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Main relay configuration
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    /// HTTP server configuration
    pub http: HttpConfig,
    /// Event bus configuration
    pub bus: BusSettings,
    /// SSE stream configuration
    pub stream: StreamConfig,
    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
    /// Privileged endpoint credentials
    pub auth: AuthSettings,
    /// CORS configuration
    pub cors: CorsConfig,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `REDIS_URL`: distributed backend for bus and limiters (default: unset)
    /// - `RELAY_HTTP_ADDR`: bind address (default: 0.0.0.0:8000)
    /// - `RELAY_BUS_CHANNEL`: pub/sub channel (default: mb:events)
    /// - `RELAY_SUBSCRIBER_BUFFER`: local subscriber queue depth (default: 1000)
    /// - `RELAY_RECENT_EVENTS`: recent-events ring size (default: 100)
    /// - `RELAY_HEARTBEAT_SECS`: SSE keep-alive interval (default: 15)
    /// - `RELAY_BACKEND_TIMEOUT_MS`: bound on Redis round trips (default: 250)
    /// - `RELAY_RATE_LIMIT_STORE`: `redis` or `memory` (default: redis)
    /// - `RELAY_RATE_LIMIT_FAIL_CLOSED`: deny while Redis is down (default: false)
    /// - `RELAY_RATE_LIMIT_SCOPES`: comma-separated path prefixes (default: /ops)
    /// - `RELAY_OPS_LIMIT`, `RELAY_OPS_WINDOW_SECS`: ops fixed window (default: 60 per 60s)
    /// - `RELAY_CHANNEL_CAPACITY`, `RELAY_CHANNEL_REFILL_PER_SEC`: channel bucket (default: 5, 0.5)
    /// - `RELAY_BUCKET_IDLE_TTL_SECS`: idle bucket expiry (default: derived)
    /// - `RELAY_PUBLISH_TOKEN`: shared secret for privileged endpoints (default: unset)
    /// - `RELAY_CORS_ORIGINS`: comma-separated origins or `*` (default: *)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            http: HttpConfig {
                addr: parse_or(&get, "RELAY_HTTP_ADDR", defaults.http.addr)?,
            },
            bus: BusSettings {
                redis_url: get("REDIS_URL"),
                channel: get("RELAY_BUS_CHANNEL").unwrap_or(defaults.bus.channel),
                subscriber_buffer: parse_or(
                    &get,
                    "RELAY_SUBSCRIBER_BUFFER",
                    defaults.bus.subscriber_buffer,
                )?,
                recent_events: parse_or(&get, "RELAY_RECENT_EVENTS", defaults.bus.recent_events)?,
                backend_timeout: Duration::from_millis(parse_or(
                    &get,
                    "RELAY_BACKEND_TIMEOUT_MS",
                    defaults.bus.backend_timeout.as_millis() as u64,
                )?),
            },
            stream: StreamConfig {
                heartbeat: Duration::from_secs(parse_or(
                    &get,
                    "RELAY_HEARTBEAT_SECS",
                    defaults.stream.heartbeat.as_secs(),
                )?),
                ..defaults.stream
            },
            rate_limit: RateLimitConfig {
                store: parse_or(&get, "RELAY_RATE_LIMIT_STORE", defaults.rate_limit.store)?,
                fail_closed: get("RELAY_RATE_LIMIT_FAIL_CLOSED")
                    .map(|v| parse_flag(&v))
                    .unwrap_or(defaults.rate_limit.fail_closed),
                scopes: get("RELAY_RATE_LIMIT_SCOPES")
                    .map(|v| split_list(&v))
                    .unwrap_or(defaults.rate_limit.scopes),
                ops_limit: parse_or(&get, "RELAY_OPS_LIMIT", defaults.rate_limit.ops_limit)?,
                ops_window_secs: parse_or(
                    &get,
                    "RELAY_OPS_WINDOW_SECS",
                    defaults.rate_limit.ops_window_secs,
                )?,
                channel_capacity: parse_or(
                    &get,
                    "RELAY_CHANNEL_CAPACITY",
                    defaults.rate_limit.channel_capacity,
                )?,
                channel_refill_per_sec: parse_or(
                    &get,
                    "RELAY_CHANNEL_REFILL_PER_SEC",
                    defaults.rate_limit.channel_refill_per_sec,
                )?,
                bucket_idle_ttl: get("RELAY_BUCKET_IDLE_TTL_SECS")
                    .map(|v| parse_value::<u64>("RELAY_BUCKET_IDLE_TTL_SECS", &v))
                    .transpose()?
                    .map(Duration::from_secs),
            },
            auth: AuthSettings {
                publish_token: get("RELAY_PUBLISH_TOKEN").map(|t| t.trim().to_string()),
            },
            cors: CorsConfig {
                allowed_origins: get("RELAY_CORS_ORIGINS")
                    .map(|v| split_list(&v))
                    .unwrap_or(defaults.cors.allowed_origins),
                ..defaults.cors
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.channel.is_empty() {
            return Err(ConfigError::Invalid("bus channel cannot be empty".into()));
        }
        if self.bus.subscriber_buffer == 0 {
            return Err(ConfigError::InvalidLimit(
                "subscriber buffer cannot be 0".into(),
            ));
        }
        if self.bus.backend_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "backend timeout cannot be 0".into(),
            ));
        }
        if self.stream.heartbeat.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "heartbeat interval cannot be 0".into(),
            ));
        }

        self.rate_limit
            .ops_window()
            .map_err(|e| ConfigError::InvalidRateLimit(e.to_string()))?;
        self.rate_limit
            .channel_params()
            .map_err(|e| ConfigError::InvalidRateLimit(e.to_string()))?;

        if let Some(scope) = self.rate_limit.scopes.iter().find(|s| !s.starts_with('/')) {
            return Err(ConfigError::InvalidRateLimit(format!(
                "scope {scope:?} must start with '/'"
            )));
        }
        if matches!(self.auth.publish_token.as_deref(), Some("")) {
            return Err(ConfigError::Invalid("publish token cannot be empty".into()));
        }

        Ok(())
    }

    /// Settings for the event bus service.
    pub fn bus_config(&self) -> BusConfig {
        BusConfig {
            redis_url: self.bus.redis_url.clone(),
            channel: self.bus.channel.clone(),
            subscriber_buffer: self.bus.subscriber_buffer,
            recent_capacity: self.bus.recent_events,
            backend_timeout: self.bus.backend_timeout,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Bind address
    pub addr: SocketAddr,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8000)),
        }
    }
}

/// Event bus configuration
#[derive(Debug, Clone)]
pub struct BusSettings {
    /// Redis URL shared by the bus and the limiters
    pub redis_url: Option<String>,
    /// Pub/sub channel
    pub channel: String,
    /// Per-subscriber queue depth of the local bus
    pub subscriber_buffer: usize,
    /// Size of the recent-events ring
    pub recent_events: usize,
    /// Bound on every Redis round trip
    pub backend_timeout: Duration,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            channel: DEFAULT_BUS_CHANNEL.to_string(),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            recent_events: DEFAULT_RECENT_CAPACITY,
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }
}

/// SSE stream configuration
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Keep-alive comment interval
    pub heartbeat: Duration,
    /// Encoded chunks buffered per connection before the pump waits
    pub chunk_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(15),
            chunk_buffer: 16,
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Where limiter state lives
    pub store: StoreMode,
    /// Deny instead of allow while the store is unreachable
    pub fail_closed: bool,
    /// Path prefixes accounted by the decision middleware
    pub scopes: Vec<String>,
    /// Requests per window on scoped paths
    pub ops_limit: u64,
    /// Window length in seconds on scoped paths
    pub ops_window_secs: u64,
    /// Default bucket capacity of a new channel
    pub channel_capacity: u32,
    /// Default refill rate of a new channel
    pub channel_refill_per_sec: f64,
    /// Idle bucket expiry; derived from the bucket parameters when unset
    pub bucket_idle_ttl: Option<Duration>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let channel = ChannelLimits::default();
        Self {
            store: StoreMode::Redis,
            fail_closed: false,
            scopes: vec!["/ops".to_string()],
            ops_limit: 60,
            ops_window_secs: 60,
            channel_capacity: channel.capacity,
            channel_refill_per_sec: channel.refill_per_sec,
            bucket_idle_ttl: None,
        }
    }
}

impl RateLimitConfig {
    pub fn failure_policy(&self) -> FailurePolicy {
        if self.fail_closed {
            FailurePolicy::FailClosed
        } else {
            FailurePolicy::FailOpen
        }
    }

    pub fn ops_window(&self) -> relay_ratelimit::LimiterResult<WindowParams> {
        WindowParams::new(self.ops_limit, self.ops_window_secs)
    }

    pub fn channel_params(&self) -> relay_ratelimit::LimiterResult<BucketParams> {
        BucketParams::new(self.channel_capacity, self.channel_refill_per_sec)
    }

    pub fn channel_defaults(&self) -> ChannelLimits {
        ChannelLimits {
            capacity: self.channel_capacity,
            refill_per_sec: self.channel_refill_per_sec,
        }
    }
}

/// Privileged endpoint credentials
#[derive(Debug, Clone, Default)]
pub struct AuthSettings {
    /// Shared secret. `None` rejects every privileged request.
    pub publish_token: Option<String>,
}

/// CORS configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Allowed origins ("*" for all)
    pub allowed_origins: Vec<String>,
    /// Max age for preflight cache, seconds
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            max_age: 86400, // 24 hours
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Variable present but unparsable
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: String, value: String },
    /// Invalid rate limiting configuration
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn parse_or<T, G>(get: &G, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(value) => parse_value(name, &value),
        None => Ok(default),
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
