//! Domain types: configuration and errors.

pub mod config;
pub mod error;

pub use config::{
    AuthSettings, BusSettings, ConfigError, CorsConfig, HttpConfig, RateLimitConfig, RelayConfig,
    StreamConfig,
};
pub use error::{codes, ApiError, ApiResult, GatewayError};
