//! HTTP routes of the relay.
//!
//! | Route | Privileged |
//! |---|---|
//! | `GET /health` | no |
//! | `GET /stream`, `GET /stream/:channel` | no |
//! | `GET /events/recent` | no |
//! | `POST /publish/:channel` | yes |
//! | `GET /channels/:channel/limits` | no |
//! | `PUT /channels/:channel/limits` | yes |
//! | `POST /ops/broadcast`, `POST /ops/ratelimit/test` | yes |

pub mod channels;
pub mod events;
pub mod ops;
pub mod publish;

use crate::domain::config::RelayConfig;
use crate::domain::error::{ApiError, ApiResult};
use crate::middleware::{create_cors_layer, AuthConfig, AuthLayer, RateLimitLayer, TracingLayer};
use crate::stream::StreamAdapter;
use axum::routing::{get, post};
use axum::Router;
use relay_bus::EventBus;
use relay_ratelimit::{BucketLimiter, ChannelRegistry, RateLimiter, StoreMode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower::ServiceBuilder;

/// Longest accepted channel name.
pub const MAX_CHANNEL_LEN: usize = 64;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub bus: Arc<EventBus>,
    /// Fixed window behind the scoped decision middleware
    pub ops_limiter: Arc<dyn RateLimiter>,
    /// Per-channel token buckets for publishing
    pub channel_limiter: Arc<dyn BucketLimiter>,
    pub channels: Arc<ChannelRegistry>,
    pub streams: StreamAdapter,
    pub store_mode: StoreMode,
}

impl AppState {
    /// False while any limiter is serving permissive decisions.
    pub fn limiters_enforcing(&self) -> bool {
        self.ops_limiter.is_enforcing() && self.channel_limiter.is_enforcing()
    }
}

/// Build the router with the full middleware stack.
pub fn router(state: AppState, config: &RelayConfig) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TracingLayer::new())
        .layer(create_cors_layer(&config.cors))
        .layer(AuthLayer::new(AuthConfig::relay(
            config.auth.publish_token.clone(),
        )))
        .layer(RateLimitLayer::new(
            Arc::clone(&state.ops_limiter),
            config.rate_limit.scopes.clone(),
        ));

    Router::new()
        .route("/health", get(events::health))
        .route("/stream", get(events::stream_all))
        .route("/stream/:channel", get(events::stream_channel))
        .route("/events/recent", get(events::recent))
        .route("/publish/:channel", post(publish::publish))
        .route(
            "/channels/:channel/limits",
            get(channels::get_limits).put(channels::put_limits),
        )
        .route("/ops/broadcast", post(ops::broadcast))
        .route("/ops/ratelimit/test", post(ops::ratelimit_test))
        .layer(middleware)
        .with_state(state)
}

/// Channel names: 1-64 characters of `[A-Za-z0-9_.:-]`.
pub fn validate_channel(channel: &str) -> ApiResult<()> {
    let valid_chars = channel
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
    if channel.is_empty() || channel.len() > MAX_CHANNEL_LEN || !valid_chars {
        return Err(ApiError::bad_request(format!(
            "invalid channel name {channel:?}"
        )));
    }
    Ok(())
}

/// Parse a JSON body; an empty body reads as `{}`.
pub fn parse_body<T: DeserializeOwned>(body: &[u8]) -> ApiResult<T> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };
    Ok(serde_json::from_slice(body)?)
}
