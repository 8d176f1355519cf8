//! Read-side routes: health, recent activity and live streams.

use crate::api::{validate_channel, AppState};
use crate::domain::error::ApiResult;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

/// Default page size for `/events/recent`.
pub const DEFAULT_RECENT_LIMIT: usize = 20;

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "relay-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "bus": state.bus.kind().to_string(),
        "subscribers": state.bus.subscriber_count(),
        "streams": state.streams.active(),
        "rate_limit": {
            "store": state.store_mode.to_string(),
            "limiter_degraded": !state.limiters_enforcing(),
            "fallbacks": state.ops_limiter.fallbacks() + state.channel_limiter.fallbacks(),
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
    pub channel: Option<String>,
}

/// `GET /events/recent?limit=&channel=`
pub async fn recent(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> ApiResult<Json<Value>> {
    if let Some(channel) = query.channel.as_deref() {
        validate_channel(channel)?;
    }
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .clamp(1, state.bus.recent_capacity().max(1));

    let events = state.bus.recent(limit, query.channel.as_deref());
    Ok(Json(json!({
        "count": events.len(),
        "events": events,
    })))
}

/// `GET /stream`: every event.
pub async fn stream_all(State(state): State<AppState>) -> ApiResult<Response> {
    let subscription = state.bus.subscribe().await?;
    Ok(state.streams.respond(subscription, None))
}

/// `GET /stream/:channel`: events tagged with one channel.
pub async fn stream_channel(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> ApiResult<Response> {
    validate_channel(&channel)?;
    let subscription = state.bus.subscribe().await?;
    Ok(state.streams.respond(subscription, Some(channel)))
}
