//! `POST /publish/:channel`
//!
//! The credential is checked by the auth layer before this handler runs.
//! Each (channel, client address) pair then draws from its own token
//! bucket sized by the channel's limits; the first publish to a channel
//! creates those limits and announces the channel.

use crate::api::{parse_body, validate_channel, AppState};
use crate::domain::error::ApiResult;
use crate::middleware::rate_limit::{apply_rate_limit_headers, client_address, rate_limited_response};
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relay_bus::EventEnvelope;
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use tracing::{debug, info};

/// Event type of published messages.
pub const MESSAGE_EVENT_TYPE: &str = "message";

pub async fn publish(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    validate_channel(&channel)?;
    let payload: Map<String, Value> = parse_body(&body)?;

    let limits = state.channels.get_or_init(&channel).await;
    let client = client_address(&headers, connect.map(|ConnectInfo(addr)| addr));
    let bucket = format!("{channel}:{client}");

    let decision = state
        .channel_limiter
        .check_with(&bucket, 1, limits.params())
        .await;
    if !decision.allowed {
        debug!(%channel, %client, retry_after = decision.retry_after(), "Publish rate limited");
        return Ok(rate_limited_response(&decision));
    }

    state
        .bus
        .publish(EventEnvelope::with_payload(MESSAGE_EVENT_TYPE, payload).on_channel(&channel))
        .await?;
    info!(%channel, %client, "Message published");

    let mut response = Json(json!({
        "ok": true,
        "channel": channel,
        "remaining": decision.remaining,
        "capacity": limits.capacity,
    }))
    .into_response();
    apply_rate_limit_headers(response.headers_mut(), &decision);
    Ok(response)
}
