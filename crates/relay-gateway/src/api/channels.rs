//! Per-channel bucket limits.

use crate::api::{parse_body, validate_channel, AppState};
use crate::domain::error::ApiResult;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use relay_ratelimit::ChannelLimits;
use serde_json::{json, Value};

fn limits_body(channel: &str, limits: &ChannelLimits) -> Value {
    json!({
        "channel": channel,
        "capacity": limits.capacity,
        "refill_per_sec": limits.refill_per_sec,
    })
}

/// `GET /channels/:channel/limits`. Opens the channel if it is new.
pub async fn get_limits(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> ApiResult<Json<Value>> {
    validate_channel(&channel)?;
    let limits = state.channels.get_or_init(&channel).await;
    Ok(Json(limits_body(&channel, &limits)))
}

/// `PUT /channels/:channel/limits` with `{"capacity": n, "refill_per_sec": r}`.
pub async fn put_limits(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    validate_channel(&channel)?;
    let limits: ChannelLimits = parse_body(&body)?;
    state.channels.set(&channel, limits).await?;

    let mut body = limits_body(&channel, &limits);
    body["ok"] = Value::Bool(true);
    Ok(Json(body))
}
