//! Operator routes under `/ops`. Authenticated and counted against the
//! ops fixed window by the middleware stack.

use crate::api::{parse_body, AppState};
use crate::domain::error::{ApiError, ApiResult};
use crate::middleware::rate_limit::{client_identifier, rate_limited_response};
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relay_bus::SYSTEM_EVENT_TYPE;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use tracing::info;

/// Largest cost one `/ops/ratelimit/test` call may consume.
pub const MAX_TEST_COST: u32 = 1000;

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    #[serde(rename = "type", default = "default_event_type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

fn default_event_type() -> String {
    SYSTEM_EVENT_TYPE.to_string()
}

/// `POST /ops/broadcast` with `{"type": ..., "payload": {...}}`.
pub async fn broadcast(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    let request: BroadcastRequest = parse_body(&body)?;
    if request.event_type.trim().is_empty() {
        return Err(ApiError::bad_request("event type must not be empty"));
    }

    state
        .bus
        .publish_event(request.event_type.clone(), request.payload)
        .await?;
    info!(event_type = %request.event_type, "Operator broadcast");

    Ok(Json(json!({ "ok": true, "type": request.event_type })))
}

#[derive(Debug, Deserialize)]
pub struct CostQuery {
    pub cost: Option<u32>,
}

/// `POST /ops/ratelimit/test?cost=n`: consume `n` units from the caller's
/// ops window and report the remaining count before and after.
pub async fn ratelimit_test(
    State(state): State<AppState>,
    Query(query): Query<CostQuery>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let cost = query.cost.unwrap_or(1);
    if cost == 0 || cost > MAX_TEST_COST {
        return Err(ApiError::bad_request(format!(
            "cost must be between 1 and {MAX_TEST_COST}"
        )));
    }

    let identifier = client_identifier(&headers, connect.map(|ConnectInfo(addr)| addr));
    let limiter = &state.ops_limiter;
    let before = limiter.peek(&identifier).await;
    let decision = limiter.check(&identifier, cost).await;
    if !decision.allowed {
        return Ok(rate_limited_response(&decision));
    }
    let after = limiter.peek(&identifier).await;

    Ok(Json(json!({
        "ok": true,
        "algorithm": limiter.algorithm(),
        "limit": decision.limit,
        "cost": cost,
        "before": before.remaining,
        "after": after.remaining,
        "reset_in": after.reset_in,
    }))
    .into_response())
}
