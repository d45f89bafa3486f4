use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct TicketResponse {
    pub ticket: String,
    pub expires_in_secs: u64,
}

/// `POST /auth/ws-ticket` (§6.2): exchanges an already-authenticated HTTP
/// request for a single-use WS admission ticket. Rate-limited per client IP
/// (SPEC_FULL §3.2), fail-open on cache unavailability.
pub async fn issue_ticket(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let scope = format!("ip:{}", addr.ip());
    if !state.ticket_rate_limiter.allow(state.cache.as_ref(), &scope).await {
        return Err(ApiError::BadRequest("rate limit exceeded".to_string()));
    }

    let claims = state
        .authenticator
        .authenticate(&headers)
        .await
        .map_err(|_| ApiError::Unauthorized)?;

    let ttl = ChronoDuration::seconds(state.hub_config().ticket_ttl_secs as i64);
    let ticket = state
        .hub
        .tickets
        .issue(claims.user_id, &claims.device_id, ttl, state.clock.now())
        .await;

    Ok(axum::Json(TicketResponse {
        ticket,
        expires_in_secs: state.hub_config().ticket_ttl_secs,
    }))
}

#[derive(Deserialize)]
pub struct WsQuery {
    pub ticket: String,
}

/// `GET /ws?ticket=...`: upgrades to a WebSocket connection already
/// admitted by a single-use ticket minted from `issue_ticket`. All wire
/// handling from here on is `quiz_hub::connection::accept` (§4.8).
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    if query.ticket.is_empty() {
        warn!("websocket upgrade attempted with no ticket");
    }
    quiz_hub::connection::accept(ws, state.hub.clone(), query.ticket, state.inbound_tx.clone()).await
}
