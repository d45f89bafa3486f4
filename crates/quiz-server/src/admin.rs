//! Thin operational HTTP front door for the Scheduler/Orchestrator (§4.11).
//! No new core behavior lives here — every handler calls straight into the
//! operation already specified in §4.2/§4.3; this module only adapts HTTP
//! in and JSON out, the way `stupid_server::router` merges one `Router`
//! per concern onto a shared `AppState`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

/// `POST /admin/quizzes/:id/schedule`.
pub async fn schedule_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<i64>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let quiz = state
        .store
        .get_quiz(quiz_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("quiz {quiz_id} not found")))?;

    state.scheduler.schedule(&quiz).await?;
    Ok(Json(serde_json::json!({ "quiz_id": quiz_id, "armed": true })))
}

/// `POST /admin/quizzes/:id/cancel`.
pub async fn cancel_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<i64>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    // A quiz can be cancelled while merely armed (Scheduler owns the
    // timers) or while actually running (Orchestrator owns the task); try
    // the live path first since that one needs an in-process handle the
    // Scheduler's own `cancel` doesn't have.
    if !state.registry.cancel_active(quiz_id).await {
        state.scheduler.cancel(quiz_id, "operator_cancelled").await?;
    }
    Ok(Json(serde_json::json!({ "quiz_id": quiz_id, "cancelled": true })))
}

#[derive(Serialize)]
pub struct QuizStateResponse {
    pub quiz_id: i64,
    pub status: quiz_core::entity::QuizStatus,
    pub is_active: bool,
    pub is_armed: bool,
    pub player_count: usize,
}

/// `GET /admin/quizzes/:id/state`.
pub async fn quiz_state(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<i64>,
) -> Result<Json<QuizStateResponse>, ApiError> {
    let quiz = state
        .store
        .get_quiz(quiz_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("quiz {quiz_id} not found")))?;

    Ok(Json(QuizStateResponse {
        quiz_id,
        status: quiz.status,
        is_active: state.registry.is_active(quiz_id).await,
        is_armed: state.scheduler.is_armed(quiz_id).await,
        player_count: state.hub.player_count(quiz_id).await,
    }))
}

/// `GET /admin/hub/stats` (SPEC_FULL §4.10).
pub async fn hub_stats(State(state): State<Arc<AppState>>) -> Json<quiz_hub::HubStats> {
    Json(state.hub.stats())
}

/// `POST /admin/sessions/:user_id/revoke` (§4.9).
pub async fn revoke_session(State(state): State<Arc<AppState>>, Path(user_id): Path<i64>) -> Json<serde_json::Value> {
    state.hub.revoke_session(user_id).await;
    Json(serde_json::json!({ "user_id": user_id, "revoked": true }))
}

/// `POST /admin/sessions/:user_id/logout-all` (§4.9).
pub async fn logout_all(State(state): State<Arc<AppState>>, Path(user_id): Path<i64>) -> Json<serde_json::Value> {
    state.hub.logout_all(user_id).await;
    Json(serde_json::json!({ "user_id": user_id, "logged_out": true }))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
