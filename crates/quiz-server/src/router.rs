use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;
use crate::{admin, ws};

/// Mirrors `stupid_server::main`'s single `Router::new().route(...)` tree
/// merged onto a shared `AppState` — one route per concern, no nesting
/// beyond what axum's path syntax gives for free.
pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(admin::health))
        .route("/auth/ws-ticket", post(ws::issue_ticket))
        .route("/ws", get(ws::ws_upgrade))
        .route("/admin/quizzes/{id}/schedule", post(admin::schedule_quiz))
        .route("/admin/quizzes/{id}/cancel", post(admin::cancel_quiz))
        .route("/admin/quizzes/{id}/state", get(admin::quiz_state))
        .route("/admin/hub/stats", get(admin::hub_stats))
        .route("/admin/sessions/{user_id}/revoke", post(admin::revoke_session))
        .route("/admin/sessions/{user_id}/logout-all", post(admin::logout_all))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
