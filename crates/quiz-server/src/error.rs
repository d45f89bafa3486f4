use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use quiz_scheduler::SchedulerError;
use quiz_store::StoreError;

/// Maps core errors onto HTTP status codes for the admin surface (§4.11).
/// Precondition failures surface synchronously per §7; nothing here ever
/// mutates state on the error path.
pub enum ApiError {
    NotFound(String),
    Conflict(String),
    BadRequest(String),
    Unauthorized,
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::QuizNotFound(id) => ApiError::NotFound(format!("quiz {id} not found")),
            StoreError::QuizNotScheduled(id) => {
                ApiError::Conflict(format!("quiz {id} is not in status 'scheduled'"))
            }
            StoreError::AnotherQuizInProgress => {
                ApiError::Conflict("another quiz is already in progress".to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::QuizNotFound(id) => ApiError::NotFound(format!("quiz {id} not found")),
            SchedulerError::ScheduleTooSoon { .. } | SchedulerError::InsufficientQuestions(_) => {
                ApiError::BadRequest(e.to_string())
            }
            SchedulerError::Store(inner) => inner.into(),
        }
    }
}
