//! HTTP request handlers

use super::types::{ErrorResponse, EventResponse, HealthResponse, InvokeRequest};
use super::AppState;
use crate::dispatcher::InvokeError;
use crate::event::{ChatId, Event};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/handlers/:id", post(invoke_handler))
        .route("/events", post(enqueue_event))
        .route("/health", get(health))
        .route("/version", get(get_version))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================
// API handlers
// ============================================================

async fn invoke_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<InvokeRequest>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let chat = ChatId(request.chat_id);

    let outcome = state
        .dispatcher
        .invoke(&id, chat, request.params)
        .await
        .map_err(|e| match e {
            InvokeError::UnknownHandler(_) => AppError::NotFound(e.to_string()),
        })?;

    if outcome.deadline_exceeded() {
        return Err(AppError::Timeout(format!("handler {id} timed out")));
    }
    outcome.into_result().map_err(|e| {
        tracing::error!(handler = %id, error = %e, "API handler failed");
        AppError::Internal(e.to_string())
    })?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================
// Event ingestion
// ============================================================

async fn enqueue_event(
    State(state): State<AppState>,
    payload: Result<Json<Event>, JsonRejection>,
) -> Result<(StatusCode, Json<EventResponse>), AppError> {
    let Json(event) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    tracing::debug!(chat_id = %event.chat_id, "Event received over HTTP");
    state
        .events
        .send(event)
        .await
        .map_err(|_| AppError::Unavailable("update loop is not running".to_string()))?;
    Ok((StatusCode::ACCEPTED, Json(EventResponse { queued: true })))
}

// ============================================================
// Status
// ============================================================

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn get_version() -> &'static str {
    concat!("chatflow ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Timeout(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Timeout(msg) => (StatusCode::REQUEST_TIMEOUT, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
