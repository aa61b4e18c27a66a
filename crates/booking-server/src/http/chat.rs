use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::info;

use super::AppState;
use super::errors::{bad_request_response, not_found_response};
use super::models::ChatRequest;

pub(super) async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let session_id = request.session_id.trim();
    if session_id.is_empty() {
        return bad_request_response("invalid_request", "sessionId is required");
    }
    if request.message.trim().is_empty() {
        return bad_request_response("invalid_request", "message is required");
    }

    let response = state
        .orchestrator
        .take_turn(session_id, &request.message)
        .await;
    (StatusCode::OK, Json(response)).into_response()
}

pub(super) async fn clear_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    if state.orchestrator.clear_session(&session_id).await {
        info!(session_id, "session deleted over http");
        StatusCode::NO_CONTENT.into_response()
    } else {
        not_found_response("session_not_found", "Session not found")
    }
}
