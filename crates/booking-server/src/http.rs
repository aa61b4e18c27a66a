use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use booking_core::SessionOrchestrator;

mod chat;
mod errors;
mod health;
mod models;

pub use models::{ChatRequest, ErrorBody, ErrorResponse, OkResponse};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SessionOrchestrator>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/v1/chat", post(chat::chat))
        .route("/v1/sessions/{session_id}", delete(chat::clear_session))
        .with_state(app_state)
}
