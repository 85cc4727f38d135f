//! Health and session status endpoints (/health, /session)

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;
use crate::frames::VideoDecoder;
use crate::provider::ModelProvider;
use crate::session::SessionSummary;

pub fn routes<P, D>() -> Router<Arc<AppState<P, D>>>
where
    P: ModelProvider + 'static,
    D: VideoDecoder + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/session", get(session_status::<P, D>))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// GET /session - reference library counts, media states, last batch outcome
async fn session_status<P: ModelProvider, D: VideoDecoder>(
    State(state): State<Arc<AppState<P, D>>>,
) -> Json<SessionSummary> {
    Json(state.session.lock().await.summary())
}
