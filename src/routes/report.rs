//! Report endpoints (/report/*)

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse},
    routing::get,
};
use std::sync::Arc;

use crate::AppState;
use crate::constants::DOWNLOAD_FILE_NAME;
use crate::error::{LogErr, Result};
use crate::frames::VideoDecoder;
use crate::presenter::render_html;
use crate::provider::ModelProvider;
use crate::report::{InspectionReport, to_pretty_json};

pub fn routes<P, D>() -> Router<Arc<AppState<P, D>>>
where
    P: ModelProvider + 'static,
    D: VideoDecoder + 'static,
{
    Router::new()
        .route("/report", get(latest_report::<P, D>).post(generate_report::<P, D>))
        .route("/report/view", get(view_report::<P, D>))
        .route("/report/download", get(download_report::<P, D>))
}

async fn current_report<P: ModelProvider, D: VideoDecoder>(
    state: &AppState<P, D>,
) -> std::result::Result<InspectionReport, StatusCode> {
    state
        .session
        .lock()
        .await
        .last_report
        .clone()
        .ok_or(StatusCode::NOT_FOUND)
}

/// POST /report - generate from current media, persist, return the report
async fn generate_report<P: ModelProvider, D: VideoDecoder>(
    State(state): State<Arc<AppState<P, D>>>,
) -> Result<Json<InspectionReport>> {
    let mut session = state.session.lock().await;
    let report = session
        .generate_report(&state.provider, &state.config.report_path)
        .await?;
    Ok(Json(report))
}

/// GET /report - the last generated report
async fn latest_report<P: ModelProvider, D: VideoDecoder>(
    State(state): State<Arc<AppState<P, D>>>,
) -> std::result::Result<Json<InspectionReport>, StatusCode> {
    Ok(Json(current_report(&state).await?))
}

/// GET /report/view - HTML rendering with links to extracted frames
async fn view_report<P: ModelProvider, D: VideoDecoder>(
    State(state): State<Arc<AppState<P, D>>>,
) -> std::result::Result<Html<String>, StatusCode> {
    let report = current_report(&state).await?;
    Ok(Html(render_html(&report, &state.config.frames_dir)))
}

/// GET /report/download - indented JSON as an attachment
async fn download_report<P: ModelProvider, D: VideoDecoder>(
    State(state): State<Arc<AppState<P, D>>>,
) -> std::result::Result<impl IntoResponse, StatusCode> {
    let report = current_report(&state).await?;
    let json = to_pretty_json(&report).log_500("Serialize report error")?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", DOWNLOAD_FILE_NAME),
            ),
        ],
        json,
    ))
}
