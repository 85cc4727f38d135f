//! Extracted frame images (/frames/{name})

use axum::{
    Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use std::sync::Arc;

use crate::AppState;
use crate::error::LogErr;
use crate::frames::{VideoDecoder, is_frame_file_name};
use crate::provider::ModelProvider;

pub fn routes<P, D>() -> Router<Arc<AppState<P, D>>>
where
    P: ModelProvider + 'static,
    D: VideoDecoder + 'static,
{
    Router::new().route("/frames/{name}", get(serve_frame::<P, D>))
}

/// GET /frames/{name}
async fn serve_frame<P: ModelProvider, D: VideoDecoder>(
    State(state): State<Arc<AppState<P, D>>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    if !is_frame_file_name(&name) {
        return Err(StatusCode::NOT_FOUND);
    }

    let path = state.config.frames_dir.join(&name);
    if !path.is_file() {
        return Err(StatusCode::NOT_FOUND);
    }

    let bytes = tokio::fs::read(&path).await.log_500("Read frame error")?;

    // Frame names are reused across videos, so no long-lived caching
    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        bytes,
    ))
}
