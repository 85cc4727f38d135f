//! User media endpoints (/media/*)

use axum::{
    Json, Router,
    extract::{Multipart, Query, State},
    routing::{delete, post},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::AppState;
use crate::error::{InspectionError, Result};
use crate::frames::{Frame, VideoDecoder};
use crate::ingest::{self, VideoMode};
use crate::models::{BatchReport, UserMedia};
use crate::provider::ModelProvider;
use crate::storage::{file_name_of, is_video, save_upload};

pub fn routes<P, D>() -> Router<Arc<AppState<P, D>>>
where
    P: ModelProvider + 'static,
    D: VideoDecoder + 'static,
{
    Router::new()
        .route("/media", delete(clear_media::<P, D>))
        .route("/media/images", post(upload_images::<P, D>))
        .route("/media/video", post(upload_video::<P, D>))
}

#[derive(Serialize)]
struct IngestResponse {
    batch: BatchReport,
    media_count: usize,
}

#[derive(Serialize)]
struct VideoResponse {
    batch: BatchReport,
    frames: Vec<Frame>,
    skipped_secs: Vec<u64>,
    media_count: usize,
}

#[derive(Serialize)]
struct ClearResponse {
    cleared: usize,
}

#[derive(Debug, Deserialize)]
struct VideoQuery {
    #[serde(default)]
    mode: VideoMode,
}

/// Save every file field of a multipart body into the holding area
async fn save_multipart(multipart: &mut Multipart, holding_area: &Path) -> Result<Vec<PathBuf>> {
    let mut saved = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| InspectionError::InvalidRequest(format!("multipart field error: {}", e)))?
    {
        let Some(file_name) = field.file_name().map(|s| s.to_string()) else {
            continue;
        };

        let data = field
            .bytes()
            .await
            .map_err(|e| InspectionError::InvalidRequest(format!("failed to read {}: {}", file_name, e)))?;

        let path = save_upload(holding_area, &file_name, &data)
            .await
            .map_err(|e| InspectionError::InvalidRequest(format!("cannot store {}: {}", file_name, e)))?;

        tracing::debug!(file = %file_name, bytes = data.len(), "Saved upload to holding area");
        saved.push(path);
    }

    Ok(saved)
}

/// POST /media/images - multipart, one or more stills (videos are accepted and uploaded whole)
async fn upload_images<P: ModelProvider, D: VideoDecoder>(
    State(state): State<Arc<AppState<P, D>>>,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>> {
    let holding_area = state.session.lock().await.holding_area().to_path_buf();
    let paths = save_multipart(&mut multipart, &holding_area).await?;
    if paths.is_empty() {
        return Err(InspectionError::InvalidRequest("no files in request".into()));
    }

    let mut staged = UserMedia::new();
    let batch = ingest::ingest_images(
        &state.provider,
        paths,
        &mut staged,
        &state.config.ingest_options(),
        &state.shutdown,
    )
    .await;

    let mut session = state.session.lock().await;
    session.record_images(staged, batch.clone());

    Ok(Json(IngestResponse {
        batch,
        media_count: session.media.len(),
    }))
}

/// POST /media/video?mode=frames|upload|both - multipart, exactly one video
async fn upload_video<P: ModelProvider, D: VideoDecoder>(
    State(state): State<Arc<AppState<P, D>>>,
    Query(query): Query<VideoQuery>,
    mut multipart: Multipart,
) -> Result<Json<VideoResponse>> {
    let holding_area = state.session.lock().await.holding_area().to_path_buf();
    let paths = save_multipart(&mut multipart, &holding_area).await?;

    let [video] = paths.as_slice() else {
        return Err(InspectionError::InvalidRequest(format!(
            "expected exactly one video, got {}",
            paths.len()
        )));
    };
    if !is_video(video) {
        return Err(InspectionError::InvalidRequest(format!(
            "{} is not a supported video",
            file_name_of(video)
        )));
    }

    let _frame_writer = if query.mode.samples_frames() {
        let guard = state.frame_writer.lock().await;
        let stale = state.session.lock().await.take_frames();
        ingest::discard_media(&state.provider, stale).await;
        Some(guard)
    } else {
        None
    };

    let mut staged = UserMedia::new();
    let outcome = ingest::ingest_video(
        &state.provider,
        &state.sampler,
        video,
        query.mode,
        &state.config.frames_dir,
        &mut staged,
        &state.config.ingest_options(),
        &state.shutdown,
    )
    .await?;

    let mut session = state.session.lock().await;
    session.record_video(staged, &outcome);

    let (frames, skipped_secs) = outcome
        .extraction
        .map(|e| (e.frames, e.skipped_secs))
        .unwrap_or_default();

    Ok(Json(VideoResponse {
        batch: outcome.batch,
        frames,
        skipped_secs,
        media_count: session.media.len(),
    }))
}

/// DELETE /media - drop all user media and empty the holding area
async fn clear_media<P: ModelProvider, D: VideoDecoder>(
    State(state): State<Arc<AppState<P, D>>>,
) -> Json<ClearResponse> {
    let _frame_writer = state.frame_writer.lock().await;
    let cleared = state.session.lock().await.clear_media(&state.provider).await;
    Json(ClearResponse { cleared })
}
