//! User media ingestion.
//!
//! Stills are uploaded with bounded parallelism and registered in the
//! session's media map keyed by file name. Videos either go through the
//! whole-file upload and wait, get sampled into frames that are uploaded like
//! stills, or both. Per-file failures land in the returned [`BatchReport`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::documents::upload_files;
use crate::error::{InspectionError, Result};
use crate::frames::{FrameExtraction, FrameSampler, VideoDecoder};
use crate::models::{BatchReport, FileFailure, MediaItem, MediaKind, UserMedia};
use crate::provider::ModelProvider;
use crate::storage::{file_name_of, is_supported_document, is_video};
use crate::video_upload::{PollPolicy, upload_video};

/// How a submitted video is handed to the model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VideoMode {
    /// Sample stills and upload those
    #[default]
    Frames,
    /// Upload the whole file and wait for processing
    Upload,
    Both,
}

impl VideoMode {
    pub fn samples_frames(self) -> bool {
        matches!(self, VideoMode::Frames | VideoMode::Both)
    }

    pub fn uploads_whole(self) -> bool {
        matches!(self, VideoMode::Upload | VideoMode::Both)
    }
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub concurrency: usize,
    pub poll: PollPolicy,
}

/// Result of ingesting one video
#[derive(Debug, Default)]
pub struct VideoIngest {
    pub extraction: Option<FrameExtraction>,
    pub batch: BatchReport,
}

fn failure(path: &Path, err: &InspectionError) -> FileFailure {
    FileFailure {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

/// Delete the remote copies of media dropped from a session (best effort).
/// Extracted frames also lose their local file; user files are never touched.
pub async fn discard_media<P: ModelProvider>(
    provider: &P,
    items: impl IntoIterator<Item = MediaItem>,
) -> usize {
    let mut discarded = 0;
    for item in items {
        if let Some(remote) = &item.remote {
            if let Err(e) = provider.delete_file(&remote.name).await {
                tracing::warn!(name = %item.name, remote = %remote.name, error = %e, "Failed to delete remote media");
            }
        }

        if item.kind == MediaKind::Frame {
            if let Err(e) = tokio::fs::remove_file(&item.source_path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %item.source_path.display(), error = %e, "Failed to remove frame file");
                }
            }
        }
        discarded += 1;
    }
    discarded
}

/// Upload user stills. Video files in the list take the whole-file upload
/// path; anything else unsupported is recorded as a failure without upload.
pub async fn ingest_images<P: ModelProvider>(
    provider: &P,
    paths: Vec<PathBuf>,
    media: &mut UserMedia,
    options: &IngestOptions,
    cancel: &CancellationToken,
) -> BatchReport {
    let mut batch = BatchReport::default();
    let mut stills = Vec::new();
    let mut videos = Vec::new();

    for path in paths {
        if is_video(&path) {
            videos.push(path);
        } else if is_supported_document(&path) {
            stills.push(path);
        } else {
            tracing::warn!(path = %path.display(), "Unsupported media type, skipping");
            batch.record_failure(InspectionError::file_load(&path, "unsupported file type"));
        }
    }

    for (path, result) in upload_files(provider, stills, options.concurrency).await {
        let name = file_name_of(&path);
        match result {
            Ok(remote) => {
                tracing::info!(name = %name, remote = %remote.name, "Uploaded user image");
                media.insert(
                    name.clone(),
                    MediaItem::new(name.clone(), path, MediaKind::Image).with_remote(remote),
                );
                batch.record_success(name);
            }
            Err(e) => {
                tracing::warn!(name = %name, error = %e, "Error uploading user image");
                batch.record_failure(e);
            }
        }
    }

    for path in videos {
        match upload_video(provider, &path, &options.poll, cancel, None).await {
            Ok(item) => {
                batch.record_success(item.name.clone());
                media.insert(item.name.clone(), item);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Error uploading user video");
                batch.record_failure(failure(&path, &e));
            }
        }
    }

    batch
}

/// Sample a video into `frames_dir`, upload every written frame, and
/// register each under its frame file name.
pub async fn ingest_video_frames<P: ModelProvider, D: VideoDecoder>(
    provider: &P,
    sampler: &FrameSampler<D>,
    video: &Path,
    frames_dir: &Path,
    media: &mut UserMedia,
    concurrency: usize,
) -> Result<(FrameExtraction, BatchReport)> {
    let extraction = sampler.sample(video, frames_dir).await?;
    let mut batch = BatchReport::default();

    let paths: Vec<PathBuf> = extraction.frames.iter().map(|f| f.path.clone()).collect();
    let uploads = upload_files(provider, paths, concurrency).await;

    for (frame, (_, result)) in extraction.frames.iter().zip(uploads) {
        match result {
            Ok(remote) => {
                media.insert(
                    frame.file_name.clone(),
                    MediaItem::new(frame.file_name.clone(), frame.path.clone(), MediaKind::Frame)
                        .with_timestamp(frame.timestamp_secs)
                        .with_remote(remote),
                );
                batch.record_success(frame.file_name.clone());
            }
            Err(e) => {
                tracing::warn!(frame = %frame.file_name, error = %e, "Error uploading frame");
                batch.record_failure(e);
            }
        }
    }

    tracing::info!(
        video = %file_name_of(video),
        uploaded = batch.succeeded.len(),
        failed = batch.failed.len(),
        "Ingested video frames"
    );

    Ok((extraction, batch))
}

/// Ingest one video in the requested mode.
///
/// With a single mode the step's error is returned. With `Both`, each step
/// runs regardless of the other and failures are recorded in the batch.
#[allow(clippy::too_many_arguments)]
pub async fn ingest_video<P: ModelProvider, D: VideoDecoder>(
    provider: &P,
    sampler: &FrameSampler<D>,
    video: &Path,
    mode: VideoMode,
    frames_dir: &Path,
    media: &mut UserMedia,
    options: &IngestOptions,
    cancel: &CancellationToken,
) -> Result<VideoIngest> {
    let mut outcome = VideoIngest::default();

    if mode.samples_frames() {
        match ingest_video_frames(provider, sampler, video, frames_dir, media, options.concurrency)
            .await
        {
            Ok((extraction, batch)) => {
                outcome.extraction = Some(extraction);
                outcome.batch.merge(batch);
            }
            Err(e) if mode == VideoMode::Both => {
                tracing::warn!(path = %video.display(), error = %e, "Frame sampling failed");
                outcome.batch.record_failure(failure(video, &e));
            }
            Err(e) => return Err(e),
        }
    }

    if mode.uploads_whole() {
        match upload_video(provider, video, &options.poll, cancel, None).await {
            Ok(item) => {
                outcome.batch.record_success(item.name.clone());
                media.insert(item.name.clone(), item);
            }
            Err(e) if mode == VideoMode::Both => {
                tracing::warn!(path = %video.display(), error = %e, "Video upload failed");
                outcome.batch.record_failure(failure(video, &e));
            }
            Err(e) => return Err(e),
        }
    }

    Ok(outcome)
}
