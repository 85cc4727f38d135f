pub mod config;
pub mod constants;
pub mod documents;
pub mod error;
pub mod frames;
pub mod ingest;
pub mod models;
pub mod presenter;
pub mod provider;
pub mod report;
pub mod requester;
pub mod routes;
pub mod session;
pub mod storage;
pub mod video_upload;

use axum::{Router, extract::DefaultBodyLimit};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use config::Config;
use constants::MAX_MEDIA_UPLOAD_SIZE;
use frames::{FfmpegDecoder, FrameSampler, VideoDecoder};
use provider::{GeminiClient, ModelProvider};
use session::InspectionSession;

/// Shared server state. The session is single-tenant and serialized behind a
/// mutex that is only held to read or update it, never across uploads.
pub struct AppState<P = GeminiClient, D = FfmpegDecoder> {
    pub provider: P,
    pub sampler: FrameSampler<D>,
    pub config: Config,
    pub session: Mutex<InspectionSession>,
    /// Held while a video is sampled, one writer for the frames dir at a time
    pub frame_writer: Mutex<()>,
    /// Cancelled on shutdown to abort in-flight video processing waits
    pub shutdown: CancellationToken,
}

impl<P: ModelProvider, D: VideoDecoder> AppState<P, D> {
    pub fn new(provider: P, decoder: D, config: Config, session: InspectionSession) -> Self {
        Self {
            provider,
            sampler: FrameSampler::new(decoder, config.frame_interval_secs),
            config,
            session: Mutex::new(session),
            frame_writer: Mutex::new(()),
            shutdown: CancellationToken::new(),
        }
    }
}

pub fn build_router<P, D>(state: Arc<AppState<P, D>>) -> Router
where
    P: ModelProvider + 'static,
    D: VideoDecoder + 'static,
{
    routes::build_routes::<P, D>()
        .layer(DefaultBodyLimit::max(MAX_MEDIA_UPLOAD_SIZE))
        .with_state(state)
}
