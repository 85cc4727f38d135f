pub mod frames;
pub mod media;
pub mod report;
pub mod session;

use axum::Router;
use std::sync::Arc;

use crate::AppState;
use crate::frames::VideoDecoder;
use crate::provider::ModelProvider;

/// Build all routes for the API
pub fn build_routes<P, D>() -> Router<Arc<AppState<P, D>>>
where
    P: ModelProvider + 'static,
    D: VideoDecoder + 'static,
{
    Router::new()
        .merge(session::routes::<P, D>())
        .merge(media::routes::<P, D>())
        .merge(report::routes::<P, D>())
        .merge(frames::routes::<P, D>())
}
