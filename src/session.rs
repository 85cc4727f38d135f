//! One inspection session: reference library, cached context, user media and
//! the latest report. Held by the server behind a mutex and owned directly by
//! the CLI.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::constants::CACHE_DISPLAY_NAME;
use crate::documents::{ExampleCategory, ReferenceLibrary, load_examples, load_standards};
use crate::error::Result;
use crate::frames::{FrameExtraction, FrameSampler, VideoDecoder, clear_frames};
use crate::ingest::{self, IngestOptions, VideoIngest, VideoMode, discard_media};
use crate::models::{BatchReport, MediaItem, MediaKind, UserMedia};
use crate::provider::{CacheRequest, CachedContext, FileState, ModelProvider};
use crate::report::{InspectionReport, SYSTEM_INSTRUCTION, save_report};
use crate::requester;
use crate::storage::{holding_area_path, remove_holding_area};

#[derive(Debug)]
pub struct InspectionSession {
    pub library: ReferenceLibrary,
    pub cache: CachedContext,
    pub media: UserMedia,
    /// Outcome of loading the reference library
    pub load_batch: BatchReport,
    pub last_batch: Option<BatchReport>,
    pub last_extraction: Option<FrameExtraction>,
    pub last_report: Option<InspectionReport>,
    /// Created on first upload
    holding_area: PathBuf,
    frames_dir: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct MediaSummary {
    pub name: String,
    pub kind: MediaKind,
    pub state: Option<FileState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub cache: String,
    pub cache_expires_at: Option<DateTime<Utc>>,
    pub standards: usize,
    pub examples: BTreeMap<ExampleCategory, usize>,
    pub load_failures: usize,
    pub media: Vec<MediaSummary>,
    pub last_batch: Option<BatchReport>,
    pub skipped_frames: Vec<u64>,
    pub has_report: bool,
}

impl InspectionSession {
    /// Load standards and examples, then bake the standards into a cached context
    pub async fn initialize<P: ModelProvider>(provider: &P, config: &Config) -> Result<Self> {
        let (standards, mut load_batch) =
            load_standards(provider, &config.standards_dir, config.upload_concurrency).await;
        let (examples, example_batch) =
            load_examples(provider, &config.examples_dir, config.upload_concurrency).await;
        load_batch.merge(example_batch);

        let library = ReferenceLibrary {
            standards,
            examples,
        };

        let cache = provider
            .create_cached_context(&CacheRequest {
                model: config.model.clone(),
                display_name: CACHE_DISPLAY_NAME.to_string(),
                system_instruction: SYSTEM_INSTRUCTION.to_string(),
                documents: library.standard_files(),
                ttl: config.cache_ttl(),
            })
            .await?;

        tracing::info!(
            standards = library.standards.len(),
            example1 = library.example_count(ExampleCategory::Example1),
            example2 = library.example_count(ExampleCategory::Example2),
            failures = load_batch.failed.len(),
            cache = %cache.name,
            "Initialized inspection session"
        );

        Ok(Self {
            library,
            cache,
            media: UserMedia::new(),
            load_batch,
            last_batch: None,
            last_extraction: None,
            last_report: None,
            holding_area: holding_area_path(),
            frames_dir: config.frames_dir.clone(),
        })
    }

    /// Directory where uploaded files are staged before ingestion
    pub fn holding_area(&self) -> &Path {
        &self.holding_area
    }

    pub fn frames_dir(&self) -> &Path {
        &self.frames_dir
    }

    /// Add the outcome of an image batch ingested outside the session
    pub fn record_images(&mut self, staged: UserMedia, batch: BatchReport) {
        self.media.extend(staged);
        self.last_batch = Some(batch);
    }

    /// Add the outcome of a video ingested outside the session
    pub fn record_video(&mut self, staged: UserMedia, outcome: &VideoIngest) {
        self.media.extend(staged);
        self.last_batch = Some(outcome.batch.clone());
        if let Some(extraction) = &outcome.extraction {
            self.last_extraction = Some(extraction.clone());
        }
    }

    /// Remove the frames of the previously sampled video. Frame names repeat
    /// across videos, so a new extraction replaces the old one entirely.
    pub fn take_frames(&mut self) -> Vec<MediaItem> {
        let (frames, kept): (UserMedia, UserMedia) = std::mem::take(&mut self.media)
            .into_iter()
            .partition(|(_, item)| item.kind == MediaKind::Frame);
        self.media = kept;
        self.last_extraction = None;
        frames.into_values().collect()
    }

    pub async fn ingest_images<P: ModelProvider>(
        &mut self,
        provider: &P,
        paths: Vec<PathBuf>,
        options: &IngestOptions,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let mut staged = UserMedia::new();
        let batch = ingest::ingest_images(provider, paths, &mut staged, options, cancel).await;
        self.record_images(staged, batch.clone());
        batch
    }

    /// Ingest a video into the session's frames dir. Sampling modes first
    /// discard the frames of any earlier video.
    pub async fn ingest_video<P: ModelProvider, D: VideoDecoder>(
        &mut self,
        provider: &P,
        sampler: &FrameSampler<D>,
        video: &Path,
        mode: VideoMode,
        options: &IngestOptions,
        cancel: &CancellationToken,
    ) -> Result<VideoIngest> {
        if mode.samples_frames() {
            discard_media(provider, self.take_frames()).await;
        }

        let mut staged = UserMedia::new();
        let outcome = ingest::ingest_video(
            provider,
            sampler,
            video,
            mode,
            &self.frames_dir,
            &mut staged,
            options,
            cancel,
        )
        .await?;

        self.record_video(staged, &outcome);
        Ok(outcome)
    }

    /// Generate a report from the current media and persist it.
    /// On any failure the previous report is left untouched and nothing is written.
    pub async fn generate_report<P: ModelProvider>(
        &mut self,
        provider: &P,
        report_path: &Path,
    ) -> Result<InspectionReport> {
        let report = requester::generate_report(provider, &self.cache, &self.media).await?;
        save_report(&report, report_path).await?;
        self.last_report = Some(report.clone());
        Ok(report)
    }

    /// Forget all user media: delete remote copies (best effort), extracted
    /// frames and the holding area. Returns how many items were dropped.
    pub async fn clear_media<P: ModelProvider>(&mut self, provider: &P) -> usize {
        let media = std::mem::take(&mut self.media);
        let cleared = discard_media(provider, media.into_values()).await;

        clear_frames(&self.frames_dir).await;
        remove_holding_area(&self.holding_area).await;
        self.last_batch = None;
        self.last_extraction = None;

        tracing::info!(cleared, "Cleared user media");
        cleared
    }

    /// Remove the holding area on shutdown
    pub async fn close(&self) {
        remove_holding_area(&self.holding_area).await;
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            cache: self.cache.name.clone(),
            cache_expires_at: self.cache.expire_time,
            standards: self.library.standards.len(),
            examples: ExampleCategory::ALL
                .iter()
                .map(|c| (*c, self.library.example_count(*c)))
                .collect(),
            load_failures: self.load_batch.failed.len(),
            media: self
                .media
                .values()
                .map(|item| MediaSummary {
                    name: item.name.clone(),
                    kind: item.kind,
                    state: item.state(),
                    timestamp_secs: item.timestamp_secs,
                })
                .collect(),
            last_batch: self.last_batch.clone(),
            skipped_frames: self
                .last_extraction
                .as_ref()
                .map(|e| e.skipped_secs.clone())
                .unwrap_or_default(),
            has_report: self.last_report.is_some(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::InspectionError;
    use crate::frames::fake::FakeDecoder;
    use crate::provider::mock::MockProvider;
    use crate::report::SAMPLE_REPORT;

    pub(crate) fn test_config(root: &Path) -> Config {
        let mut config = Config::with_api_key("test-key");
        config.standards_dir = root.join("building_standards");
        config.examples_dir = root.join("examples");
        config.frames_dir = root.join("extracted_frames");
        config.report_path = root.join("inspection_report.json");
        config
    }

    pub(crate) fn seed_reference_dirs(root: &Path) {
        for file in [
            "building_standards/code.pdf",
            "building_standards/notes.exe",
            "examples/example1/report.pdf",
            "examples/example2/report.docx",
        ] {
            let path = root.join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, b"reference").unwrap();
        }
    }

    #[tokio::test]
    async fn test_initialize_builds_cache_from_standards() {
        let root = tempfile::tempdir().unwrap();
        seed_reference_dirs(root.path());
        let provider = MockProvider::new();

        let session = InspectionSession::initialize(&provider, &test_config(root.path()))
            .await
            .unwrap();

        assert_eq!(session.library.standards.len(), 1);
        assert_eq!(session.library.example_count(ExampleCategory::Example1), 1);
        assert_eq!(session.library.example_count(ExampleCategory::Example2), 1);
        assert!(!session.holding_area().exists());
        assert_eq!(session.frames_dir(), root.path().join("extracted_frames"));

        let requests = provider.cache_requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].display_name, "home_inspection_cache");
        assert_eq!(requests[0].documents.len(), 1);
        assert_eq!(requests[0].ttl.num_minutes(), 60);
        assert!(requests[0].system_instruction.starts_with("You are an expert"));
    }

    #[tokio::test]
    async fn test_generate_report_persists() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let provider = MockProvider::new().replying(SAMPLE_REPORT);
        let mut session = InspectionSession::initialize(&provider, &config).await.unwrap();

        session
            .ingest_images(
                &provider,
                vec![PathBuf::from("/uploads/kitchen.jpg")],
                &config.ingest_options(),
                &CancellationToken::new(),
            )
            .await;
        let report = session.generate_report(&provider, &config.report_path).await.unwrap();

        assert_eq!(session.last_report.as_ref(), Some(&report));
        let saved = std::fs::read_to_string(&config.report_path).unwrap();
        assert_eq!(crate::report::parse_report(&saved).unwrap(), report);
        assert!(session.summary().has_report);
    }

    #[tokio::test]
    async fn test_malformed_reply_persists_nothing() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let provider = MockProvider::new().replying("not json");
        let mut session = InspectionSession::initialize(&provider, &config).await.unwrap();

        let result = session.generate_report(&provider, &config.report_path).await;

        assert!(matches!(result, Err(InspectionError::MalformedReport(_))));
        assert!(session.last_report.is_none());
        assert!(!config.report_path.exists());
    }

    #[tokio::test]
    async fn test_video_frames_then_clear() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let provider = MockProvider::new();
        let sampler = FrameSampler::new(FakeDecoder::with_duration(30.0, 12).failing_at(5), 5);
        let mut session = InspectionSession::initialize(&provider, &config).await.unwrap();

        session
            .ingest_video(
                &provider,
                &sampler,
                Path::new("walk.mp4"),
                VideoMode::Frames,
                &config.ingest_options(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let summary = session.summary();
        assert_eq!(summary.media.len(), 2);
        assert_eq!(summary.skipped_frames, vec![5]);

        let cleared = session.clear_media(&provider).await;
        assert_eq!(cleared, 2);
        assert!(session.media.is_empty());
        assert_eq!(
            *provider.deleted.lock().unwrap(),
            vec!["files/frame_0.jpg", "files/frame_10.jpg"]
        );
        assert!(!config.frames_dir.join("frame_0.jpg").exists());
        assert!(!config.frames_dir.join("manifest.json").exists());
    }

    #[tokio::test]
    async fn test_second_video_replaces_earlier_frames() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let provider = MockProvider::new();
        let mut session = InspectionSession::initialize(&provider, &config).await.unwrap();
        let cancel = CancellationToken::new();

        let first = FrameSampler::new(FakeDecoder::with_duration(30.0, 12), 5);
        session
            .ingest_video(
                &provider,
                &first,
                Path::new("first.mp4"),
                VideoMode::Frames,
                &config.ingest_options(),
                &cancel,
            )
            .await
            .unwrap();
        session
            .ingest_images(
                &provider,
                vec![PathBuf::from("/uploads/kitchen.jpg")],
                &config.ingest_options(),
                &cancel,
            )
            .await;

        let second = FrameSampler::new(FakeDecoder::with_duration(30.0, 7), 5);
        session
            .ingest_video(
                &provider,
                &second,
                Path::new("second.mp4"),
                VideoMode::Frames,
                &config.ingest_options(),
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(
            *provider.deleted.lock().unwrap(),
            vec!["files/frame_0.jpg", "files/frame_10.jpg", "files/frame_5.jpg"]
        );
        assert_eq!(
            session.media.keys().collect::<Vec<_>>(),
            vec!["frame_0.jpg", "frame_5.jpg", "kitchen.jpg"]
        );
        assert!(config.frames_dir.join("frame_5.jpg").exists());
        assert!(!config.frames_dir.join("frame_10.jpg").exists());
        assert_eq!(session.last_extraction.as_ref().unwrap().frames.len(), 2);

        let cleared = session.clear_media(&provider).await;

        assert_eq!(cleared, 3);
        assert_eq!(provider.deleted.lock().unwrap().len(), 6);
        assert!(!config.frames_dir.join("frame_0.jpg").exists());
        assert!(!config.frames_dir.join("frame_5.jpg").exists());
        assert!(!config.frames_dir.join("manifest.json").exists());
    }

    #[tokio::test]
    async fn test_upload_mode_keeps_existing_frames() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let provider = MockProvider::new();
        let sampler = FrameSampler::new(FakeDecoder::with_duration(30.0, 7), 5);
        let mut session = InspectionSession::initialize(&provider, &config).await.unwrap();
        let cancel = CancellationToken::new();

        session
            .ingest_video(
                &provider,
                &sampler,
                Path::new("first.mp4"),
                VideoMode::Frames,
                &config.ingest_options(),
                &cancel,
            )
            .await
            .unwrap();
        session
            .ingest_video(
                &provider,
                &sampler,
                Path::new("walk.mp4"),
                VideoMode::Upload,
                &config.ingest_options(),
                &cancel,
            )
            .await
            .unwrap();

        assert!(provider.deleted.lock().unwrap().is_empty());
        assert_eq!(
            session.media.keys().collect::<Vec<_>>(),
            vec!["frame_0.jpg", "frame_5.jpg", "walk.mp4"]
        );
    }
}
