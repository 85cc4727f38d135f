//! Video frame sampling
//!
//! Opens a video, samples one still every `interval_secs` from the start,
//! writes each decoded frame as `frame_<seconds>.jpg`, and records a manifest
//! of what was extracted and which timestamps could not be decoded.

use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::future::Future;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{InspectionError, Result};
use crate::storage::file_name_of;

const DEFAULT_FFMPEG_THREADS: usize = 1;
const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Opens videos for frame-accurate seeking
pub trait VideoDecoder: Send + Sync {
    type Stream: VideoStream;

    /// Fails with `UnreadableMedia` when the file cannot be opened
    fn open(&self, path: &Path) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// An open video. Dropping it releases the underlying decoder.
pub trait VideoStream: Send {
    fn frame_rate(&self) -> f64;

    fn frame_count(&self) -> u64;

    /// Seek to `at_secs` and decode one frame, `None` if the seek or decode fails
    fn decode_at(&mut self, at_secs: u64) -> impl Future<Output = Option<DynamicImage>> + Send;
}

/// A still extracted from a video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// File name of the parent video
    pub video: String,
    pub timestamp_secs: u64,
    pub file_name: String,
    pub path: PathBuf,
}

impl Frame {
    /// Synthetic key used in the frame mapping, e.g. `video_5s`
    pub fn key(&self) -> String {
        frame_key(self.timestamp_secs)
    }
}

/// Outcome of sampling one video, also written as the frames manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameExtraction {
    pub video: PathBuf,
    pub frame_rate: f64,
    pub frame_count: u64,
    pub duration_secs: f64,
    pub interval_secs: u64,
    pub frames: Vec<Frame>,
    /// Timestamps that were attempted but produced no frame
    pub skipped_secs: Vec<u64>,
}

impl FrameExtraction {
    pub fn attempted(&self) -> usize {
        self.frames.len() + self.skipped_secs.len()
    }

    pub fn is_complete(&self) -> bool {
        self.skipped_secs.is_empty()
    }

    /// `video_<t>s` -> frame path
    pub fn frame_paths(&self) -> BTreeMap<String, PathBuf> {
        self.frames
            .iter()
            .map(|f| (f.key(), f.path.clone()))
            .collect()
    }
}

pub fn frame_file_name(timestamp_secs: u64) -> String {
    format!("frame_{}.jpg", timestamp_secs)
}

pub fn frame_key(timestamp_secs: u64) -> String {
    format!("video_{}s", timestamp_secs)
}

/// Only names the sampler writes, e.g. `frame_15.jpg`
pub fn is_frame_file_name(name: &str) -> bool {
    name.strip_prefix("frame_")
        .and_then(|rest| rest.strip_suffix(".jpg"))
        .map(|secs| !secs.is_empty() && secs.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

/// Remove extracted frames and the manifest from `dir`, leaving anything else alone.
/// Returns how many frame files were removed.
pub async fn clear_frames(dir: &Path) -> usize {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to read frames dir");
            }
            return 0;
        }
    };

    let mut removed = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to list frames dir");
                break;
            }
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        let is_frame = is_frame_file_name(&name);
        if !is_frame && name != MANIFEST_FILE_NAME {
            continue;
        }

        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) if is_frame => removed += 1,
            Ok(()) => {}
            Err(e) => tracing::warn!(file = %name, error = %e, "Failed to remove frame"),
        }
    }

    tracing::debug!(path = %dir.display(), removed, "Cleared extracted frames");
    removed
}

/// Timestamps 0, S, 2S, ... strictly below `duration_secs`
pub fn sample_timestamps(duration_secs: f64, interval_secs: u64) -> Vec<u64> {
    let step = interval_secs.max(1);
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Vec::new();
    }
    (0u64..)
        .step_by(step as usize)
        .take_while(|t| (*t as f64) < duration_secs)
        .collect()
}

pub struct FrameSampler<D> {
    decoder: D,
    interval_secs: u64,
}

impl<D: VideoDecoder> FrameSampler<D> {
    pub fn new(decoder: D, interval_secs: u64) -> Self {
        Self {
            decoder,
            interval_secs: interval_secs.max(1),
        }
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    /// Sample `video` into `output_dir` (created if absent).
    /// The decoder is released on every return path when `stream` drops.
    pub async fn sample(&self, video: &Path, output_dir: &Path) -> Result<FrameExtraction> {
        let mut stream = self.decoder.open(video).await?;

        let frame_rate = stream.frame_rate();
        let frame_count = stream.frame_count();
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(InspectionError::unreadable(
                video,
                format!("invalid frame rate {}", frame_rate),
            ));
        }

        let duration_secs = frame_count as f64 / frame_rate;
        if duration_secs <= 0.0 {
            return Err(InspectionError::unreadable(video, "video has zero duration"));
        }

        tokio::fs::create_dir_all(output_dir).await?;

        let video_name = file_name_of(video);
        let mut frames = Vec::new();
        let mut skipped_secs = Vec::new();

        for timestamp in sample_timestamps(duration_secs, self.interval_secs) {
            let Some(image) = stream.decode_at(timestamp).await else {
                tracing::debug!(video = %video_name, timestamp, "No frame at timestamp, skipping");
                skipped_secs.push(timestamp);
                continue;
            };

            let file_name = frame_file_name(timestamp);
            let path = output_dir.join(&file_name);
            write_jpeg(&image, &path).await?;

            frames.push(Frame {
                video: video_name.clone(),
                timestamp_secs: timestamp,
                file_name,
                path,
            });
        }

        let extraction = FrameExtraction {
            video: video.to_path_buf(),
            frame_rate,
            frame_count,
            duration_secs,
            interval_secs: self.interval_secs,
            frames,
            skipped_secs,
        };

        write_manifest(&extraction, output_dir).await?;

        tracing::info!(
            video = %video_name,
            duration_secs,
            extracted = extraction.frames.len(),
            skipped = extraction.skipped_secs.len(),
            "Extracted video frames"
        );

        Ok(extraction)
    }
}

async fn write_jpeg(image: &DynamicImage, path: &Path) -> Result<()> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut output_buf = Cursor::new(Vec::new());
    rgb.write_to(&mut output_buf, image::ImageFormat::Jpeg)
        .map_err(|e| InspectionError::unreadable(path, format!("failed to encode frame: {}", e)))?;
    tokio::fs::write(path, output_buf.into_inner()).await?;
    Ok(())
}

async fn write_manifest(extraction: &FrameExtraction, output_dir: &Path) -> Result<()> {
    let manifest_json = serde_json::to_string_pretty(extraction)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    tokio::fs::write(output_dir.join(MANIFEST_FILE_NAME), manifest_json).await?;
    Ok(())
}

// ffmpeg-backed decoder

/// Decoder that shells out to `ffprobe` and `ffmpeg`
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    threads: usize,
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self {
            threads: ffmpeg_threads(),
        }
    }
}

/// An opened video plus a private staging directory for grabbed frames
#[derive(Debug)]
pub struct FfmpegStream {
    input: PathBuf,
    staging_dir: PathBuf,
    frame_rate: f64,
    frame_count: u64,
    threads: usize,
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.staging_dir) {
            tracing::warn!(
                path = %self.staging_dir.display(),
                error = %e,
                "Failed to clean up frame staging dir"
            );
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    r_frame_rate: Option<String>,
    #[serde(default)]
    nb_frames: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    duration: Option<String>,
}

/// Parse ffprobe's rational frame rate, e.g. `30000/1001`
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let (num, den) = match rate.split_once('/') {
        Some((n, d)) => (n.trim().parse::<f64>().ok()?, d.trim().parse::<f64>().ok()?),
        None => (rate.trim().parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}

/// Frame rate and frame count from ffprobe JSON.
/// Containers that do not record a frame count fall back to duration * rate.
fn parse_probe(json: &[u8]) -> Option<(f64, u64)> {
    let probe: ProbeOutput = serde_json::from_slice(json).ok()?;
    let stream = probe.streams.first()?;
    let frame_rate = stream.r_frame_rate.as_deref().and_then(parse_frame_rate)?;

    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .or_else(|| {
            let duration = probe
                .format
                .as_ref()?
                .duration
                .as_deref()?
                .parse::<f64>()
                .ok()?;
            Some((duration * frame_rate).round() as u64)
        })
        .unwrap_or(0);

    Some((frame_rate, frame_count))
}

impl VideoDecoder for FfmpegDecoder {
    type Stream = FfmpegStream;

    async fn open(&self, path: &Path) -> Result<FfmpegStream> {
        if !path.is_file() {
            return Err(InspectionError::unreadable(path, "file not found"));
        }

        let output = Command::new("ffprobe")
            .args(["-v", "error"])
            .args(["-select_streams", "v:0"])
            .args(["-show_entries", "stream=r_frame_rate,nb_frames:format=duration"])
            .args(["-of", "json"])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| InspectionError::unreadable(path, format!("failed to spawn ffprobe: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InspectionError::unreadable(path, stderr.trim()));
        }

        let (frame_rate, frame_count) = parse_probe(&output.stdout)
            .ok_or_else(|| InspectionError::unreadable(path, "no video stream found"))?;

        let staging_dir =
            std::env::temp_dir().join(format!("home_inspector_frames_{}", rand::random::<u64>()));
        tokio::fs::create_dir_all(&staging_dir).await?;

        Ok(FfmpegStream {
            input: path.to_path_buf(),
            staging_dir,
            frame_rate,
            frame_count,
            threads: self.threads,
        })
    }
}

impl VideoStream for FfmpegStream {
    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    async fn decode_at(&mut self, at_secs: u64) -> Option<DynamicImage> {
        let grab_path = self.staging_dir.join(format!("grab_{}.jpg", at_secs));

        // -ss before -i seeks on the input, so each grab is independent of the last
        let status = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .args(["-threads", &self.threads.to_string()])
            .args(["-ss", &at_secs.to_string()])
            .arg("-i")
            .arg(&self.input)
            .args(["-an", "-sn"])
            .args(["-frames:v", "1"])
            .args(["-q:v", "2"])
            .arg("-y")
            .arg(&grab_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(s) if s.success() => {}
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to spawn ffmpeg");
                return None;
            }
        }

        let data = tokio::fs::read(&grab_path).await.ok()?;
        let _ = tokio::fs::remove_file(&grab_path).await;

        match ImageReader::new(Cursor::new(&data)).with_guessed_format() {
            Ok(reader) => reader
                .decode()
                .map_err(|e| tracing::warn!(at_secs, error = %e, "Failed to decode frame"))
                .ok(),
            Err(e) => {
                tracing::warn!(at_secs, error = %e, "Failed to read frame");
                None
            }
        }
    }
}

fn ffmpeg_threads() -> usize {
    env::var("FFMPEG_THREADS")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_FFMPEG_THREADS)
}
