//! Runtime configuration, read once from the environment at startup

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::constants::{
    DEFAULT_CACHE_TTL_MINUTES, DEFAULT_EXAMPLES_DIR, DEFAULT_FRAME_INTERVAL_SECS,
    DEFAULT_FRAMES_DIR, DEFAULT_MODEL, DEFAULT_PORT, DEFAULT_REPORT_PATH, DEFAULT_STANDARDS_DIR,
    DEFAULT_UPLOAD_CONCURRENCY, DEFAULT_VIDEO_POLL_INTERVAL_SECS,
    DEFAULT_VIDEO_UPLOAD_TIMEOUT_SECS,
};
use crate::error::{InspectionError, Result};
use crate::ingest::IngestOptions;
use crate::video_upload::PollPolicy;

pub const API_KEY_VAR: &str = "GOOGLE_GEMINI_API_KEY";

#[derive(Clone)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub standards_dir: PathBuf,
    pub examples_dir: PathBuf,
    pub frames_dir: PathBuf,
    pub report_path: PathBuf,
    pub frame_interval_secs: u64,
    pub video_poll_interval_secs: u64,
    pub video_upload_timeout_secs: u64,
    pub upload_concurrency: usize,
    pub cache_ttl_minutes: i64,
    pub port: u16,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("standards_dir", &self.standards_dir)
            .field("examples_dir", &self.examples_dir)
            .field("frames_dir", &self.frames_dir)
            .field("report_path", &self.report_path)
            .field("frame_interval_secs", &self.frame_interval_secs)
            .field("video_poll_interval_secs", &self.video_poll_interval_secs)
            .field("video_upload_timeout_secs", &self.video_upload_timeout_secs)
            .field("upload_concurrency", &self.upload_concurrency)
            .field("cache_ttl_minutes", &self.cache_ttl_minutes)
            .field("port", &self.port)
            .finish()
    }
}

impl Config {
    /// Defaults for everything except the credential
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            standards_dir: PathBuf::from(DEFAULT_STANDARDS_DIR),
            examples_dir: PathBuf::from(DEFAULT_EXAMPLES_DIR),
            frames_dir: PathBuf::from(DEFAULT_FRAMES_DIR),
            report_path: PathBuf::from(DEFAULT_REPORT_PATH),
            frame_interval_secs: DEFAULT_FRAME_INTERVAL_SECS,
            video_poll_interval_secs: DEFAULT_VIDEO_POLL_INTERVAL_SECS,
            video_upload_timeout_secs: DEFAULT_VIDEO_UPLOAD_TIMEOUT_SECS,
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            cache_ttl_minutes: DEFAULT_CACHE_TTL_MINUTES,
            port: DEFAULT_PORT,
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Missing or blank credentials are a
    /// configuration error; unparsable or non-positive numbers fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup(API_KEY_VAR)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| InspectionError::Configuration(format!("{} must be set", API_KEY_VAR)))?;

        let defaults = Self::with_api_key(api_key);
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            model: text("GEMINI_MODEL").unwrap_or(defaults.model.clone()),
            standards_dir: text("STANDARDS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.standards_dir.clone()),
            examples_dir: text("EXAMPLES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.examples_dir.clone()),
            frames_dir: text("FRAMES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.frames_dir.clone()),
            report_path: text("REPORT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.report_path.clone()),
            frame_interval_secs: positive(&lookup, "FRAME_INTERVAL_SECS")
                .unwrap_or(defaults.frame_interval_secs),
            video_poll_interval_secs: positive(&lookup, "VIDEO_POLL_INTERVAL_SECS")
                .unwrap_or(defaults.video_poll_interval_secs),
            video_upload_timeout_secs: positive(&lookup, "VIDEO_UPLOAD_TIMEOUT_SECS")
                .unwrap_or(defaults.video_upload_timeout_secs),
            upload_concurrency: positive(&lookup, "UPLOAD_CONCURRENCY")
                .unwrap_or(defaults.upload_concurrency),
            cache_ttl_minutes: positive(&lookup, "CACHE_TTL_MINUTES")
                .unwrap_or(defaults.cache_ttl_minutes),
            port: positive(&lookup, "PORT").unwrap_or(defaults.port),
            ..defaults
        })
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::from_secs(self.video_poll_interval_secs, self.video_upload_timeout_secs)
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            concurrency: self.upload_concurrency,
            poll: self.poll_policy(),
        }
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.cache_ttl_minutes)
    }
}

fn positive<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr + PartialOrd + Default,
{
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .filter(|v: &T| *v > T::default())
}
