//! Shared data models used across modules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::InspectionError;
use crate::provider::{FileState, RemoteFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Frame,
}

/// A user-submitted image, video, or extracted frame
#[derive(Debug, Clone, Serialize)]
pub struct MediaItem {
    pub name: String,
    pub source_path: PathBuf,
    pub kind: MediaKind,
    /// Offset into the parent video, frames only
    pub timestamp_secs: Option<u64>,
    pub remote: Option<RemoteFile>,
    pub ingested_at: DateTime<Utc>,
}

impl MediaItem {
    pub fn new(name: impl Into<String>, source_path: impl Into<PathBuf>, kind: MediaKind) -> Self {
        Self {
            name: name.into(),
            source_path: source_path.into(),
            kind,
            timestamp_secs: None,
            remote: None,
            ingested_at: Utc::now(),
        }
    }

    pub fn with_remote(mut self, remote: RemoteFile) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_timestamp(mut self, secs: u64) -> Self {
        self.timestamp_secs = Some(secs);
        self
    }

    pub fn state(&self) -> Option<FileState> {
        self.remote.as_ref().map(|r| r.state)
    }

    /// Only items the provider has finished processing go into a report request
    pub fn is_usable(&self) -> bool {
        self.state() == Some(FileState::Ready)
    }
}

/// User-supplied media keyed by logical name
pub type UserMedia = BTreeMap<String, MediaItem>;

/// One file that could not be loaded in a batch
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub reason: String,
}

impl From<InspectionError> for FileFailure {
    fn from(err: InspectionError) -> Self {
        match err {
            InspectionError::FileLoad { path, reason } => FileFailure { path, reason },
            InspectionError::UnreadableMedia { path, reason } => FileFailure { path, reason },
            other => FileFailure {
                path: PathBuf::new(),
                reason: other.to_string(),
            },
        }
    }
}

/// Per-file outcome of a batch load
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<FileFailure>,
}

impl BatchReport {
    pub fn record_success(&mut self, name: impl Into<String>) {
        self.succeeded.push(name.into());
    }

    pub fn record_failure(&mut self, failure: impl Into<FileFailure>) {
        self.failed.push(failure.into());
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}
