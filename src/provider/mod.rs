//! Hosted model provider boundary.
//!
//! The inspection pipeline only ever talks to the model through
//! [`ModelProvider`]: upload a file, check its processing state, bake reference
//! documents into a cached context, and send one request against that context.
//! [`GeminiClient`] is the production implementation.

pub mod gemini;
pub mod retry;

#[cfg(test)]
pub mod mock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use thiserror::Error;

pub use gemini::GeminiClient;

/// Errors raised by a provider call
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Protocol(String),

    /// Failure reported by the File API client
    #[error("file api error: {0}")]
    Client(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    /// Whether retrying the same call could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ProviderError::Api { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Client(_) => true,
            ProviderError::Protocol(_) | ProviderError::Io(_) => false,
        }
    }
}

/// Processing state of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    Pending,
    Ready,
    Failed,
}

/// Opaque handle for a file the provider has accepted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Provider resource name, e.g. `files/abc123`
    pub name: String,
    pub uri: String,
    pub mime_type: String,
    pub display_name: Option<String>,
    pub state: FileState,
}

/// Everything needed to create a provider-side cached context
#[derive(Debug, Clone)]
pub struct CacheRequest {
    pub model: String,
    pub display_name: String,
    pub system_instruction: String,
    pub documents: Vec<RemoteFile>,
    pub ttl: chrono::Duration,
}

/// A cached bundle of reference documents and system instructions
#[derive(Debug, Clone, Serialize)]
pub struct CachedContext {
    pub name: String,
    pub model: String,
    pub expire_time: Option<DateTime<Utc>>,
}

/// One piece of request content
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    File { uri: String, mime_type: String },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    pub fn file(file: &RemoteFile) -> Self {
        Part::File {
            uri: file.uri.clone(),
            mime_type: file.mime_type.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub response_mime_type: String,
}

/// Capability exposed by the hosted model
pub trait ModelProvider: Send + Sync {
    /// Upload a local file and return its remote handle
    fn upload(
        &self,
        path: &Path,
        mime_type: &str,
        display_name: &str,
    ) -> impl Future<Output = Result<RemoteFile, ProviderError>> + Send;

    /// Re-read a file's current state
    fn get_file(&self, name: &str) -> impl Future<Output = Result<RemoteFile, ProviderError>> + Send;

    fn create_cached_context(
        &self,
        request: &CacheRequest,
    ) -> impl Future<Output = Result<CachedContext, ProviderError>> + Send;

    /// Send a single user turn against a cached context and return the reply text
    fn send_request(
        &self,
        context: &CachedContext,
        parts: &[Part],
        config: &GenerationConfig,
    ) -> impl Future<Output = Result<String, ProviderError>> + Send;

    fn delete_file(&self, name: &str) -> impl Future<Output = Result<(), ProviderError>> + Send;
}
