//! Gemini client. Uploads and deletes go through the File API client from
//! `reson_agentic`; status checks, cached contents and generateContent are
//! plain REST calls.

use reqwest::Client;
use reson_agentic::providers::{FileState as UploadState, GoogleGenAIClient};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::retry::{RetryPolicy, with_backoff};
use super::{
    CacheRequest, CachedContext, FileState, GenerationConfig, ModelProvider, Part, ProviderError,
    RemoteFile,
};
use crate::constants::DEFAULT_MODEL;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    http: Client,
    files: GoogleGenAIClient,
    retry: RetryPolicy,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Result<Self, ProviderError> {
        let http = Client::builder().timeout(Duration::from_secs(300)).build()?;

        Ok(Self {
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            http,
            files: GoogleGenAIClient::new(api_key, DEFAULT_MODEL),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v1beta/{}", self.base_url, path)
    }
}

impl ModelProvider for GeminiClient {
    async fn upload(
        &self,
        path: &Path,
        mime_type: &str,
        display_name: &str,
    ) -> Result<RemoteFile, ProviderError> {
        let data = tokio::fs::read(path).await?;

        tracing::debug!(
            path = %path.display(),
            bytes = data.len(),
            mime_type,
            "Uploading file to Gemini File API"
        );

        let (data, files) = (&data, &self.files);
        let uploaded = with_backoff("files.upload", self.retry, || async move {
            files
                .upload_file(data, mime_type, Some(display_name))
                .await
                .map_err(|e| ProviderError::Client(e.to_string()))
        })
        .await?;

        if uploaded.state == UploadState::Processing {
            return Ok(RemoteFile {
                name: uploaded.name,
                uri: uploaded.uri,
                mime_type: mime_type.to_string(),
                display_name: Some(display_name.to_string()),
                state: FileState::Pending,
            });
        }

        // Settled at upload time, read back whether it is active or failed
        self.get_file(&uploaded.name).await
    }

    async fn get_file(&self, name: &str) -> Result<RemoteFile, ProviderError> {
        with_backoff("files.get", self.retry, || async move {
            let resp = self
                .http
                .get(self.api_url(name))
                .header("x-goog-api-key", &self.api_key)
                .send()
                .await?;

            let file: WireFile = check_status(resp).await?.json().await?;
            Ok(file.into())
        })
        .await
    }

    async fn create_cached_context(&self, request: &CacheRequest) -> Result<CachedContext, ProviderError> {
        let body = WireCacheRequest {
            model: model_path(&request.model),
            display_name: request.display_name.clone(),
            system_instruction: WireContent {
                role: None,
                parts: vec![WirePart::text(&request.system_instruction)],
            },
            contents: vec![WireContent {
                role: Some("user".to_string()),
                parts: request
                    .documents
                    .iter()
                    .map(|doc| WirePart::file(&doc.uri, &doc.mime_type))
                    .collect(),
            }],
            ttl: format!("{}s", request.ttl.num_seconds()),
        };

        let body = &body;
        let cached: WireCachedContent = with_backoff("cachedContents.create", self.retry, || async move {
            let resp = self
                .http
                .post(self.api_url("cachedContents"))
                .header("x-goog-api-key", &self.api_key)
                .json(body)
                .send()
                .await?;
            Ok(check_status(resp).await?.json().await?)
        })
        .await?;

        let expire_time = cached
            .expire_time
            .as_deref()
            .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&chrono::Utc));

        Ok(CachedContext {
            name: cached.name,
            model: cached.model.unwrap_or_else(|| model_path(&request.model)),
            expire_time,
        })
    }

    async fn send_request(
        &self,
        context: &CachedContext,
        parts: &[Part],
        config: &GenerationConfig,
    ) -> Result<String, ProviderError> {
        let body = WireGenerateRequest {
            cached_content: context.name.clone(),
            contents: vec![WireContent {
                role: Some("user".to_string()),
                parts: parts.iter().map(WirePart::from).collect(),
            }],
            generation_config: WireGenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens,
                response_mime_type: config.response_mime_type.clone(),
            },
        };

        let url = self.api_url(&format!("{}:generateContent", model_path(&context.model)));
        let (url, body) = (url.as_str(), &body);

        let response: WireGenerateResponse = with_backoff("models.generateContent", self.retry, || async move {
            let resp = self
                .http
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(body)
                .send()
                .await?;
            Ok(check_status(resp).await?.json().await?)
        })
        .await?;

        response.into_text()
    }

    async fn delete_file(&self, name: &str) -> Result<(), ProviderError> {
        let files = &self.files;
        with_backoff("files.delete", self.retry, || async move {
            files
                .delete_file(name)
                .await
                .map(|_| ())
                .map_err(|e| ProviderError::Client(e.to_string()))
        })
        .await
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(ProviderError::Api { status, body })
}

fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

// Wire types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFile {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    state: Option<String>,
}

impl From<WireFile> for RemoteFile {
    fn from(file: WireFile) -> Self {
        let state = match file.state.as_deref() {
            Some("ACTIVE") => FileState::Ready,
            Some("FAILED") => FileState::Failed,
            // PROCESSING and STATE_UNSPECIFIED
            _ => FileState::Pending,
        };

        RemoteFile {
            name: file.name,
            uri: file.uri,
            mime_type: file.mime_type,
            display_name: file.display_name,
            state,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    file_data: Option<WireFileData>,
}

impl WirePart {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            file_data: None,
        }
    }

    fn file(uri: &str, mime_type: &str) -> Self {
        Self {
            text: None,
            file_data: Some(WireFileData {
                mime_type: mime_type.to_string(),
                file_uri: uri.to_string(),
            }),
        }
    }
}

impl From<&Part> for WirePart {
    fn from(part: &Part) -> Self {
        match part {
            Part::Text(text) => WirePart::text(text),
            Part::File { uri, mime_type } => WirePart::file(uri, mime_type),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireCacheRequest {
    model: String,
    display_name: String,
    system_instruction: WireContent,
    contents: Vec<WireContent>,
    ttl: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCachedContent {
    name: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    expire_time: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerateRequest {
    cached_content: String,
    contents: Vec<WireContent>,
    generation_config: WireGenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerateResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    #[serde(default)]
    prompt_feedback: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

impl WireGenerateResponse {
    fn into_text(self) -> Result<String, ProviderError> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            let feedback = self
                .prompt_feedback
                .map(|f| f.to_string())
                .unwrap_or_else(|| "none".to_string());
            return Err(ProviderError::Protocol(format!(
                "response had no candidates (prompt feedback: {})",
                feedback
            )));
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::Protocol(format!(
                "candidate had no text (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_states_map_to_remote_states() {
        let parse = |state: &str| -> RemoteFile {
            let json = format!(
                r#"{{"name":"files/abc","mimeType":"video/mp4","uri":"https://example/files/abc","state":"{}"}}"#,
                state
            );
            serde_json::from_str::<WireFile>(&json).unwrap().into()
        };

        assert_eq!(parse("PROCESSING").state, FileState::Pending);
        assert_eq!(parse("STATE_UNSPECIFIED").state, FileState::Pending);
        assert_eq!(parse("ACTIVE").state, FileState::Ready);
        assert_eq!(parse("FAILED").state, FileState::Failed);
    }

    #[test]
    fn test_generate_response_joins_text_parts() {
        let json = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "{\"a\":"}, {"text": " 1}"}]},
                "finishReason": "STOP"
            }]
        }"#;
        let response: WireGenerateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.into_text().unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn test_blocked_prompt_is_protocol_error() {
        let json = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let response: WireGenerateResponse = serde_json::from_str(json).unwrap();
        let err = response.into_text().unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_generate_request_wire_shape() {
        let body = WireGenerateRequest {
            cached_content: "cachedContents/xyz".into(),
            contents: vec![WireContent {
                role: Some("user".into()),
                parts: vec![
                    WirePart::from(&Part::text("hello")),
                    WirePart::from(&Part::File {
                        uri: "https://example/files/1".into(),
                        mime_type: "image/jpeg".into(),
                    }),
                ],
            }],
            generation_config: WireGenerationConfig {
                temperature: 0.1,
                max_output_tokens: 8192,
                response_mime_type: "application/json".into(),
            },
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["cachedContent"], "cachedContents/xyz");
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(
            value["contents"][0]["parts"][1]["fileData"]["fileUri"],
            "https://example/files/1"
        );
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 8192);
        assert_eq!(
            value["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn test_model_path_prefix() {
        assert_eq!(model_path("gemini-1.5-flash-002"), "models/gemini-1.5-flash-002");
        assert_eq!(model_path("models/gemini-1.5-flash-002"), "models/gemini-1.5-flash-002");
    }
}
