//! In-memory provider used by unit tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{
    CacheRequest, CachedContext, FileState, GenerationConfig, ModelProvider, Part, ProviderError,
    RemoteFile,
};

#[derive(Default)]
pub struct MockProvider {
    /// File names (not paths) whose upload should fail
    fail_uploads: HashSet<String>,
    /// Scripted states returned by successive `get_file` calls, per display name
    state_scripts: Mutex<HashMap<String, VecDeque<FileState>>>,
    /// State a fresh upload starts in
    initial_state: Option<FileState>,
    /// `get_file` answers with this HTTP status instead of a file
    status_check_error: Option<u16>,
    reply: Mutex<Option<Result<String, u16>>>,
    pub uploaded: Mutex<Vec<PathBuf>>,
    pub deleted: Mutex<Vec<String>>,
    pub status_checks: Mutex<u32>,
    pub cache_requests: Mutex<Vec<CacheRequest>>,
    pub sent: Mutex<Vec<Vec<Part>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_upload(mut self, file_name: &str) -> Self {
        self.fail_uploads.insert(file_name.to_string());
        self
    }

    pub fn uploads_start_as(mut self, state: FileState) -> Self {
        self.initial_state = Some(state);
        self
    }

    pub fn failing_status_checks(mut self, status: u16) -> Self {
        self.status_check_error = Some(status);
        self
    }

    pub fn with_states(self, display_name: &str, states: &[FileState]) -> Self {
        self.state_scripts
            .lock()
            .unwrap()
            .insert(display_name.to_string(), states.iter().copied().collect());
        self
    }

    pub fn replying(self, text: &str) -> Self {
        *self.reply.lock().unwrap() = Some(Ok(text.to_string()));
        self
    }

    pub fn replying_status(self, status: u16) -> Self {
        *self.reply.lock().unwrap() = Some(Err(status));
        self
    }

    pub fn uploaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .uploaded
            .lock()
            .unwrap()
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        names
    }
}

fn remote(display_name: &str, mime_type: &str, state: FileState) -> RemoteFile {
    RemoteFile {
        name: format!("files/{}", display_name),
        uri: format!("https://mock.invalid/files/{}", display_name),
        mime_type: mime_type.to_string(),
        display_name: Some(display_name.to_string()),
        state,
    }
}

impl ModelProvider for MockProvider {
    async fn upload(
        &self,
        path: &Path,
        mime_type: &str,
        display_name: &str,
    ) -> Result<RemoteFile, ProviderError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if self.fail_uploads.contains(&file_name) {
            return Err(ProviderError::Api {
                status: 400,
                body: format!("rejected {}", file_name),
            });
        }

        self.uploaded.lock().unwrap().push(path.to_path_buf());
        Ok(remote(
            display_name,
            mime_type,
            self.initial_state.unwrap_or(FileState::Ready),
        ))
    }

    async fn get_file(&self, name: &str) -> Result<RemoteFile, ProviderError> {
        *self.status_checks.lock().unwrap() += 1;
        if let Some(status) = self.status_check_error {
            return Err(ProviderError::Api {
                status,
                body: format!("no such file {}", name),
            });
        }
        let display_name = name.trim_start_matches("files/");

        let state = self
            .state_scripts
            .lock()
            .unwrap()
            .get_mut(display_name)
            .and_then(|script| {
                if script.len() > 1 {
                    script.pop_front()
                } else {
                    script.front().copied()
                }
            })
            .unwrap_or(FileState::Ready);

        Ok(remote(display_name, "video/mp4", state))
    }

    async fn create_cached_context(&self, request: &CacheRequest) -> Result<CachedContext, ProviderError> {
        self.cache_requests.lock().unwrap().push(request.clone());
        Ok(CachedContext {
            name: "cachedContents/mock".to_string(),
            model: format!("models/{}", request.model),
            expire_time: None,
        })
    }

    async fn send_request(
        &self,
        _context: &CachedContext,
        parts: &[Part],
        _config: &GenerationConfig,
    ) -> Result<String, ProviderError> {
        self.sent.lock().unwrap().push(parts.to_vec());
        match self.reply.lock().unwrap().clone() {
            Some(Ok(text)) => Ok(text),
            Some(Err(status)) => Err(ProviderError::Api {
                status,
                body: "mock failure".to_string(),
            }),
            None => Err(ProviderError::Protocol("no scripted reply".to_string())),
        }
    }

    async fn delete_file(&self, name: &str) -> Result<(), ProviderError> {
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }
}
