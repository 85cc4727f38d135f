//! Whole-video upload with a bounded wait for provider-side processing

use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::constants::{
    DEFAULT_VIDEO_POLL_INTERVAL_SECS, DEFAULT_VIDEO_UPLOAD_TIMEOUT_SECS,
    MAX_VIDEO_POLL_INTERVAL_SECS,
};
use crate::error::{InspectionError, Result};
use crate::models::{MediaItem, MediaKind};
use crate::provider::{FileState, ModelProvider};
use crate::storage::{content_type_for, file_name_of};

#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Delay before the first status check
    pub interval: Duration,
    /// Backoff ceiling
    pub max_interval: Duration,
    /// Total time allowed for processing
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_VIDEO_POLL_INTERVAL_SECS),
            max_interval: Duration::from_secs(MAX_VIDEO_POLL_INTERVAL_SECS),
            timeout: Duration::from_secs(DEFAULT_VIDEO_UPLOAD_TIMEOUT_SECS),
        }
    }
}

impl PollPolicy {
    pub fn from_secs(interval_secs: u64, timeout_secs: u64) -> Self {
        let interval = Duration::from_secs(interval_secs.max(1));
        Self {
            interval,
            max_interval: Duration::from_secs(MAX_VIDEO_POLL_INTERVAL_SECS).max(interval),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

/// Snapshot passed to the progress observer after each status check
#[derive(Debug, Clone, PartialEq)]
pub struct PollProgress {
    pub name: String,
    pub attempt: u32,
    pub elapsed: Duration,
    pub state: FileState,
}

pub type ProgressObserver<'a> = &'a (dyn Fn(&PollProgress) + Send + Sync);

/// Upload a video and wait until the provider marks it ready.
///
/// Returns a `MediaItem` only for a ready file. Any error after the upload
/// deletes the remote copy (best effort), so nothing unusable gets registered.
pub async fn upload_video<P: ModelProvider>(
    provider: &P,
    path: &Path,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    observer: Option<ProgressObserver<'_>>,
) -> Result<MediaItem> {
    let name = file_name_of(path);

    tracing::info!(video = %name, "Uploading video");
    let mut remote = provider
        .upload(path, content_type_for(path), &name)
        .await
        .map_err(|e| InspectionError::file_load(path, e))?;
    tracing::info!(video = %name, remote = %remote.name, state = ?remote.state, "Uploaded video");

    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut delay = policy.interval;
    let mut attempt = 0u32;

    loop {
        match remote.state {
            FileState::Ready => break,
            FileState::Failed => {
                tracing::warn!(video = %name, "Video processing failed");
                discard(provider, &remote.name).await;
                return Err(InspectionError::UploadFailed { name });
            }
            FileState::Pending => {}
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::warn!(video = %name, attempts = attempt, "Timed out waiting for video processing");
            discard(provider, &remote.name).await;
            return Err(InspectionError::UploadTimeout {
                name,
                waited: now - started,
            });
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(video = %name, "Video processing wait cancelled");
                discard(provider, &remote.name).await;
                return Err(InspectionError::Cancelled { name });
            }
            _ = tokio::time::sleep(delay.min(deadline - now)) => {}
        }

        attempt += 1;
        remote = match provider.get_file(&remote.name).await {
            Ok(checked) => checked,
            Err(e) => {
                tracing::warn!(video = %name, error = %e, "Failed to check video processing state");
                discard(provider, &remote.name).await;
                return Err(e.into());
            }
        };

        let progress = PollProgress {
            name: name.clone(),
            attempt,
            elapsed: started.elapsed(),
            state: remote.state,
        };
        tracing::debug!(
            video = %name,
            attempt,
            elapsed_secs = progress.elapsed.as_secs(),
            state = ?remote.state,
            "Checked video processing state"
        );
        if let Some(observer) = observer {
            observer(&progress);
        }

        delay = (delay * 2).min(policy.max_interval);
    }

    tracing::info!(video = %name, attempts = attempt, "Video ready");
    Ok(MediaItem::new(name, path, MediaKind::Video).with_remote(remote))
}

async fn discard<P: ModelProvider>(provider: &P, remote_name: &str) {
    if let Err(e) = provider.delete_file(remote_name).await {
        tracing::warn!(remote = %remote_name, error = %e, "Failed to delete remote video");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockProvider;
    use std::sync::Mutex;

    fn policy(interval: u64, max: u64, timeout: u64) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(interval),
            max_interval: Duration::from_secs(max),
            timeout: Duration::from_secs(timeout),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_until_ready() {
        let provider = MockProvider::new()
            .uploads_start_as(FileState::Pending)
            .with_states("walk.mp4", &[FileState::Pending, FileState::Ready]);
        let seen = Mutex::new(Vec::new());
        let observer = |p: &PollProgress| seen.lock().unwrap().push(p.clone());

        let item = upload_video(
            &provider,
            Path::new("walk.mp4"),
            &PollPolicy::default(),
            &CancellationToken::new(),
            Some(&observer),
        )
        .await
        .unwrap();

        assert_eq!(item.kind, MediaKind::Video);
        assert!(item.is_usable());
        assert_eq!(*provider.status_checks.lock().unwrap(), 2);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].state, FileState::Pending);
        assert_eq!(seen[1].state, FileState::Ready);
        assert_eq!(seen[1].attempt, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_upload_skips_polling() {
        let provider = MockProvider::new();
        let item = upload_video(
            &provider,
            Path::new("walk.mp4"),
            &PollPolicy::default(),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(item.name, "walk.mp4");
        assert_eq!(*provider.status_checks.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_processing_registers_nothing() {
        let provider = MockProvider::new()
            .uploads_start_as(FileState::Pending)
            .with_states("walk.mp4", &[FileState::Pending, FileState::Failed]);

        let result = upload_video(
            &provider,
            Path::new("walk.mp4"),
            &PollPolicy::default(),
            &CancellationToken::new(),
            None,
        )
        .await;

        assert!(matches!(result, Err(InspectionError::UploadFailed { ref name }) if name == "walk.mp4"));
        assert_eq!(*provider.deleted.lock().unwrap(), vec!["files/walk.mp4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_never_ready() {
        let provider = MockProvider::new()
            .uploads_start_as(FileState::Pending)
            .with_states("walk.mp4", &[FileState::Pending]);

        let result = upload_video(
            &provider,
            Path::new("walk.mp4"),
            &policy(10, 60, 45),
            &CancellationToken::new(),
            None,
        )
        .await;

        match result {
            Err(InspectionError::UploadTimeout { waited, .. }) => {
                assert_eq!(waited, Duration::from_secs(45))
            }
            other => panic!("expected timeout, got {:?}", other.map(|i| i.name)),
        }
        // checks at 10s, 30s, then clamped to the 45s deadline
        assert_eq!(*provider.status_checks.lock().unwrap(), 3);
        assert_eq!(provider.deleted.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_the_wait() {
        let provider = MockProvider::new().uploads_start_as(FileState::Pending);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = upload_video(
            &provider,
            Path::new("walk.mp4"),
            &PollPolicy::default(),
            &cancel,
            None,
        )
        .await;

        assert!(matches!(result, Err(InspectionError::Cancelled { .. })));
        assert_eq!(*provider.status_checks.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait_deletes_remote() {
        let provider = MockProvider::new()
            .uploads_start_as(FileState::Pending)
            .with_states("walk.mp4", &[FileState::Pending]);
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            canceller.cancel();
        });
        let started = Instant::now();

        let result = upload_video(
            &provider,
            Path::new("walk.mp4"),
            &PollPolicy::default(),
            &cancel,
            None,
        )
        .await;

        assert!(matches!(result, Err(InspectionError::Cancelled { .. })));
        // first check at 10s, cancelled partway through the 20s sleep
        assert_eq!(*provider.status_checks.lock().unwrap(), 1);
        assert!(started.elapsed() >= Duration::from_secs(15));
        assert!(started.elapsed() < Duration::from_secs(30));
        assert_eq!(*provider.deleted.lock().unwrap(), vec!["files/walk.mp4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_check_error_deletes_remote() {
        let provider = MockProvider::new()
            .uploads_start_as(FileState::Pending)
            .failing_status_checks(500);

        let result = upload_video(
            &provider,
            Path::new("walk.mp4"),
            &PollPolicy::default(),
            &CancellationToken::new(),
            None,
        )
        .await;

        assert!(matches!(result, Err(InspectionError::Provider(_))));
        assert_eq!(*provider.status_checks.lock().unwrap(), 1);
        assert_eq!(*provider.deleted.lock().unwrap(), vec!["files/walk.mp4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_interval_backs_off_to_cap() {
        let provider = MockProvider::new()
            .uploads_start_as(FileState::Pending)
            .with_states(
                "walk.mp4",
                &[
                    FileState::Pending,
                    FileState::Pending,
                    FileState::Pending,
                    FileState::Pending,
                    FileState::Ready,
                ],
            );
        let elapsed = Mutex::new(Vec::new());
        let observer = |p: &PollProgress| elapsed.lock().unwrap().push(p.elapsed.as_secs());

        upload_video(
            &provider,
            Path::new("walk.mp4"),
            &policy(10, 40, 600),
            &CancellationToken::new(),
            Some(&observer),
        )
        .await
        .unwrap();

        assert_eq!(*elapsed.lock().unwrap(), vec![10, 30, 70, 110, 150]);
    }

    #[test]
    fn test_policy_from_secs_keeps_cap_above_interval() {
        let p = PollPolicy::from_secs(90, 600);
        assert_eq!(p.interval, Duration::from_secs(90));
        assert_eq!(p.max_interval, Duration::from_secs(90));
    }
}
