//! Application constants

/// Extensions accepted as reference documents and still images (lowercase, no dot)
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "pdf", "doc", "docx", "jpg", "jpeg", "png"];

/// Extensions routed to the whole-video upload path
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi"];

/// The only subfolders of the examples tree that are loaded
pub const EXAMPLE_CATEGORIES: &[&str] = &["example1", "example2"];

/// Default model used for the cached context and report generation
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash-002";

/// Display name of the provider-side cached context
pub const CACHE_DISPLAY_NAME: &str = "home_inspection_cache";

/// Cached context lifetime (60 minutes)
pub const DEFAULT_CACHE_TTL_MINUTES: i64 = 60;

/// Seconds between sampled video frames
pub const DEFAULT_FRAME_INTERVAL_SECS: u64 = 5;

/// Initial delay between video processing status checks
pub const DEFAULT_VIDEO_POLL_INTERVAL_SECS: u64 = 10;

/// Upper bound on the delay between status checks once backoff kicks in
pub const MAX_VIDEO_POLL_INTERVAL_SECS: u64 = 60;

/// Give up waiting on video processing after this long (10 minutes)
pub const DEFAULT_VIDEO_UPLOAD_TIMEOUT_SECS: u64 = 10 * 60;

/// Uploads in flight at once when ingesting a batch
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 4;

/// Default directory for extracted frames
pub const DEFAULT_FRAMES_DIR: &str = "extracted_frames";

/// Default location of the persisted report
pub const DEFAULT_REPORT_PATH: &str = "inspection_report.json";

/// File name offered when the report is downloaded
pub const DOWNLOAD_FILE_NAME: &str = "home_inspection_report.json";

/// Maximum multipart upload size (500 MB, walkthrough videos are large)
pub const MAX_MEDIA_UPLOAD_SIZE: usize = 500 * 1024 * 1024;

/// Generation settings for the report request
pub const REPORT_TEMPERATURE: f32 = 0.1;
pub const REPORT_MAX_OUTPUT_TOKENS: u32 = 8192;
pub const REPORT_RESPONSE_MIME_TYPE: &str = "application/json";

/// Default location of the reference standards tree
pub const DEFAULT_STANDARDS_DIR: &str = "building_standards";

/// Default location of the example reports tree
pub const DEFAULT_EXAMPLES_DIR: &str = "examples";

pub const DEFAULT_PORT: u16 = 3000;
