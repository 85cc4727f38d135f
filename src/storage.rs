//! Local file utilities: the temporary holding area for user uploads,
//! extension classification, and content types.
//!
//! Used by the ingest pipeline, the HTTP routes, and the CLI so that file
//! naming and type rules live in one place.

use std::path::{Path, PathBuf};

use crate::constants::{SUPPORTED_EXTENSIONS, VIDEO_EXTENSIONS};

/// Lowercased extension without the dot
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

pub fn is_supported_document(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn is_video(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn content_type_for(path: &Path) -> &'static str {
    match extension_of(path).as_deref() {
        Some("txt") => "text/plain",
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

/// File name as a plain string, empty if the path has none
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Strip any directory components and reject names that could escape a directory
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name).trim();
    if base.is_empty() || base == "." || base == ".." || base.contains('\0') {
        return None;
    }
    Some(base.to_string())
}

/// A fresh holding area path for one session's uploads. Nothing is created
/// until the first upload is saved.
pub fn holding_area_path() -> PathBuf {
    std::env::temp_dir().join(format!("home_inspector_{}", rand::random::<u64>()))
}

/// Write an uploaded file into the holding area and return its path
pub async fn save_upload(holding_area: &Path, file_name: &str, data: &[u8]) -> std::io::Result<PathBuf> {
    let name = sanitize_file_name(file_name).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid upload file name {:?}", file_name),
        )
    })?;

    tokio::fs::create_dir_all(holding_area).await?;
    let full_path = holding_area.join(name);
    tokio::fs::write(&full_path, data).await?;
    Ok(full_path)
}

/// Remove the holding area and everything in it
pub async fn remove_holding_area(holding_area: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(holding_area).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %holding_area.display(), error = %e, "Failed to remove holding area");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_classification() {
        assert!(is_supported_document(Path::new("standards/code.PDF")));
        assert!(is_supported_document(Path::new("kitchen.jpeg")));
        assert!(!is_supported_document(Path::new("notes.exe")));
        assert!(!is_supported_document(Path::new("README")));
        assert!(is_video(Path::new("walkthrough.MOV")));
        assert!(!is_video(Path::new("kitchen.jpg")));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("a.pdf")), "application/pdf");
        assert_eq!(content_type_for(Path::new("a.mp4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("a.bin")), "application/octet-stream");
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("kitchen.jpg").as_deref(), Some("kitchen.jpg"));
        assert_eq!(sanitize_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_file_name("C:\\photos\\roof.png").as_deref(), Some("roof.png"));
        assert_eq!(sanitize_file_name(".."), None);
        assert_eq!(sanitize_file_name(""), None);
    }

    #[tokio::test]
    async fn test_holding_area_created_on_first_save_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let holding_area = dir.path().join("holding");

        let path = save_upload(&holding_area, "../roof.png", b"png").await.unwrap();
        assert_eq!(path, holding_area.join("roof.png"));
        assert!(path.exists());

        remove_holding_area(&holding_area).await;
        assert!(!holding_area.exists());

        // already gone
        remove_holding_area(&holding_area).await;
    }

    #[test]
    fn test_holding_area_path_is_not_created() {
        let path = holding_area_path();
        assert!(path.starts_with(std::env::temp_dir()));
        assert!(!path.exists());
        assert_ne!(path, holding_area_path());
    }
}
