//! Reference document loading.
//!
//! Walks the standards and examples directories, keeps files with a supported
//! extension, and uploads each to the provider. A file that fails to upload is
//! logged and recorded in the returned [`BatchReport`]; the rest of the batch
//! carries on.

use futures::StreamExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::constants::EXAMPLE_CATEGORIES;
use crate::error::InspectionError;
use crate::models::BatchReport;
use crate::provider::{ModelProvider, RemoteFile};
use crate::storage::{content_type_for, file_name_of, is_supported_document};

/// A standards or example file the provider has accepted
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceDocument {
    pub name: String,
    pub path: PathBuf,
    pub remote: RemoteFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExampleCategory {
    Example1,
    Example2,
}

impl ExampleCategory {
    pub const ALL: [ExampleCategory; 2] = [ExampleCategory::Example1, ExampleCategory::Example2];

    pub fn from_dir_name(name: &str) -> Option<Self> {
        match name {
            "example1" => Some(ExampleCategory::Example1),
            "example2" => Some(ExampleCategory::Example2),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExampleCategory::Example1 => EXAMPLE_CATEGORIES[0],
            ExampleCategory::Example2 => EXAMPLE_CATEGORIES[1],
        }
    }
}

pub type DocumentMap = BTreeMap<String, ReferenceDocument>;

/// Everything loaded at initialization
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReferenceLibrary {
    pub standards: DocumentMap,
    pub examples: BTreeMap<ExampleCategory, DocumentMap>,
}

impl ReferenceLibrary {
    pub fn standard_files(&self) -> Vec<RemoteFile> {
        self.standards.values().map(|d| d.remote.clone()).collect()
    }

    pub fn example_count(&self, category: ExampleCategory) -> usize {
        self.examples.get(&category).map(|m| m.len()).unwrap_or(0)
    }
}

/// Recursively list files under `dir` with a supported extension, sorted by path.
/// A missing directory yields an empty list.
pub fn collect_supported_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        tracing::warn!(path = %dir.display(), "Reference directory not found, nothing to load");
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_supported_document(path))
        .collect();

    files.sort();
    files
}

async fn upload_one<P: ModelProvider>(
    provider: &P,
    path: PathBuf,
) -> (PathBuf, Result<RemoteFile, InspectionError>) {
    let name = file_name_of(&path);
    let result = provider
        .upload(&path, content_type_for(&path), &name)
        .await
        .map_err(|e| InspectionError::file_load(&path, e));
    (path, result)
}

/// Upload files with bounded parallelism, preserving input order
pub(crate) async fn upload_files<P: ModelProvider>(
    provider: &P,
    files: Vec<PathBuf>,
    concurrency: usize,
) -> Vec<(PathBuf, Result<RemoteFile, InspectionError>)> {
    let uploads: Vec<_> = files
        .into_iter()
        .map(|path| upload_one(provider, path))
        .collect();

    futures::stream::iter(uploads)
        .buffered(concurrency.max(1))
        .collect()
        .await
}

fn record(
    batch: &mut BatchReport,
    kind: &str,
    path: PathBuf,
    result: Result<RemoteFile, InspectionError>,
) -> Option<ReferenceDocument> {
    let name = file_name_of(&path);
    match result {
        Ok(remote) => {
            tracing::info!(kind, name = %name, remote = %remote.name, "Loaded reference document");
            batch.record_success(name.clone());
            Some(ReferenceDocument { name, path, remote })
        }
        Err(e) => {
            tracing::warn!(kind, name = %name, error = %e, "Error loading reference document");
            batch.record_failure(e);
            None
        }
    }
}

/// Load every supported file under `dir` into a flat name -> document map
pub async fn load_standards<P: ModelProvider>(
    provider: &P,
    dir: &Path,
    concurrency: usize,
) -> (DocumentMap, BatchReport) {
    let files = collect_supported_files(dir);
    let mut batch = BatchReport::default();
    let mut standards = DocumentMap::new();

    for (path, result) in upload_files(provider, files, concurrency).await {
        if let Some(doc) = record(&mut batch, "standard", path, result) {
            standards.insert(doc.name.clone(), doc);
        }
    }

    (standards, batch)
}

/// Load example files, grouped by their immediate parent folder.
/// Files outside the recognized example folders are ignored without uploading.
pub async fn load_examples<P: ModelProvider>(
    provider: &P,
    dir: &Path,
    concurrency: usize,
) -> (BTreeMap<ExampleCategory, DocumentMap>, BatchReport) {
    let mut examples: BTreeMap<ExampleCategory, DocumentMap> = ExampleCategory::ALL
        .iter()
        .map(|c| (*c, DocumentMap::new()))
        .collect();

    let files: Vec<PathBuf> = collect_supported_files(dir)
        .into_iter()
        .filter(|path| category_of(path).is_some())
        .collect();

    let mut batch = BatchReport::default();
    for (path, result) in upload_files(provider, files, concurrency).await {
        let Some(category) = category_of(&path) else {
            continue;
        };
        if let Some(doc) = record(&mut batch, category.as_str(), path, result) {
            examples
                .entry(category)
                .or_default()
                .insert(doc.name.clone(), doc);
        }
    }

    (examples, batch)
}

fn category_of(path: &Path) -> Option<ExampleCategory> {
    path.parent()
        .and_then(|p| p.file_name())
        .and_then(|n| ExampleCategory::from_dir_name(&n.to_string_lossy()))
}
