//! Source acquisition.
//!
//! A storage URI is turned into a fresh local staging directory:
//!
//! - `*.zip` URIs are downloaded to a temporary file and extracted;
//! - a non-prefix URI naming an existing object lands in `images/<name>`;
//! - anything else is treated as a prefix. Images and label files are
//!   downloaded with their relative layout, then every archive found under the
//!   prefix is extracted into the same directory, in enumeration order.
//!
//! Archives are processed after loose files, so an archive entry replaces a
//! loose file at the same relative path.

pub mod archive;
pub mod merge;

use std::collections::HashMap;
use std::path::Path;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tempfile::TempDir;

pub use archive::{extract_zip, ExtractStats};
pub use merge::{merge, merge_into, MergeStats, StagingTree};

use crate::error::IngestError;
use crate::paths::{classify, normalize_relative, FileClass};
use crate::storage::{ObjectStorage, StorageUri};

/// How a source URI was interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Archive,
    Object,
    Prefix,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Archive => "archive",
            SourceKind::Object => "object",
            SourceKind::Prefix => "prefix",
        }
    }
}

/// Knobs for acquisition.
#[derive(Clone, Copy, Debug)]
pub struct ResolveOptions {
    /// Maximum concurrent object downloads for prefix sources.
    pub concurrency: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { concurrency: 8 }
    }
}

/// One source materialized on local disk.
#[derive(Debug)]
pub struct StagedSource {
    pub uri: StorageUri,
    pub kind: SourceKind,
    dir: TempDir,
    /// Files written into the staging directory.
    pub files: usize,
    /// Files replaced by a later write to the same relative path.
    pub collisions: usize,
}

impl StagedSource {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub(crate) fn into_dir(self) -> TempDir {
        self.dir
    }
}

/// Materialize `uri` into a new staging directory.
pub async fn resolve(
    storage: &ObjectStorage,
    uri: &StorageUri,
    options: &ResolveOptions,
) -> Result<StagedSource, IngestError> {
    if uri.is_archive() {
        return resolve_archive(storage, uri).await;
    }

    if !uri.is_prefix() {
        // Advisory only: a miss or a failed check falls back to prefix handling.
        match storage.exists(uri).await {
            Ok(true) => return resolve_object(storage, uri).await,
            Ok(false) => tracing::debug!(uri = %uri, "no single object; treating as prefix"),
            Err(error) => {
                tracing::warn!(uri = %uri, error = %error, "existence check failed; treating as prefix")
            }
        }
    }

    resolve_prefix(storage, uri, options).await
}

fn staging_dir(prefix: &str) -> Result<TempDir, IngestError> {
    Ok(tempfile::Builder::new().prefix(prefix).tempdir()?)
}

async fn resolve_archive(
    storage: &ObjectStorage,
    uri: &StorageUri,
) -> Result<StagedSource, IngestError> {
    let dir = staging_dir("yolozip_")?;
    let stats = fetch_and_extract(storage, uri, dir.path()).await?;
    if stats.files == 0 {
        return Err(IngestError::SourceNotFound {
            uri: uri.to_string(),
            message: "archive contains no files".to_string(),
        });
    }

    tracing::info!(uri = %uri, files = stats.files, "archive extracted");
    Ok(StagedSource {
        uri: uri.clone(),
        kind: SourceKind::Archive,
        dir,
        files: stats.files,
        collisions: stats.overwritten,
    })
}

async fn resolve_object(
    storage: &ObjectStorage,
    uri: &StorageUri,
) -> Result<StagedSource, IngestError> {
    let Some(name) = normalize_relative(uri.base_name()) else {
        return Err(IngestError::InvalidUri {
            uri: uri.to_string(),
            message: "object name is not a usable file name".to_string(),
        });
    };

    let dir = staging_dir("yolosingle_")?;
    storage
        .download(uri, &dir.path().join("images").join(name))
        .await?;

    tracing::info!(uri = %uri, "single object downloaded");
    Ok(StagedSource {
        uri: uri.clone(),
        kind: SourceKind::Object,
        dir,
        files: 1,
        collisions: 0,
    })
}

async fn resolve_prefix(
    storage: &ObjectStorage,
    uri: &StorageUri,
    options: &ResolveOptions,
) -> Result<StagedSource, IngestError> {
    let prefix = uri.as_prefix();
    let listed = storage.list(&prefix).await?;

    let mut archives: Vec<StorageUri> = Vec::new();
    let mut loose: Vec<Option<(StorageUri, String)>> = Vec::new();
    let mut slot_by_rel: HashMap<String, usize> = HashMap::new();
    let mut collisions = 0;

    for entry in listed {
        let key = entry.uri.key();
        if key.ends_with('/') {
            continue;
        }
        let Some(rel) = key.strip_prefix(prefix.key()).and_then(normalize_relative) else {
            tracing::debug!(key, "skipping object outside prefix or with unsafe path");
            continue;
        };

        match classify(&rel) {
            FileClass::Archive => archives.push(entry.uri),
            FileClass::ImageOrLabel => {
                // Two keys normalizing to one path: the later one wins.
                if let Some(previous) = slot_by_rel.insert(rel.clone(), loose.len()) {
                    loose[previous] = None;
                    collisions += 1;
                }
                loose.push(Some((entry.uri, rel)));
            }
            FileClass::Ignored => {}
        }
    }

    let loose: Vec<(StorageUri, String)> = loose.into_iter().flatten().collect();
    if loose.is_empty() && archives.is_empty() {
        return Err(IngestError::SourceNotFound {
            uri: uri.to_string(),
            message: "no images, labels or archives under prefix".to_string(),
        });
    }

    let dir = staging_dir("yolofolder_")?;
    let downloaded = download_all(storage, &loose, dir.path(), options.concurrency).await?;

    let mut extracted = 0;
    for archive_uri in &archives {
        let stats = fetch_and_extract(storage, archive_uri, dir.path()).await?;
        extracted += stats.files;
        collisions += stats.overwritten;
    }

    let files = downloaded + extracted;
    if files == 0 {
        return Err(IngestError::SourceNotFound {
            uri: uri.to_string(),
            message: "archives under prefix contain no files".to_string(),
        });
    }

    tracing::info!(
        uri = %prefix,
        downloaded,
        archives = archives.len(),
        extracted,
        collisions,
        "prefix staged"
    );
    Ok(StagedSource {
        uri: uri.clone(),
        kind: SourceKind::Prefix,
        dir,
        files,
        collisions,
    })
}

/// Download objects to disjoint local paths with bounded concurrency.
async fn download_all(
    storage: &ObjectStorage,
    objects: &[(StorageUri, String)],
    root: &Path,
    concurrency: usize,
) -> Result<usize, IngestError> {
    let results: Vec<Result<u64, IngestError>> = stream::iter(objects)
        .map(|(uri, rel)| {
            let local = root.join(rel);
            async move { storage.download(uri, &local).await }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut downloaded = 0;
    for result in results {
        result?;
        downloaded += 1;
    }
    Ok(downloaded)
}

/// Download an archive to a temporary file and extract it under `dest`.
///
/// The temporary copy is removed when this returns, on success or failure.
async fn fetch_and_extract(
    storage: &ObjectStorage,
    uri: &StorageUri,
    dest: &Path,
) -> Result<ExtractStats, IngestError> {
    let archive_copy = tempfile::Builder::new()
        .prefix("yoloarchive_")
        .suffix(".zip")
        .tempfile()?
        .into_temp_path();
    storage.download(uri, &archive_copy).await?;

    let archive_path = archive_copy.to_path_buf();
    let dest = dest.to_path_buf();
    let stats = tokio::task::spawn_blocking(move || extract_zip(&archive_path, &dest))
        .await
        .map_err(|source| IngestError::Task(source.to_string()))??;

    tracing::debug!(uri = %uri, files = stats.files, overwritten = stats.overwritten, "archive extracted");
    Ok(stats)
}
