//! Re-upload of a staging tree to its destination prefix.

use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};

use crate::error::IngestError;
use crate::paths::{
    collect_files_with_extensions, content_type_for, normalize_relative, rel_string,
};
use crate::storage::{ObjectStorage, StorageUri};

/// One local file and the object it is uploaded to.
#[derive(Clone, Debug)]
pub struct PlannedUpload {
    pub local_path: PathBuf,
    pub destination: StorageUri,
    pub content_type: &'static str,
}

/// Upload every allowed file under `local_root` to `destination`.
///
/// Returns the number of uploaded files. Any failed upload fails the whole
/// push; objects that did make it are left in place.
pub async fn push(
    storage: &ObjectStorage,
    local_root: &Path,
    destination: &StorageUri,
    allowed_extensions: &[&str],
    concurrency: usize,
) -> Result<usize, IngestError> {
    let planned = plan_uploads(local_root, destination, allowed_extensions)?;
    upload_planned(storage, &planned, concurrency).await
}

/// Map allowed files under `local_root` to keys under `destination`, sorted by key.
pub fn plan_uploads(
    local_root: &Path,
    destination: &StorageUri,
    allowed_extensions: &[&str],
) -> Result<Vec<PlannedUpload>, IngestError> {
    let mut planned = Vec::new();
    for path in collect_files_with_extensions(local_root, allowed_extensions)? {
        let Some(rel) = normalize_relative(&rel_string(local_root, &path)) else {
            tracing::debug!(path = %path.display(), "skipping file with unsafe relative path");
            continue;
        };
        planned.push(PlannedUpload {
            content_type: content_type_for(&rel),
            destination: destination.join(&rel),
            local_path: path,
        });
    }
    planned.sort_by(|a, b| a.destination.key().cmp(b.destination.key()));
    Ok(planned)
}

/// Upload `planned` with at most `concurrency` transfers in flight.
///
/// Every file is attempted. Failures are reported together as
/// [`IngestError::UploadIncomplete`].
pub async fn upload_planned(
    storage: &ObjectStorage,
    planned: &[PlannedUpload],
    concurrency: usize,
) -> Result<usize, IngestError> {
    let results: Vec<Result<(), IngestError>> = stream::iter(planned)
        .map(|upload| storage.upload(&upload.local_path, &upload.destination, upload.content_type))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut uploaded = 0;
    let mut failed = 0;
    let mut first_error: Option<String> = None;
    for result in results {
        match result {
            Ok(()) => uploaded += 1,
            Err(error) => {
                failed += 1;
                tracing::warn!(error = %error, "upload failed");
                first_error.get_or_insert_with(|| error.to_string());
            }
        }
    }

    if let Some(first_error) = first_error {
        return Err(IngestError::UploadIncomplete {
            uploaded,
            failed,
            first_error,
        });
    }
    Ok(uploaded)
}
