//! Dataset and image metadata persistence.
//!
//! [`MetadataStore`] is the store-side seam; [`upsert_dataset`] and
//! [`upsert_images`] carry the write rules on top of it: location
//! classification, in-batch de-duplication, chunking and error aggregation.
//! [`sqlite::SqliteStore`] is the bundled implementation.

pub mod sqlite;

use std::collections::HashSet;

use chrono::{DateTime, Utc};

pub use sqlite::SqliteStore;

use crate::error::IngestError;
use crate::model::{DatasetId, DatasetLocation, DatasetRecord, ImageEntry, ImageRecord};
use crate::storage::StorageUri;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// One row of a bulk write that did not persist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteError {
    pub image_path: String,
    pub message: String,
}

/// Result of one unordered bulk write.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BulkWriteOutcome {
    pub inserted: usize,
    pub modified: usize,
    pub errors: Vec<WriteError>,
}

/// Store operations the pipeline relies on.
///
/// Image rows are unique per `(dataset_id, image_path)` and dataset rows per
/// name; implementations must enforce both.
pub trait MetadataStore: Send + Sync {
    /// Create the unique and secondary indexes if they are missing.
    fn ensure_indexes(&self) -> Result<(), IngestError>;

    /// Insert or update the dataset named `name` and return its id.
    ///
    /// Updates only touch the location and `updated_at`.
    fn upsert_dataset(
        &self,
        name: &str,
        location: &DatasetLocation,
        now: DateTime<Utc>,
    ) -> Result<DatasetId, IngestError>;

    /// Upsert every entry of `chunk`. A failing row does not stop the others.
    fn bulk_upsert_images(
        &self,
        dataset_id: &DatasetId,
        chunk: &[ImageEntry],
        now: DateTime<Utc>,
    ) -> Result<BulkWriteOutcome, IngestError>;

    fn find_dataset(&self, name: &str) -> Result<Option<DatasetRecord>, IngestError>;

    fn list_datasets(&self) -> Result<Vec<DatasetRecord>, IngestError>;

    /// Images of one dataset ordered by path.
    fn list_images(
        &self,
        dataset_id: &DatasetId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ImageRecord>, IngestError>;

    fn count_images(&self, dataset_id: &DatasetId) -> Result<usize, IngestError>;
}

/// `*.zip` URIs are archive locators; anything else is a prefix locator.
pub fn classify_location(uri: &StorageUri) -> DatasetLocation {
    if uri.is_archive() {
        DatasetLocation::Archive(uri.to_string())
    } else {
        DatasetLocation::Prefix(uri.as_prefix().to_string())
    }
}

/// Create or update the dataset `name`, recording `source_uri` as its location.
pub fn upsert_dataset(
    store: &dyn MetadataStore,
    name: &str,
    source_uri: &StorageUri,
) -> Result<DatasetId, IngestError> {
    let location = classify_location(source_uri);
    let dataset_id = store.upsert_dataset(name, &location, Utc::now())?;
    tracing::debug!(dataset = name, dataset_id = %dataset_id, location = location.uri(), "dataset upserted");
    Ok(dataset_id)
}

/// Upsert image records for `dataset_id` in chunks.
///
/// Entries are de-duplicated by path, first occurrence wins, and empty paths
/// are dropped. Every chunk is attempted; row or chunk failures are reported
/// together as [`IngestError::PersistenceFailure`] once all chunks ran.
///
/// Returns `max(inserted + modified, unique paths)`.
pub fn upsert_images(
    store: &dyn MetadataStore,
    dataset_id: &DatasetId,
    entries: &[ImageEntry],
    chunk_size: usize,
) -> Result<usize, IngestError> {
    store.ensure_indexes()?;

    let unique = dedupe_first_wins(entries);
    if unique.is_empty() {
        return Ok(0);
    }

    let now = Utc::now();
    let mut processed = 0;
    let mut failed = 0;
    let mut first_error: Option<String> = None;

    for (index, chunk) in unique.chunks(chunk_size.max(1)).enumerate() {
        match store.bulk_upsert_images(dataset_id, chunk, now) {
            Ok(outcome) => {
                processed += outcome.inserted + outcome.modified;
                if let Some(error) = outcome.errors.first() {
                    first_error.get_or_insert_with(|| {
                        format!("{}: {}", error.image_path, error.message)
                    });
                }
                failed += outcome.errors.len();
            }
            Err(error) => {
                tracing::warn!(chunk = index, rows = chunk.len(), error = %error, "chunk write failed");
                first_error.get_or_insert_with(|| error.to_string());
                failed += chunk.len();
            }
        }
    }

    if let Some(message) = first_error {
        return Err(IngestError::PersistenceFailure { failed, message });
    }
    Ok(processed.max(unique.len()))
}

fn dedupe_first_wins(entries: &[ImageEntry]) -> Vec<ImageEntry> {
    let mut seen: HashSet<&str> = HashSet::new();
    entries
        .iter()
        .filter(|entry| !entry.image_path.is_empty() && seen.insert(entry.image_path.as_str()))
        .cloned()
        .collect()
}
