//! Dataset and image records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::bbox::BoundingBox;
use super::ids::DatasetId;

/// Where a dataset's canonical content lives.
///
/// A dataset carries exactly one locator; switching variants clears the other.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetLocation {
    /// A single archive object (`source_zip`).
    Archive(String),
    /// A key prefix ending in `/` (`source_prefix`).
    Prefix(String),
}

impl DatasetLocation {
    pub fn uri(&self) -> &str {
        match self {
            DatasetLocation::Archive(uri) | DatasetLocation::Prefix(uri) => uri,
        }
    }

    pub fn archive(&self) -> Option<&str> {
        match self {
            DatasetLocation::Archive(uri) => Some(uri),
            DatasetLocation::Prefix(_) => None,
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        match self {
            DatasetLocation::Prefix(uri) => Some(uri),
            DatasetLocation::Archive(_) => None,
        }
    }
}

/// A persisted dataset.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: DatasetId,

    /// Unique, case-sensitive match key.
    pub name: String,

    /// `None` only for rows written without a source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<DatasetLocation>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted image, unique per `(dataset_id, image_path)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageRecord {
    pub dataset_id: DatasetId,
    pub image_path: String,
    pub labels: Vec<BoundingBox>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One scanned image and the labels associated with it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageEntry {
    /// Path relative to the staging root, forward slashes, no leading slash.
    pub image_path: String,
    pub labels: Vec<BoundingBox>,
}

impl ImageEntry {
    pub fn new(image_path: impl Into<String>, labels: Vec<BoundingBox>) -> Self {
        Self {
            image_path: image_path.into(),
            labels,
        }
    }

    pub fn has_labels(&self) -> bool {
        !self.labels.is_empty()
    }
}
