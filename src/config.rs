//! Runtime settings for the ingestion worker.
//!
//! Settings come from an optional YAML file; CLI flags and their environment
//! variables (`GCS_BUCKET`, `EXTRACT_PREFIX_BASE`, `EXTRACT_RUN_ID`,
//! `INGEST_CONCURRENCY`, `INGEST_CHUNK_SIZE`, `INGEST_TIMEOUT_SECS`,
//! `METADATA_DB`) override individual fields.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::destination::{DestinationSettings, DEFAULT_BASE_FOLDER};
use crate::error::IngestError;
use crate::metadata::DEFAULT_CHUNK_SIZE;
use crate::paths::STAGED_EXTENSIONS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestSettings {
    /// Destination bucket; defaults to each request's source bucket.
    #[serde(default)]
    pub destination_bucket: Option<String>,

    /// Folder under which `<dataset>/<run-id>/` is created.
    #[serde(default = "default_base_folder")]
    pub base_folder: String,

    /// Pin the run id instead of generating one per run.
    #[serde(default)]
    pub run_id: Option<String>,

    /// Concurrent object transfers for prefix downloads and re-uploads.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Image records per metadata bulk write.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Abort the whole run after this many seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// SQLite database holding dataset and image records.
    #[serde(default = "default_metadata_db")]
    pub metadata_db: PathBuf,

    /// Extensions re-uploaded from the staging tree.
    #[serde(default = "default_upload_extensions")]
    pub upload_extensions: Vec<String>,
}

fn default_base_folder() -> String {
    DEFAULT_BASE_FOLDER.to_string()
}

fn default_concurrency() -> usize {
    8
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_metadata_db() -> PathBuf {
    PathBuf::from("ingest.sqlite3")
}

fn default_upload_extensions() -> Vec<String> {
    STAGED_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            destination_bucket: None,
            base_folder: default_base_folder(),
            run_id: None,
            concurrency: default_concurrency(),
            chunk_size: default_chunk_size(),
            timeout_secs: None,
            metadata_db: default_metadata_db(),
            upload_extensions: default_upload_extensions(),
        }
    }
}

impl IngestSettings {
    /// Load settings from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, IngestError> {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents).map_err(|source| IngestError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.concurrency == 0 {
            return Err(IngestError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidConfig(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(IngestError::InvalidConfig(
                "timeout_secs must be at least 1 when set".to_string(),
            ));
        }
        if self.upload_extensions.is_empty() {
            return Err(IngestError::InvalidConfig(
                "upload_extensions must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn destination(&self) -> DestinationSettings {
        DestinationSettings {
            bucket: self.destination_bucket.clone(),
            base_folder: self.base_folder.clone(),
            run_id: self.run_id.clone(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Upload extensions without leading dots, lowercased.
    pub fn upload_extensions(&self) -> Vec<String> {
        self.upload_extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect()
    }
}
