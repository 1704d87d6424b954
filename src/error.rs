use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::RunStage;

/// The main error type for ingestion operations.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid ingestion request: {0}")]
    InvalidRequest(String),

    #[error("Failed to parse ingestion request: {0}")]
    RequestParse(#[source] serde_json::Error),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid storage URI '{uri}': {message}")]
    InvalidUri { uri: String, message: String },

    #[error("Source not found at {uri}: {message}")]
    SourceNotFound { uri: String, message: String },

    #[error("Object storage error for {uri}: {source}")]
    Storage {
        uri: String,
        #[source]
        source: object_store::Error,
    },

    #[error("Failed to read archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Failed while traversing {path}: {message}")]
    Walk { path: PathBuf, message: String },

    #[error("Upload incomplete: {uploaded} file(s) uploaded, {failed} failed (first error: {first_error})")]
    UploadIncomplete {
        uploaded: usize,
        failed: usize,
        first_error: String,
    },

    #[error("Metadata store error: {0}")]
    Metadata(#[from] rusqlite::Error),

    #[error("Failed to encode labels for '{image_path}': {source}")]
    LabelsEncode {
        image_path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Metadata write failed for {failed} record(s): {message}")]
    PersistenceFailure { failed: usize, message: String },

    #[error("Dataset '{0}' not found")]
    DatasetNotFound(String),

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Ingestion timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Ingestion of dataset '{dataset}' from [{}] failed during {stage}: {source}", uris.join(", "))]
    RunFailed {
        stage: RunStage,
        dataset: String,
        uris: Vec<String>,
        #[source]
        source: Box<IngestError>,
    },
}

impl IngestError {
    pub(crate) fn storage(uri: impl ToString, source: object_store::Error) -> Self {
        IngestError::Storage {
            uri: uri.to_string(),
            source,
        }
    }

    /// Returns true for failures raised before any I/O took place.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            IngestError::InvalidRequest(_)
                | IngestError::RequestParse(_)
                | IngestError::UnsupportedFormat(_)
                | IngestError::InvalidUri { .. }
        )
    }
}
