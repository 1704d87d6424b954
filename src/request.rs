//! The structured ingestion request, as sent by the dispatcher.

use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::storage::StorageUri;

/// The only supported label format.
pub const YOLO_FORMAT: &str = "yolo";

fn default_format() -> String {
    YOLO_FORMAT.to_string()
}

/// One ingestion job.
///
/// Exactly one of `source_uri` and `source_uris` must be set. The dispatcher's
/// `gcs_uri` / `gcs_uris` field names are accepted as aliases.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestRequest {
    pub dataset_name: String,

    #[serde(default, alias = "gcs_uri", skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,

    #[serde(default, alias = "gcs_uris", skip_serializing_if = "Option::is_none")]
    pub source_uris: Option<Vec<String>>,

    #[serde(default = "default_format")]
    pub format: String,
}

impl IngestRequest {
    /// A request for the given sources; one URI becomes `source_uri`.
    pub fn new(dataset_name: impl Into<String>, mut uris: Vec<String>) -> Self {
        let (source_uri, source_uris) = if uris.len() == 1 {
            (uris.pop(), None)
        } else {
            (None, Some(uris))
        };
        Self {
            dataset_name: dataset_name.into(),
            source_uri,
            source_uris,
            format: default_format(),
        }
    }

    /// Parse the dispatcher's JSON payload.
    pub fn from_json(payload: &str) -> Result<Self, IngestError> {
        serde_json::from_str(payload).map_err(IngestError::RequestParse)
    }

    /// Check the request and parse its URIs. Performs no I/O.
    pub fn validate(&self) -> Result<Vec<StorageUri>, IngestError> {
        if self.dataset_name.trim().is_empty() {
            return Err(IngestError::InvalidRequest(
                "dataset_name must not be empty".to_string(),
            ));
        }

        if self.format != YOLO_FORMAT {
            return Err(IngestError::UnsupportedFormat(format!(
                "'{}' (supported: {YOLO_FORMAT})",
                self.format
            )));
        }

        let raw: Vec<&str> = match (&self.source_uri, &self.source_uris) {
            (Some(_), Some(_)) => {
                return Err(IngestError::InvalidRequest(
                    "provide either source_uri or source_uris, not both".to_string(),
                ))
            }
            (Some(uri), None) => vec![uri.as_str()],
            (None, Some(uris)) if !uris.is_empty() => uris.iter().map(String::as_str).collect(),
            (None, Some(_)) => {
                return Err(IngestError::InvalidRequest(
                    "source_uris must not be empty".to_string(),
                ))
            }
            (None, None) => {
                return Err(IngestError::InvalidRequest(
                    "provide source_uri or source_uris".to_string(),
                ))
            }
        };

        raw.into_iter().map(StorageUri::parse).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatcher_payload_with_aliases() {
        let request =
            IngestRequest::from_json(r#"{"dataset_name": "cats", "gcs_uri": "gs://bucket/cats.zip"}"#)
                .expect("parse");
        assert_eq!(request.format, "yolo");
        let uris = request.validate().expect("valid");
        assert_eq!(uris.len(), 1);
        assert!(uris[0].is_archive());

        let batch = IngestRequest::from_json(
            r#"{"dataset_name": "cats", "gcs_uris": ["gs://b/one/", "gs://b/two.zip"], "format": "yolo"}"#,
        )
        .expect("parse");
        assert_eq!(batch.validate().expect("valid").len(), 2);
    }

    #[test]
    fn rejects_bad_requests_before_io() {
        let both = IngestRequest {
            dataset_name: "d".into(),
            source_uri: Some("gs://b/a.zip".into()),
            source_uris: Some(vec!["gs://b/x/".into()]),
            format: "yolo".into(),
        };
        assert!(matches!(both.validate(), Err(IngestError::InvalidRequest(_))));

        let neither = IngestRequest {
            source_uri: None,
            source_uris: Some(vec![]),
            ..both.clone()
        };
        assert!(matches!(neither.validate(), Err(IngestError::InvalidRequest(_))));

        let coco = IngestRequest {
            format: "coco".into(),
            ..IngestRequest::new("d", vec!["gs://b/a.zip".into()])
        };
        assert!(matches!(coco.validate(), Err(IngestError::UnsupportedFormat(_))));

        let blank = IngestRequest::new("  ", vec!["gs://b/a.zip".into()]);
        assert!(matches!(blank.validate(), Err(IngestError::InvalidRequest(_))));

        let bad_uri = IngestRequest::new("d", vec!["gs://b/ok/".into(), "ftp://x/y".into()]);
        assert!(matches!(bad_uri.validate(), Err(IngestError::InvalidUri { .. })));
    }

    #[test]
    fn malformed_json_is_request_parse_error() {
        let err = IngestRequest::from_json("{not json").unwrap_err();
        assert!(matches!(err, IngestError::RequestParse(_)));
        assert!(err.is_input_error());
    }
}
