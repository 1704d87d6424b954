//! `scheme://bucket/key` URIs.

use std::fmt;

use crate::error::IngestError;
use crate::paths;

/// Storage backends a URI can address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scheme {
    Gcs,
    S3,
    Memory,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Gcs => "gs",
            Scheme::S3 => "s3",
            Scheme::Memory => "memory",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "gs" => Some(Scheme::Gcs),
            "s3" => Some(Scheme::S3),
            "memory" => Some(Scheme::Memory),
            _ => None,
        }
    }
}

/// A parsed object-storage location.
///
/// The key is kept verbatim; a trailing `/` (or an empty key) marks a prefix.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StorageUri {
    scheme: Scheme,
    bucket: String,
    key: String,
}

impl StorageUri {
    /// Parse a URI of the form `scheme://bucket/key...`.
    pub fn parse(uri: &str) -> Result<Self, IngestError> {
        let invalid = |message: &str| IngestError::InvalidUri {
            uri: uri.to_string(),
            message: message.to_string(),
        };

        let (scheme, rest) = uri
            .trim()
            .split_once("://")
            .ok_or_else(|| invalid("expected 'scheme://bucket/key' form"))?;
        let scheme = Scheme::parse(scheme)
            .ok_or_else(|| invalid("unsupported scheme (supported: gs, s3, memory)"))?;

        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(invalid("missing bucket name"));
        }

        Ok(Self::new(scheme, bucket, key))
    }

    pub fn new(scheme: Scheme, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            scheme,
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// True when the URI names a folder-like prefix rather than one object.
    pub fn is_prefix(&self) -> bool {
        self.key.is_empty() || self.key.ends_with('/')
    }

    pub fn is_archive(&self) -> bool {
        paths::is_archive_name(&self.key)
    }

    /// The same location with a trailing `/` on a non-empty key.
    pub fn as_prefix(&self) -> StorageUri {
        if self.is_prefix() {
            return self.clone();
        }
        Self::new(self.scheme, self.bucket.clone(), format!("{}/", self.key))
    }

    /// Append a relative path to this prefix.
    pub fn join(&self, rel: &str) -> StorageUri {
        let prefix = self.as_prefix();
        Self::new(
            self.scheme,
            self.bucket.clone(),
            format!("{}{}", prefix.key, rel.trim_start_matches('/')),
        )
    }

    pub fn with_bucket(&self, bucket: impl Into<String>) -> StorageUri {
        Self::new(self.scheme, bucket, self.key.clone())
    }

    /// Last segment of the key.
    pub fn base_name(&self) -> &str {
        paths::base_name(&self.key)
    }

    /// Lowercased extension of the last key segment.
    pub fn extension(&self) -> Option<String> {
        paths::extension_lower(&self.key)
    }

    /// Location of the key inside its bucket's store.
    ///
    /// The key is taken as the store's raw path, so characters such as `#`
    /// or `%` address the object literally instead of being escaped again.
    pub fn object_path(&self) -> Result<object_store::path::Path, IngestError> {
        object_store::path::Path::parse(self.key.trim_end_matches('/')).map_err(|source| {
            IngestError::InvalidUri {
                uri: self.to_string(),
                message: source.to_string(),
            }
        })
    }
}

impl fmt::Display for StorageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme.as_str(), self.bucket, self.key)
    }
}
