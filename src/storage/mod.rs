//! Object storage access.
//!
//! [`ObjectStorage`] is an explicitly constructed handle that owns one
//! `object_store` client per bucket. The pipeline only needs four operations
//! from it: `exists`, `download`, `upload` and `list`.

mod uri;

pub use uri::{Scheme, StorageUri};

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::memory::InMemory;
use object_store::{
    Attribute, Attributes, BackoffConfig, ClientOptions, ObjectStore, PutOptions, PutPayload,
    RetryConfig,
};
use tokio::io::AsyncWriteExt;

use crate::error::IngestError;

/// One listed object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectEntry {
    pub uri: StorageUri,
    pub size: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Backend {
    Cloud,
    Memory,
}

/// Per-bucket object store clients, created lazily.
pub struct ObjectStorage {
    backend: Backend,
    stores: Mutex<HashMap<(Scheme, String), Arc<dyn ObjectStore>>>,
}

impl ObjectStorage {
    /// Cloud-backed storage. Credentials come from the environment of each
    /// provider (`GOOGLE_APPLICATION_CREDENTIALS`, `AWS_*`, ...).
    pub fn from_env() -> Self {
        Self {
            backend: Backend::Cloud,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Storage where every bucket is an in-process `InMemory` store.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// The client serving `uri`'s bucket.
    pub fn store_for(&self, uri: &StorageUri) -> Result<Arc<dyn ObjectStore>, IngestError> {
        let key = (uri.scheme(), uri.bucket().to_string());
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = stores.get(&key) {
            return Ok(Arc::clone(store));
        }

        let store = self.build_store(uri)?;
        stores.insert(key, Arc::clone(&store));
        Ok(store)
    }

    fn build_store(&self, uri: &StorageUri) -> Result<Arc<dyn ObjectStore>, IngestError> {
        let bucket = uri.bucket();
        match (self.backend, uri.scheme()) {
            (Backend::Memory, _) | (_, Scheme::Memory) => Ok(Arc::new(InMemory::new())),
            (Backend::Cloud, Scheme::Gcs) => {
                tracing::info!(bucket, "creating GCS client");
                let store = GoogleCloudStorageBuilder::from_env()
                    .with_bucket_name(bucket)
                    .with_client_options(client_options())
                    .with_retry(retry_config())
                    .build()
                    .map_err(|source| IngestError::storage(uri, source))?;
                Ok(Arc::new(store))
            }
            (Backend::Cloud, Scheme::S3) => {
                tracing::info!(bucket, "creating S3 client");
                let store = AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .with_client_options(client_options())
                    .with_retry(retry_config())
                    .build()
                    .map_err(|source| IngestError::storage(uri, source))?;
                Ok(Arc::new(store))
            }
        }
    }

    /// Whether a single object exists at `uri`.
    pub async fn exists(&self, uri: &StorageUri) -> Result<bool, IngestError> {
        let store = self.store_for(uri)?;
        match store.head(&uri.object_path()?).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(source) => Err(IngestError::storage(uri, source)),
        }
    }

    /// Stream the object at `uri` into `local_path`, creating parent dirs.
    ///
    /// Returns the number of bytes written. A missing object is reported as
    /// [`IngestError::SourceNotFound`].
    pub async fn download(&self, uri: &StorageUri, local_path: &Path) -> Result<u64, IngestError> {
        let store = self.store_for(uri)?;
        let location = uri.object_path()?;
        let result = store
            .get(&location)
            .await
            .map_err(|source| match source {
                object_store::Error::NotFound { .. } => IngestError::SourceNotFound {
                    uri: uri.to_string(),
                    message: "object does not exist".to_string(),
                },
                other => IngestError::storage(uri, other),
            })?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(local_path).await?;
        let mut stream = result.into_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| IngestError::storage(uri, source))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!(uri = %uri, bytes = written, "downloaded object");
        Ok(written)
    }

    /// Upload a local file to `uri` with the given content type.
    pub async fn upload(
        &self,
        local_path: &Path,
        uri: &StorageUri,
        content_type: &str,
    ) -> Result<(), IngestError> {
        let bytes = tokio::fs::read(local_path).await?;
        self.put_bytes(uri, bytes, Some(content_type)).await
    }

    /// Write an in-memory payload to `uri`.
    pub async fn put_bytes(
        &self,
        uri: &StorageUri,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), IngestError> {
        let store = self.store_for(uri)?;
        let mut attributes = Attributes::new();
        if let Some(content_type) = content_type {
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
        }
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        let location = uri.object_path()?;
        store
            .put_opts(&location, PutPayload::from(bytes), opts)
            .await
            .map_err(|source| IngestError::storage(uri, source))?;
        Ok(())
    }

    /// Every object under `prefix`, in the order the store enumerates them.
    pub async fn list(&self, prefix: &StorageUri) -> Result<Vec<ObjectEntry>, IngestError> {
        let store = self.store_for(prefix)?;
        let location = if prefix.key().trim_end_matches('/').is_empty() {
            None
        } else {
            Some(prefix.object_path()?)
        };

        let metas: Vec<_> = store
            .list(location.as_ref())
            .try_collect()
            .await
            .map_err(|source| IngestError::storage(prefix, source))?;

        Ok(metas
            .into_iter()
            .map(|meta| ObjectEntry {
                uri: StorageUri::new(
                    prefix.scheme(),
                    prefix.bucket(),
                    String::from(meta.location),
                ),
                size: meta.size as u64,
            })
            .collect())
    }
}

fn client_options() -> ClientOptions {
    ClientOptions::new()
        .with_connect_timeout(Duration::from_secs(5))
        .with_timeout(Duration::from_secs(120))
        .with_pool_idle_timeout(Duration::from_secs(90))
}

/// Retry on 429 and 5xx with exponential backoff.
fn retry_config() -> RetryConfig {
    RetryConfig {
        max_retries: 5,
        backoff: BackoffConfig {
            init_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            base: 2.0,
        },
        retry_timeout: Duration::from_secs(180),
    }
}
