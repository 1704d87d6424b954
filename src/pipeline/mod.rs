//! The ingestion orchestrator.
//!
//! A run walks through
//! `Acquiring -> Merging (more than one source) -> Staged -> Planning ->
//! Uploading -> Persisting -> Done`. Each stage finishes before the next one
//! starts and there is no automatic retry. Any failure after request
//! validation ends the run in `Failed` and is returned as
//! [`IngestError::RunFailed`] carrying the stage it happened in. Staging
//! directories are dropped on every exit path.

pub mod report;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

pub use report::{IngestReport, SourceSummary};

use crate::config::IngestSettings;
use crate::destination;
use crate::error::IngestError;
use crate::labels;
use crate::metadata::{self, MetadataStore};
use crate::request::IngestRequest;
use crate::source::{self, ResolveOptions, StagingTree};
use crate::storage::{ObjectStorage, StorageUri};
use crate::upload;

/// Where a run currently is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    #[default]
    Acquiring,
    Merging,
    Staged,
    Planning,
    Uploading,
    Persisting,
    Done,
    Failed,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStage::Acquiring => "acquiring",
            RunStage::Merging => "merging",
            RunStage::Staged => "staged",
            RunStage::Planning => "planning",
            RunStage::Uploading => "uploading",
            RunStage::Persisting => "persisting",
            RunStage::Done => "done",
            RunStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStage::Done | RunStage::Failed)
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared view of the current stage, readable after the run future is gone.
#[derive(Debug, Default)]
struct StageTracker(Mutex<RunStage>);

impl StageTracker {
    fn enter(&self, stage: RunStage) {
        let mut current = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = *current;
        tracing::debug!(from = %previous, to = %stage, "stage transition");
        *current = stage;
    }

    fn current(&self) -> RunStage {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs ingestion requests against injected storage and metadata clients.
pub struct Ingestor {
    storage: Arc<ObjectStorage>,
    store: Arc<dyn MetadataStore>,
    settings: IngestSettings,
}

impl Ingestor {
    pub fn new(
        storage: Arc<ObjectStorage>,
        store: Arc<dyn MetadataStore>,
        settings: IngestSettings,
    ) -> Result<Self, IngestError> {
        settings.validate()?;
        Ok(Self {
            storage,
            store,
            settings,
        })
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Run one request to completion.
    ///
    /// Invalid requests fail before any I/O with the unwrapped input error.
    /// The configured timeout, if any, applies to the whole run.
    pub async fn ingest(&self, request: &IngestRequest) -> Result<IngestReport, IngestError> {
        if let Some(limit) = self.settings.timeout() {
            return self.run_with_timeout(request, limit).await;
        }

        let uris = request.validate()?;
        let tracker = StageTracker::default();
        self.run(request, &uris, &tracker).await
    }

    /// Like [`Ingestor::ingest`] with an explicit time limit.
    ///
    /// On expiry the run is abandoned, its staging directories are dropped and
    /// [`IngestError::Timeout`] is returned wrapped in `RunFailed`.
    ///
    /// Work already handed to a blocking thread is not cancelled. A timeout
    /// during `Persisting` can therefore return while the store is still
    /// writing, and chunks it commits afterwards remain committed.
    pub async fn run_with_timeout(
        &self,
        request: &IngestRequest,
        limit: Duration,
    ) -> Result<IngestReport, IngestError> {
        let uris = request.validate()?;
        let tracker = StageTracker::default();

        match tokio::time::timeout(limit, self.run(request, &uris, &tracker)).await {
            Ok(result) => result,
            Err(_) => {
                let timeout = IngestError::Timeout {
                    seconds: limit.as_secs(),
                };
                Err(self.fail(request, &uris, &tracker, timeout))
            }
        }
    }

    async fn run(
        &self,
        request: &IngestRequest,
        uris: &[StorageUri],
        tracker: &StageTracker,
    ) -> Result<IngestReport, IngestError> {
        match self.execute(request, uris, tracker).await {
            Ok(report) => Ok(report),
            Err(source) => Err(self.fail(request, uris, tracker, source)),
        }
    }

    fn fail(
        &self,
        request: &IngestRequest,
        uris: &[StorageUri],
        tracker: &StageTracker,
        source: IngestError,
    ) -> IngestError {
        let stage = tracker.current();
        tracker.enter(RunStage::Failed);
        tracing::error!(
            dataset = %request.dataset_name,
            stage = %stage,
            error = %source,
            "ingestion.failed"
        );
        IngestError::RunFailed {
            stage,
            dataset: request.dataset_name.clone(),
            uris: uris.iter().map(ToString::to_string).collect(),
            source: Box::new(source),
        }
    }

    async fn execute(
        &self,
        request: &IngestRequest,
        uris: &[StorageUri],
        tracker: &StageTracker,
    ) -> Result<IngestReport, IngestError> {
        let dataset_name = request.dataset_name.clone();
        let Some(representative) = uris.first() else {
            return Err(IngestError::InvalidRequest("no source URIs".to_string()));
        };

        tracker.enter(RunStage::Acquiring);
        tracing::info!(
            dataset = %dataset_name,
            uri = %representative,
            sources = uris.len(),
            format = %request.format,
            "ingestion.start"
        );

        let options = ResolveOptions {
            concurrency: self.settings.concurrency,
        };
        let mut staged = Vec::with_capacity(uris.len());
        for uri in uris {
            staged.push(source::resolve(&self.storage, uri, &options).await?);
        }
        let sources: Vec<SourceSummary> = staged
            .iter()
            .map(|source| SourceSummary {
                uri: source.uri.to_string(),
                kind: source.kind,
                files: source.files,
            })
            .collect();

        let tree = if staged.len() > 1 {
            tracker.enter(RunStage::Merging);
            blocking(move || source::merge(staged)).await?
        } else {
            staged
                .pop()
                .map(StagingTree::from)
                .ok_or_else(|| IngestError::InvalidRequest("no sources staged".to_string()))?
        };

        tracker.enter(RunStage::Staged);
        let root = tree.root().to_path_buf();
        let scan = blocking(move || labels::scan(&root)).await?;
        tracing::info!(
            dataset = %dataset_name,
            images = scan.image_count(),
            with_labels = scan.labeled_count(),
            unreadable_labels = scan.unreadable_labels,
            "ingestion.parsed"
        );

        tracker.enter(RunStage::Planning);
        let dst_prefix = destination::plan(
            representative,
            &dataset_name,
            &self.settings.destination(),
        );

        tracker.enter(RunStage::Uploading);
        tracing::info!(dst_prefix = %dst_prefix, "extract.upload.start");
        let extensions = self.settings.upload_extensions();
        let allowed: Vec<&str> = extensions.iter().map(String::as_str).collect();
        let uploaded = upload::push(
            &self.storage,
            tree.root(),
            &dst_prefix,
            &allowed,
            self.settings.concurrency,
        )
        .await?;
        tracing::info!(files = uploaded, dst_prefix = %dst_prefix, "extract.upload.done");
        let collisions = tree.collisions;
        drop(tree);

        tracker.enter(RunStage::Persisting);
        let images = scan.image_count();
        let labeled_images = scan.labeled_count();
        let unreadable_labels = scan.unreadable_labels;
        let store = Arc::clone(&self.store);
        let chunk_size = self.settings.chunk_size;
        let name = dataset_name.clone();
        let location = dst_prefix.clone();
        let (dataset_id, records_written) = blocking(move || {
            let dataset_id = metadata::upsert_dataset(store.as_ref(), &name, &location)?;
            let written =
                metadata::upsert_images(store.as_ref(), &dataset_id, &scan.entries, chunk_size)?;
            Ok((dataset_id, written))
        })
        .await?;

        tracker.enter(RunStage::Done);
        tracing::info!(
            dataset_id = %dataset_id,
            images = records_written,
            source_prefix = %dst_prefix,
            "ingestion.done"
        );

        Ok(IngestReport {
            dataset_id,
            dataset_name,
            sources,
            images,
            labeled_images,
            unreadable_labels,
            uploaded_files: uploaded,
            records_written,
            destination: dst_prefix.to_string(),
            collisions,
        })
    }
}

/// Run blocking filesystem or database work off the async workers.
async fn blocking<T, F>(work: F) -> Result<T, IngestError>
where
    F: FnOnce() -> Result<T, IngestError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|source| IngestError::Task(source.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_are_lowercase() {
        assert_eq!(RunStage::Acquiring.to_string(), "acquiring");
        assert_eq!(RunStage::Persisting.to_string(), "persisting");
        assert!(RunStage::Done.is_terminal());
        assert!(!RunStage::Uploading.is_terminal());
    }

    #[test]
    fn tracker_remembers_last_stage() {
        let tracker = StageTracker::default();
        assert_eq!(tracker.current(), RunStage::Acquiring);
        tracker.enter(RunStage::Uploading);
        assert_eq!(tracker.current(), RunStage::Uploading);
    }
}
