//! Run report types.
//!
//! The report is what a finished run hands back: printed as JSON for
//! programmatic callers and as a short summary in the terminal.

use serde::Serialize;
use std::fmt;

use crate::model::DatasetId;
use crate::source::SourceKind;

/// Summary of one successful ingestion run.
#[derive(Clone, Debug, Serialize)]
pub struct IngestReport {
    pub dataset_id: DatasetId,
    pub dataset_name: String,
    /// Sources in request order.
    pub sources: Vec<SourceSummary>,
    /// Images found in the staging tree.
    pub images: usize,
    /// Images with at least one bounding box.
    pub labeled_images: usize,
    /// Matched label files that could not be read.
    pub unreadable_labels: usize,
    /// Files re-uploaded to `destination`.
    pub uploaded_files: usize,
    /// Image records inserted or updated.
    pub records_written: usize,
    /// Destination prefix of this run.
    pub destination: String,
    /// Files replaced by a later file at the same relative path.
    pub collisions: usize,
}

/// One acquired source.
#[derive(Clone, Debug, Serialize)]
pub struct SourceSummary {
    pub uri: String,
    pub kind: SourceKind,
    pub files: usize,
}

impl IngestReport {
    /// Images without any bounding box.
    pub fn unlabeled_images(&self) -> usize {
        self.images.saturating_sub(self.labeled_images)
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Ingested dataset '{}' ({})",
            self.dataset_name, self.dataset_id
        )?;
        for source in &self.sources {
            writeln!(
                f,
                "  source: {} [{}] {} file(s)",
                source.uri,
                source.kind.as_str(),
                source.files
            )?;
        }
        writeln!(
            f,
            "  {} images, {} with labels, {} without",
            self.images,
            self.labeled_images,
            self.unlabeled_images()
        )?;
        if self.unreadable_labels > 0 {
            writeln!(f, "  {} label file(s) unreadable", self.unreadable_labels)?;
        }
        if self.collisions > 0 {
            writeln!(f, "  {} path collision(s), later files kept", self.collisions)?;
        }
        writeln!(
            f,
            "  uploaded {} file(s) to {}",
            self.uploaded_files, self.destination
        )?;
        write!(f, "  wrote {} image record(s)", self.records_written)
    }
}
