//! Label association for staged images.
//!
//! [`scan`] walks a staging root, and for every image tries the ordered
//! [`candidates::CANDIDATE_RULES`] until an existing, non-empty label file is
//! found. Images without a label file get an empty label list.

pub mod candidates;
pub mod parse;

use std::fs;
use std::io;
use std::path::Path;

pub use candidates::{label_candidates, CandidateRule, CANDIDATE_RULES};
pub use parse::{parse_label_line, parse_label_lines, LineSkip};

use crate::error::IngestError;
use crate::model::{BoundingBox, ImageEntry};
use crate::paths::{collect_files_with_extensions, rel_string, IMAGE_EXTENSIONS};

/// Result of scanning a staging tree.
#[derive(Clone, Debug, Default)]
pub struct ScanOutcome {
    /// One entry per image, sorted by path.
    pub entries: Vec<ImageEntry>,
    /// Matched label files that could not be read.
    pub unreadable_labels: usize,
}

impl ScanOutcome {
    pub fn image_count(&self) -> usize {
        self.entries.len()
    }

    pub fn labeled_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.has_labels()).count()
    }
}

/// Outcome of the candidate search for one image.
#[derive(Debug)]
pub enum LabelMatch {
    Found {
        label_path: String,
        labels: Vec<BoundingBox>,
    },
    Unreadable {
        label_path: String,
        error: io::Error,
    },
    Missing,
}

/// Find every image under `root` and attach its labels.
pub fn scan(root: &Path) -> Result<ScanOutcome, IngestError> {
    let mut image_files = collect_files_with_extensions(root, &IMAGE_EXTENSIONS)?;
    image_files.sort_by_cached_key(|image_path| rel_string(root, image_path));

    let mut outcome = ScanOutcome::default();
    for image_file in image_files {
        let image_path = rel_string(root, &image_file);
        let labels = match resolve_labels(root, &image_path) {
            LabelMatch::Found { labels, .. } => labels,
            LabelMatch::Unreadable { label_path, error } => {
                tracing::warn!(
                    image = %image_path,
                    label = %label_path,
                    error = %error,
                    "label file unreadable; ingesting image without labels"
                );
                outcome.unreadable_labels += 1;
                Vec::new()
            }
            LabelMatch::Missing => Vec::new(),
        };
        outcome.entries.push(ImageEntry::new(image_path, labels));
    }

    tracing::debug!(
        images = outcome.image_count(),
        with_labels = outcome.labeled_count(),
        "scan complete"
    );
    Ok(outcome)
}

/// Try each candidate label path for `image_path` (relative to `root`).
///
/// The first existing non-empty file wins even if none of its lines parse.
pub fn resolve_labels(root: &Path, image_path: &str) -> LabelMatch {
    for candidate in label_candidates(image_path) {
        let path = root.join(&candidate);
        let Ok(metadata) = fs::metadata(&path) else {
            continue;
        };
        if !metadata.is_file() || metadata.len() == 0 {
            continue;
        }

        return match fs::read_to_string(&path) {
            Ok(content) => LabelMatch::Found {
                label_path: candidate,
                labels: parse_label_lines(&content),
            },
            Err(error) => LabelMatch::Unreadable {
                label_path: candidate,
                error,
            },
        };
    }
    LabelMatch::Missing
}
