//! Merging several staged sources into one staging tree.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use walkdir::WalkDir;

use super::StagedSource;
use crate::error::IngestError;

/// The unified local tree for one run.
///
/// Dropping it deletes the directory.
#[derive(Debug)]
pub struct StagingTree {
    dir: TempDir,
    /// Number of sources merged into this tree.
    pub sources: usize,
    /// Files replaced by a later file at the same relative path, across
    /// archive extraction and merging.
    pub collisions: usize,
}

impl StagingTree {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

impl From<StagedSource> for StagingTree {
    fn from(source: StagedSource) -> Self {
        let collisions = source.collisions;
        StagingTree {
            dir: source.into_dir(),
            sources: 1,
            collisions,
        }
    }
}

/// Counters from moving one tree into another.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub moved: usize,
    pub overwritten: usize,
}

/// Merge staged sources; the first becomes the unified root.
///
/// Later sources win on path collisions.
pub fn merge(sources: Vec<StagedSource>) -> Result<StagingTree, IngestError> {
    let mut sources = sources.into_iter();
    let Some(first) = sources.next() else {
        return Err(IngestError::InvalidRequest(
            "no staged sources to merge".to_string(),
        ));
    };

    let mut tree = StagingTree::from(first);
    for source in sources {
        let stats = merge_into(tree.root(), source.root())?;
        if stats.overwritten > 0 {
            tracing::warn!(
                source = %source.uri,
                overwritten = stats.overwritten,
                "merged source replaced files from an earlier source"
            );
        }
        tree.collisions += source.collisions + stats.overwritten;
        tree.sources += 1;
    }

    Ok(tree)
}

/// Move every file under `other` to the same relative path under `unified`.
pub fn merge_into(unified: &Path, other: &Path) -> Result<MergeStats, IngestError> {
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(other) {
        let entry = entry.map_err(|source| IngestError::Walk {
            path: other.to_path_buf(),
            message: source.to_string(),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    let mut stats = MergeStats::default();
    for src in files {
        let rel = src.strip_prefix(other).unwrap_or(&src);
        let dst = unified.join(rel);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        if dst.is_file() {
            stats.overwritten += 1;
        }
        move_file(&src, &dst)?;
        stats.moved += 1;
    }

    Ok(stats)
}

fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            // Cross-device moves cannot rename.
            fs::copy(src, dst)?;
            fs::remove_file(src)
        }
    }
}
