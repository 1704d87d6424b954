//! File classification and relative-path helpers shared by the pipeline stages.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::IngestError;

/// Image extensions recognised by the scanner and the uploader.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];
pub const LABEL_EXTENSION: &str = "txt";
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Extensions re-uploaded by default: every image plus label files.
pub const STAGED_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "webp", "txt"];

/// How an object or file name is treated during acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileClass {
    Archive,
    ImageOrLabel,
    Ignored,
}

pub fn classify(name: &str) -> FileClass {
    match extension_lower(name).as_deref() {
        Some(ARCHIVE_EXTENSION) => FileClass::Archive,
        Some(ext) if STAGED_EXTENSIONS.contains(&ext) => FileClass::ImageOrLabel,
        _ => FileClass::Ignored,
    }
}

/// Lowercased extension of the last segment of a `/`-separated name.
///
/// Leading-dot names such as `.hidden` have no extension.
pub fn extension_lower(name: &str) -> Option<String> {
    let base = base_name(name);
    match base.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(base[idx + 1..].to_ascii_lowercase()),
    }
}

pub fn has_extension(name: &str, allowed: &[&str]) -> bool {
    let Some(ext) = extension_lower(name) else {
        return false;
    };
    allowed
        .iter()
        .any(|allowed_ext| ext.eq_ignore_ascii_case(allowed_ext))
}

pub fn is_archive_name(name: &str) -> bool {
    classify(name) == FileClass::Archive
}

/// Last `/`-separated segment.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// `path` without the extension of its last segment.
pub fn strip_extension(path: &str) -> &str {
    let base_start = path.rfind('/').map(|idx| idx + 1).unwrap_or(0);
    match path[base_start..].rfind('.') {
        Some(0) | None => path,
        Some(dot) => &path[..base_start + dot],
    }
}

/// Normalise a relative object path and reject anything that escapes its root.
///
/// Backslashes become `/`, leading separators and `.` segments are dropped and
/// `..` pops the previous segment. Returns `None` when the result is empty or
/// would climb above the root.
pub fn normalize_relative(raw: &str) -> Option<String> {
    let unified = raw.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.trim_start_matches('/').split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Content type used when re-uploading a staged file.
pub fn content_type_for(name: &str) -> &'static str {
    match extension_lower(name).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("txt") => "text/plain",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Forward-slash path of `path` relative to `root`.
pub fn rel_string(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}

/// Recursively collect regular files under `root` whose extension is allowed.
pub fn collect_files_with_extensions(
    root: &Path,
    extensions: &[&str],
) -> Result<Vec<PathBuf>, IngestError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|source| IngestError::Walk {
            path: root.to_path_buf(),
            message: source.to_string(),
        })?;

        if entry.file_type().is_file()
            && has_extension(&entry.file_name().to_string_lossy(), extensions)
        {
            files.push(entry.path().to_path_buf());
        }
    }

    Ok(files)
}
