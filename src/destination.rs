//! Destination prefix planning.
//!
//! Every run lands under `<base-folder>/<sanitized-name>/<run-id>/` in the
//! destination bucket. Unless a run id is pinned, each plan gets a fresh id,
//! so repeated ingestions of one dataset never overwrite each other's objects.

use crate::storage::StorageUri;

pub const DEFAULT_BASE_FOLDER: &str = "datasets";
const FALLBACK_SEGMENT: &str = "dataset";
const RUN_ID_LEN: usize = 12;

/// Where re-uploaded files go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DestinationSettings {
    /// Destination bucket; defaults to the source URI's bucket.
    pub bucket: Option<String>,
    pub base_folder: String,
    /// Pinned run id; a random one is generated per plan when absent.
    pub run_id: Option<String>,
}

impl Default for DestinationSettings {
    fn default() -> Self {
        Self {
            bucket: None,
            base_folder: DEFAULT_BASE_FOLDER.to_string(),
            run_id: None,
        }
    }
}

/// Make a dataset name safe for use as one path segment.
///
/// Runs of characters outside `[A-Za-z0-9._-]` collapse into one `-`.
pub fn sanitize_segment(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch);
            in_run = false;
        } else if !in_run {
            out.push('-');
            in_run = true;
        }
    }

    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        FALLBACK_SEGMENT.to_string()
    } else {
        trimmed.to_string()
    }
}

/// A fresh 12-character lowercase hex token.
pub fn generate_run_id() -> String {
    let token = format!("{:016x}", rand::random::<u64>());
    token[..RUN_ID_LEN].to_string()
}

/// The destination prefix for one run.
pub fn plan(
    source_uri: &StorageUri,
    dataset_name: &str,
    settings: &DestinationSettings,
) -> StorageUri {
    let bucket = settings
        .bucket
        .as_deref()
        .filter(|bucket| !bucket.trim().is_empty())
        .unwrap_or(source_uri.bucket());
    let run_id = settings
        .run_id
        .clone()
        .filter(|run_id| !run_id.trim().is_empty())
        .unwrap_or_else(generate_run_id);

    let mut key = String::new();
    let base = settings.base_folder.trim_matches('/');
    if !base.is_empty() {
        key.push_str(base);
        key.push('/');
    }
    key.push_str(&sanitize_segment(dataset_name));
    key.push('/');
    key.push_str(run_id.trim_matches('/'));
    key.push('/');

    StorageUri::new(source_uri.scheme(), bucket, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> StorageUri {
        StorageUri::parse("gs://raw-bucket/uploads/cats.zip").expect("parse uri")
    }

    #[test]
    fn sanitize_collapses_disallowed_runs() {
        assert_eq!(sanitize_segment("My Dataset #1!"), "My-Dataset-1");
        assert_eq!(sanitize_segment("  a//b  "), "a-b");
        assert_eq!(sanitize_segment("v1.2_final-cut"), "v1.2_final-cut");
        assert_eq!(sanitize_segment("日本"), "dataset");
        assert_eq!(sanitize_segment("   "), "dataset");
    }

    #[test]
    fn run_ids_are_twelve_hex_chars() {
        let run_id = generate_run_id();
        assert_eq!(run_id.len(), 12);
        assert!(run_id.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn pinned_plan_is_deterministic() {
        let settings = DestinationSettings {
            bucket: Some("staged".to_string()),
            base_folder: "/extracted/".to_string(),
            run_id: Some("run1".to_string()),
        };
        let dest = plan(&source(), "My Dataset #1!", &settings);
        assert_eq!(dest.to_string(), "gs://staged/extracted/My-Dataset-1/run1/");
        assert!(dest.is_prefix());
    }

    #[test]
    fn unpinned_plans_differ_and_reuse_source_bucket() {
        let settings = DestinationSettings::default();
        let first = plan(&source(), "cats", &settings);
        let second = plan(&source(), "cats", &settings);
        assert_ne!(first, second);
        assert_eq!(first.bucket(), "raw-bucket");
        assert!(first.key().starts_with("datasets/cats/"));
    }
}
