//! Label-file candidates for an image path.
//!
//! Each rule maps an image path (relative, `/`-separated) to at most one
//! label path. Rules are tried in [`CANDIDATE_RULES`] order.

use crate::paths::{strip_extension, LABEL_EXTENSION};

/// A named path transformation.
pub struct CandidateRule {
    pub name: &'static str,
    pub apply: fn(&[&str]) -> Option<String>,
}

/// Layout conventions, highest priority first.
pub const CANDIDATE_RULES: [CandidateRule; 5] = [
    CandidateRule {
        name: "same_directory",
        apply: same_directory,
    },
    CandidateRule {
        name: "images_segment_mirrored",
        apply: images_segment_mirrored,
    },
    CandidateRule {
        name: "labels_root_mirror",
        apply: labels_root_mirror,
    },
    CandidateRule {
        name: "split_mirror",
        apply: split_mirror,
    },
    CandidateRule {
        name: "labels_flat",
        apply: labels_flat,
    },
];

const SPLITS: [&str; 3] = ["train", "val", "test"];

/// Ordered, de-duplicated label candidates for `image_path`.
pub fn label_candidates(image_path: &str) -> Vec<String> {
    let image_path = image_path.trim_start_matches('/');
    let segments: Vec<&str> = image_path.split('/').collect();

    let mut out: Vec<String> = Vec::with_capacity(CANDIDATE_RULES.len());
    for rule in &CANDIDATE_RULES {
        if let Some(candidate) = (rule.apply)(&segments) {
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        }
    }
    out
}

fn label_path(stemless: &str) -> String {
    format!("{stemless}.{LABEL_EXTENSION}")
}

fn same_directory(segments: &[&str]) -> Option<String> {
    Some(label_path(strip_extension(&segments.join("/"))))
}

/// The first `images` segment (any case) swapped for `labels`.
fn images_segment_mirrored(segments: &[&str]) -> Option<String> {
    let index = segments
        .iter()
        .position(|segment| segment.eq_ignore_ascii_case("images"))?;
    let mut mirrored = segments.to_vec();
    mirrored[index] = "labels";
    Some(label_path(strip_extension(&mirrored.join("/"))))
}

fn labels_root_mirror(segments: &[&str]) -> Option<String> {
    Some(format!(
        "labels/{}",
        label_path(strip_extension(&segments.join("/")))
    ))
}

/// `images/<split>/...` to `labels/<split>/...`.
fn split_mirror(segments: &[&str]) -> Option<String> {
    if segments.len() < 3 || !segments[0].eq_ignore_ascii_case("images") {
        return None;
    }
    if !SPLITS
        .iter()
        .any(|split| segments[1].eq_ignore_ascii_case(split))
    {
        return None;
    }
    Some(format!(
        "labels/{}",
        label_path(strip_extension(&segments[1..].join("/")))
    ))
}

fn labels_flat(segments: &[&str]) -> Option<String> {
    let file_name = segments.last()?;
    Some(format!("labels/{}", label_path(strip_extension(file_name))))
}
