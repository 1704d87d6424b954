//! YOLO label line parsing.
//!
//! Parsing is lenient: a line that cannot be read as a box is skipped and the
//! rest of the file is still used.

use crate::model::BoundingBox;

/// Why a line produced no box.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineSkip {
    Blank,
    Comment,
    TooFewFields(usize),
    InvalidNumber { field: &'static str, raw: String },
}

const FIELD_NAMES: [&str; 4] = ["x_center", "y_center", "width", "height"];

/// Parse one label line into a box.
///
/// Fields past the fifth are ignored. The class id accepts any float
/// spelling (`"1.0"`) and is truncated toward zero.
pub fn parse_label_line(line: &str) -> Result<BoundingBox, LineSkip> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(LineSkip::Blank);
    }
    if trimmed.starts_with('#') {
        return Err(LineSkip::Comment);
    }

    // Only the first 5 tokens matter; do not collect the rest.
    let tokens: Vec<&str> = trimmed.split_whitespace().take(5).collect();
    if tokens.len() < 5 {
        return Err(LineSkip::TooFewFields(tokens.len()));
    }

    let class_id = parse_finite(tokens[0], "class_id")?.trunc();
    if class_id < i64::MIN as f64 || class_id > i64::MAX as f64 {
        return Err(LineSkip::InvalidNumber {
            field: "class_id",
            raw: tokens[0].to_string(),
        });
    }

    let mut coords = [0.0f64; 4];
    for (slot, (raw, field)) in coords
        .iter_mut()
        .zip(tokens[1..].iter().zip(FIELD_NAMES))
    {
        *slot = parse_finite(raw, field)?;
    }

    Ok(BoundingBox::new(
        class_id as i64,
        coords[0],
        coords[1],
        coords[2],
        coords[3],
    ))
}

fn parse_finite(raw: &str, field: &'static str) -> Result<f64, LineSkip> {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(LineSkip::InvalidNumber {
            field,
            raw: raw.to_string(),
        }),
    }
}

/// Parse every valid line of a label file, in file order.
pub fn parse_label_lines(content: &str) -> Vec<BoundingBox> {
    content
        .lines()
        .filter_map(|line| parse_label_line(line).ok())
        .collect()
}

/// Fuzz-only entrypoint for single-line parsing.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_label_line(input: &str) {
    if let Ok(bbox) = parse_label_line(input) {
        assert!(
            [bbox.x_center, bbox.y_center, bbox.width, bbox.height]
                .iter()
                .all(|value| value.is_finite()),
            "parsed box must be finite: {bbox:?}"
        );
    }
}
