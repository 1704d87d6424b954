#![allow(dead_code)]

use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

use yolo_ingest::model::BoundingBox;

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// Finite boxes with small integer class ids.
pub fn arb_bbox() -> BoxedStrategy<BoundingBox> {
    (
        0i64..1000,
        -2.0f64..2.0,
        -2.0f64..2.0,
        0.0f64..2.0,
        0.0f64..2.0,
    )
        .prop_map(|(class_id, x, y, w, h)| BoundingBox::new(class_id, x, y, w, h))
        .boxed()
}

/// Render a box the way annotation tools write label files.
pub fn label_line(bbox: &BoundingBox) -> String {
    format!(
        "{} {} {} {} {}",
        bbox.class_id, bbox.x_center, bbox.y_center, bbox.width, bbox.height
    )
}

/// Lines that must never produce a box.
pub fn arb_noise_line() -> BoxedStrategy<String> {
    prop_oneof![
        Just(String::new()),
        "[ \t]{1,4}".prop_map(|s| s),
        "#[a-z0-9 .]{0,20}".prop_map(|s| s),
        "[0-9]( [0-9.]{1,4}){0,3}".prop_map(|s| s),
        "[a-z]{1,5} 0.1 0.2 0.3 0.4".prop_map(|s| s),
    ]
    .boxed()
}

/// Relative image paths with one to four segments.
pub fn arb_image_path() -> BoxedStrategy<String> {
    (
        proptest::collection::vec("[a-zA-Z0-9_-]{1,8}", 0..4),
        "[a-z0-9_]{1,10}",
        prop_oneof![Just("jpg"), Just("JPEG"), Just("png"), Just("webp")],
    )
        .prop_map(|(dirs, stem, ext)| {
            let mut path = dirs.join("/");
            if !path.is_empty() {
                path.push('/');
            }
            format!("{path}{stem}.{ext}")
        })
        .boxed()
}
