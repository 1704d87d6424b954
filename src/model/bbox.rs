//! YOLO bounding boxes in normalized center/size form.

use serde::{Deserialize, Serialize};

/// One label line: a class id plus a normalized center/size box.
///
/// Coordinates are stored exactly as read. Nothing here checks that they
/// fall inside `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub class_id: i64,
    pub x_center: f64,
    pub y_center: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    #[inline]
    pub fn new(class_id: i64, x_center: f64, y_center: f64, width: f64, height: f64) -> Self {
        Self {
            class_id,
            x_center,
            y_center,
            width,
            height,
        }
    }
}
