//! Records produced and persisted by the ingestion pipeline.
//!
//! The scan stage produces [`ImageEntry`] values; the metadata layer persists
//! them as [`ImageRecord`]s owned by exactly one [`DatasetRecord`].
//!
//! # Example
//!
//! ```
//! use yolo_ingest::model::{BoundingBox, ImageEntry};
//!
//! let entry = ImageEntry::new(
//!     "images/train/dog.jpg",
//!     vec![BoundingBox::new(0, 0.5, 0.5, 0.25, 0.25)],
//! );
//! assert!(entry.has_labels());
//! ```

mod bbox;
mod ids;
mod records;

pub use bbox::BoundingBox;
pub use ids::DatasetId;
pub use records::{DatasetLocation, DatasetRecord, ImageEntry, ImageRecord};
