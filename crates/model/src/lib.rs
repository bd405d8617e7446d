//! Mosaic Model
//!
//! Defines the core data contracts of the redaction pipeline:
//! - **Geometry:** Integer pixel boxes and the clip-to-frame policy
//! - **Detection:** Labeled, scored regions emitted by detectors
//! - **Variant:** One redacted copy of a frame and the detections applied to it
//! - **Result:** Per-image output and its persisted metadata document
//!
//! All boxes are `(x1, y1, x2, y2)` in source-image pixels with exclusive
//! trailing edges.

pub mod detection;
pub mod geometry;
pub mod result;
pub mod variant;

pub use detection::*;
pub use geometry::*;
pub use result::*;
pub use variant::*;

/// A mutable RGB pixel buffer with fixed dimensions for its lifetime.
pub type Frame = image::RgbImage;
