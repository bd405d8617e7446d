//! Mosaic Detect — detector adapters
//!
//! Turns heterogeneous detector output into [`Detection`]s in source-image
//! pixel space. One interface, [`Detector`], backed by a closed set of
//! decoding strategies chosen at construction time:
//! - **Structured:** the model already returns labeled boxes in model space
//! - **Raw tensor:** per-anchor `[cx, cy, w, h, objectness, class_scores...]`
//! - **Cascade:** sliding-window classifier on grayscale input, image-space boxes
//!
//! A detector that fails to load stays constructible and reports itself as
//! unavailable; it then yields no detections instead of failing the pipeline.
//!
//! [`Detection`]: mosaic_model::Detection

pub mod adapter;
pub mod cascade;
pub mod command;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod preprocess;
pub mod structured;
pub mod tensor;

pub use adapter::*;
pub use cascade::CascadeClassifier;
pub use command::CommandModel;
pub use structured::{NativeBox, StructuredModel};
pub use tensor::{RawTensor, TensorModel};
