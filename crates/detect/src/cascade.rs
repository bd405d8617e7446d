//! Sliding-window classifier strategy.
//!
//! Classical cascades scan a grayscale image at full resolution and report
//! boxes directly in image space. They carry no score, so every hit is
//! reported with confidence 1.0.

use image::GrayImage;
use mosaic_common::error::MosaicResult;
use mosaic_model::{Detection, LabelClass, PixelBox};

/// Confidence assigned to every cascade hit.
pub const CASCADE_CONFIDENCE: f32 = 1.0;

/// A multi-scale classifier over grayscale frames.
pub trait CascadeClassifier: Send {
    /// Image-space boxes for every window the classifier accepts.
    fn detect_multi_scale(&mut self, gray: &GrayImage) -> MosaicResult<Vec<PixelBox>>;
}

/// Label cascade hits with the adapter class; no scaling step.
pub fn decode_cascade(boxes: &[PixelBox], class: LabelClass) -> Vec<Detection> {
    boxes
        .iter()
        .map(|b| Detection::new(class.as_str(), CASCADE_CONFIDENCE, *b))
        .collect()
}
