//! Direct-detection strategy: models that already emit labeled boxes.

use image::RgbImage;
use mosaic_common::error::MosaicResult;
use mosaic_model::{Detection, LabelClass, PixelBox, ScaleFactors};
use serde::{Deserialize, Serialize};

use crate::adapter::DecodeSettings;

/// A box as reported by a higher-level detection library, in model-input space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeBox {
    /// Class name reported by the model, if any.
    #[serde(default)]
    pub label: Option<String>,

    /// Class index into the model's name table, if any.
    #[serde(default)]
    pub class_id: Option<usize>,

    #[serde(default = "default_confidence")]
    pub confidence: f32,

    /// `[x1, y1, x2, y2]` corners.
    #[serde(rename = "box")]
    pub xyxy: [f32; 4],
}

fn default_confidence() -> f32 {
    1.0
}

/// A model that returns structured boxes for a model-input sized image.
pub trait StructuredModel: Send {
    /// Run the model on an `input_size x input_size` image.
    fn predict(&mut self, input: &RgbImage, confidence_threshold: f32)
        -> MosaicResult<Vec<NativeBox>>;
}

/// Map native boxes into image-space detections.
///
/// Boxes below the threshold are dropped; coordinates are scaled by
/// `image_dim / input_size` on each axis independently.
pub fn decode_structured(
    boxes: &[NativeBox],
    settings: &DecodeSettings,
    class: LabelClass,
    image_width: u32,
    image_height: u32,
) -> Vec<Detection> {
    let scale = ScaleFactors::model_to_image(settings.input_size, image_width, image_height);

    boxes
        .iter()
        .filter(|b| b.confidence >= settings.confidence_threshold)
        .map(|b| {
            let [x1, y1, x2, y2] = b.xyxy;
            let (sx1, sy1) = scale.apply(x1, y1);
            let (sx2, sy2) = scale.apply(x2, y2);
            let label = settings.label_for(b.label.as_deref(), b.class_id, class);
            Detection::new(
                label,
                b.confidence,
                PixelBox::from_corners_f32(sx1, sy1, sx2, sy2),
            )
        })
        .collect()
}
