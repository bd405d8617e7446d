//! Raw-tensor decoding strategy.
//!
//! The detector emits one row per anchor: `[cx, cy, w, h, objectness,
//! class_scores...]` in model-input pixels. No non-max suppression is
//! applied; overlapping boxes above threshold are all kept.

use image::RgbImage;
use mosaic_common::error::{MosaicError, MosaicResult};
use mosaic_model::{Detection, LabelClass, PixelBox, ScaleFactors};

use crate::adapter::DecodeSettings;

/// Index of the objectness score within an anchor row.
const OBJECTNESS: usize = 4;

/// Index of the first class score within an anchor row.
const FIRST_CLASS: usize = 5;

/// A model that returns a raw per-anchor prediction tensor.
pub trait TensorModel: Send {
    /// Run the model on an `input_size x input_size` image.
    fn forward(&mut self, input: &RgbImage) -> MosaicResult<RawTensor>;
}

/// Flat prediction tensor with its anchor/feature layout.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTensor {
    data: Vec<f32>,
    anchors: usize,
    features: usize,
    /// `[anchors, features]` when true, `[features, anchors]` otherwise.
    anchor_major: bool,
}

impl RawTensor {
    pub fn new(
        data: Vec<f32>,
        anchors: usize,
        features: usize,
        anchor_major: bool,
    ) -> MosaicResult<Self> {
        if features <= FIRST_CLASS {
            return Err(MosaicError::inference(format!(
                "Tensor rows need at least {} features, got {features}",
                FIRST_CLASS + 1
            )));
        }
        if data.len() != anchors * features {
            return Err(MosaicError::inference(format!(
                "Tensor size mismatch: expected {}x{}={}, got {}",
                anchors,
                features,
                anchors * features,
                data.len()
            )));
        }
        Ok(Self {
            data,
            anchors,
            features,
            anchor_major,
        })
    }

    /// Build from an output shape such as `[1, 25200, 85]` or `[1, 85, 8400]`.
    ///
    /// Leading unit dimensions are dropped. The longer remaining axis is
    /// taken to be the anchor axis.
    pub fn from_shape(data: Vec<f32>, shape: &[i64]) -> MosaicResult<Self> {
        let dims: Vec<usize> = shape
            .iter()
            .skip_while(|d| **d == 1)
            .map(|d| usize::try_from(*d).unwrap_or(0))
            .collect();
        let [a, b] = dims[..] else {
            return Err(MosaicError::inference(format!(
                "Unsupported tensor shape {shape:?}"
            )));
        };
        if a >= b {
            Self::new(data, a, b, true)
        } else {
            Self::new(data, b, a, false)
        }
    }

    pub fn anchors(&self) -> usize {
        self.anchors
    }

    pub fn features(&self) -> usize {
        self.features
    }

    fn value(&self, anchor: usize, feature: usize) -> f32 {
        if self.anchor_major {
            self.data[anchor * self.features + feature]
        } else {
            self.data[feature * self.anchors + anchor]
        }
    }

    /// Highest class score for an anchor; the first index wins ties.
    fn best_class(&self, anchor: usize) -> (usize, f32) {
        let mut best = (0usize, f32::NEG_INFINITY);
        for feature in FIRST_CLASS..self.features {
            let score = self.value(anchor, feature);
            if score > best.1 {
                best = (feature - FIRST_CLASS, score);
            }
        }
        best
    }
}

/// Decode every anchor that clears the threshold into an image-space detection.
///
/// Per anchor: reject on objectness below threshold, take the arg-max class,
/// reject when `class_score * objectness` is below threshold, convert the
/// center box to corners, and scale from model input to image resolution.
pub fn decode_raw_tensor(
    tensor: &RawTensor,
    settings: &DecodeSettings,
    class: LabelClass,
    image_width: u32,
    image_height: u32,
) -> Vec<Detection> {
    let threshold = settings.confidence_threshold;
    let scale = ScaleFactors::model_to_image(settings.input_size, image_width, image_height);
    let mut detections = Vec::new();

    for anchor in 0..tensor.anchors {
        let objectness = tensor.value(anchor, OBJECTNESS);
        if !(objectness >= threshold) {
            continue;
        }

        let (class_id, class_score) = tensor.best_class(anchor);
        let score = class_score * objectness;
        if !(score >= threshold) {
            continue;
        }

        let cx = tensor.value(anchor, 0);
        let cy = tensor.value(anchor, 1);
        let w = tensor.value(anchor, 2);
        let h = tensor.value(anchor, 3);
        let (x1, y1) = scale.apply(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = scale.apply(cx + w / 2.0, cy + h / 2.0);

        detections.push(Detection::new(
            settings.label_for(None, Some(class_id), class),
            score,
            PixelBox::from_corners_f32(x1, y1, x2, y2),
        ));
    }

    detections
}
