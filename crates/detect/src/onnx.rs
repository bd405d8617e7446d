//! ONNX Runtime backend for raw-tensor detectors.

use std::path::Path;

use image::RgbImage;
use mosaic_common::error::{MosaicError, MosaicResult};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};

use crate::tensor::{RawTensor, TensorModel};

/// A loaded ONNX graph emitting one per-anchor prediction tensor.
pub struct OnnxModel {
    session: Session,
    output_name: String,
}

impl OnnxModel {
    pub fn load(model_path: &Path) -> MosaicResult<Self> {
        let label = model_path.display().to_string();
        let model_bytes = std::fs::read(model_path)
            .map_err(|e| MosaicError::detector_unavailable(&label, format!("read failed: {e}")))?;

        let session = Session::builder()
            .map_err(|e| MosaicError::detector_unavailable(&label, e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| MosaicError::detector_unavailable(&label, e.to_string()))?
            .commit_from_memory(&model_bytes)
            .map_err(|e| {
                MosaicError::detector_unavailable(&label, format!("Failed to load ONNX model: {e}"))
            })?;

        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| MosaicError::detector_unavailable(&label, "model has no outputs"))?;

        tracing::debug!(model = %label, output = %output_name, "ONNX session ready");
        Ok(Self {
            session,
            output_name,
        })
    }

    /// NCHW float32 in [0, 1].
    fn to_input(input: &RgbImage) -> MosaicResult<Value> {
        let (w, h) = (input.width() as usize, input.height() as usize);
        let mut chw: Vec<f32> = Vec::with_capacity(3 * h * w);
        for c in 0..3 {
            for pixel in input.pixels() {
                chw.push(pixel[c] as f32 / 255.0);
            }
        }
        Tensor::from_array((vec![1usize, 3, h, w], chw.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MosaicError::inference(format!("Failed to create tensor: {e}")))
    }
}

impl TensorModel for OnnxModel {
    fn forward(&mut self, input: &RgbImage) -> MosaicResult<RawTensor> {
        let value = Self::to_input(input)?;
        let outputs = self
            .session
            .run(ort::inputs![value])
            .map_err(|e| MosaicError::inference(format!("ONNX inference failed: {e}")))?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            MosaicError::inference(format!("Missing {} tensor", self.output_name))
        })?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MosaicError::inference(format!("Failed to extract tensor: {e}")))?;

        let dims: Vec<i64> = shape.iter().copied().collect();
        RawTensor::from_shape(data.to_vec(), &dims)
    }
}
