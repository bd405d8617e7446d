//! The detector interface and its strategy-selecting adapter.

use std::fmt;
use std::path::{Path, PathBuf};

use mosaic_common::error::MosaicResult;
use mosaic_model::{Detection, Frame, LabelClass};
use serde::{Deserialize, Serialize};

use crate::cascade::{decode_cascade, CascadeClassifier};
use crate::command::CommandModel;
use crate::preprocess::{to_grayscale, to_model_input};
use crate::structured::{decode_structured, StructuredModel};
use crate::tensor::{decode_raw_tensor, TensorModel};

/// Anything that can find regions of one label class in a frame.
///
/// `detect` never fails: an unavailable or misbehaving detector yields an
/// empty list and records why on its own state.
pub trait Detector: Send {
    /// Class every detection from this detector is grouped under.
    fn class(&self) -> LabelClass;

    /// Whether the underlying model loaded.
    fn is_available(&self) -> bool;

    /// Candidate regions in source-image pixel space, in detector order. Not clipped.
    fn detect(&mut self, frame: &Frame) -> Vec<Detection>;
}

/// Parameters shared by every decoding strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeSettings {
    pub confidence_threshold: f32,

    /// Side of the square model input, in pixels.
    pub input_size: u32,

    /// Model class index to name table. May be empty.
    pub class_names: Vec<String>,
}

impl DecodeSettings {
    /// Resolve a detection label.
    ///
    /// Order: the model's own label, then `class_names[class_id]`, then the
    /// adapter's class name.
    pub fn label_for(
        &self,
        native: Option<&str>,
        class_id: Option<usize>,
        class: LabelClass,
    ) -> String {
        if let Some(label) = native.filter(|l| !l.is_empty()) {
            return label.to_string();
        }
        class_id
            .and_then(|id| self.class_names.get(id))
            .cloned()
            .unwrap_or_else(|| class.as_str().to_string())
    }
}

/// Which decoding strategy a model's output needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoderKind {
    Structured,
    RawTensor,
    Cascade,
}

impl DecoderKind {
    /// Guess from the model file: `.onnx` graphs emit raw tensors, anything
    /// else is treated as a structured-output command.
    pub fn infer(model_path: &Path) -> Self {
        let is_onnx = model_path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("onnx"));
        if is_onnx {
            Self::RawTensor
        } else {
            Self::Structured
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::RawTensor => "raw_tensor",
            Self::Cascade => "cascade",
        }
    }
}

/// Everything needed to construct one detector.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub class: LabelClass,
    pub kind: DecoderKind,
    pub model_path: PathBuf,
    pub confidence_threshold: f32,
    pub input_size: u32,
    pub class_names: Vec<String>,
}

impl DetectorConfig {
    pub fn new(class: LabelClass, model_path: impl Into<PathBuf>) -> Self {
        let model_path = model_path.into();
        Self {
            class,
            kind: DecoderKind::infer(&model_path),
            model_path,
            confidence_threshold: 0.3,
            input_size: 640,
            class_names: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: DecoderKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_threshold(mut self, confidence_threshold: f32) -> Self {
        self.confidence_threshold = confidence_threshold;
        self
    }

    pub fn with_input_size(mut self, input_size: u32) -> Self {
        self.input_size = input_size;
        self
    }

    pub fn with_class_names(mut self, class_names: Vec<String>) -> Self {
        self.class_names = class_names;
        self
    }

    fn settings(&self) -> DecodeSettings {
        DecodeSettings {
            confidence_threshold: self.confidence_threshold,
            input_size: self.input_size,
            class_names: self.class_names.clone(),
        }
    }
}

/// The closed set of decoding strategies, fixed at construction.
pub enum DecodeStrategy {
    Structured(Box<dyn StructuredModel>),
    RawTensor(Box<dyn TensorModel>),
    Cascade(Box<dyn CascadeClassifier>),
    /// The model failed to load; every frame yields zero detections.
    Unavailable { reason: String },
}

impl DecodeStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Structured(_) => "structured",
            Self::RawTensor(_) => "raw_tensor",
            Self::Cascade(_) => "cascade",
            Self::Unavailable { .. } => "unavailable",
        }
    }
}

impl fmt::Debug for DecodeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => f
                .debug_struct("Unavailable")
                .field("reason", reason)
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}

/// Observable detector state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetectorHealth {
    pub available: bool,
    pub frames_processed: u64,
    /// Frames where inference failed and zero detections were returned.
    pub failures: u64,
    pub last_error: Option<String>,
}

/// A [`Detector`] backed by one model and one decoding strategy.
#[derive(Debug)]
pub struct DetectorAdapter {
    class: LabelClass,
    settings: DecodeSettings,
    strategy: DecodeStrategy,
    frames_processed: u64,
    failures: u64,
    last_error: Option<String>,
}

impl DetectorAdapter {
    /// Load the model described by `config`.
    ///
    /// Never fails. A load error degrades the adapter to
    /// [`DecodeStrategy::Unavailable`] and is logged once here.
    pub fn load(config: &DetectorConfig) -> Self {
        match Self::try_load(config) {
            Ok(adapter) => {
                tracing::info!(
                    class = %config.class,
                    kind = config.kind.as_str(),
                    model = %config.model_path.display(),
                    threshold = config.confidence_threshold,
                    "Detector loaded"
                );
                adapter
            }
            Err(e) => {
                tracing::warn!(
                    class = %config.class,
                    model = %config.model_path.display(),
                    error = %e,
                    "Detector unavailable; this class will yield no detections"
                );
                Self::unavailable(config.class, e.to_string())
            }
        }
    }

    fn try_load(config: &DetectorConfig) -> MosaicResult<Self> {
        let settings = config.settings();
        match config.kind {
            DecoderKind::Structured => {
                let model = CommandModel::load(&config.model_path)?;
                Ok(Self::with_structured(config.class, settings, Box::new(model)))
            }
            DecoderKind::Cascade => {
                let model = CommandModel::load(&config.model_path)?;
                Ok(Self::with_cascade(config.class, settings, Box::new(model)))
            }
            DecoderKind::RawTensor => Self::load_tensor(config, settings),
        }
    }

    #[cfg(feature = "onnx")]
    fn load_tensor(config: &DetectorConfig, settings: DecodeSettings) -> MosaicResult<Self> {
        let model = crate::onnx::OnnxModel::load(&config.model_path)?;
        Ok(Self::with_tensor(config.class, settings, Box::new(model)))
    }

    #[cfg(not(feature = "onnx"))]
    fn load_tensor(config: &DetectorConfig, _settings: DecodeSettings) -> MosaicResult<Self> {
        Err(mosaic_common::error::MosaicError::detector_unavailable(
            config.class.as_str(),
            "raw-tensor models need the `onnx` feature",
        ))
    }

    pub fn with_structured(
        class: LabelClass,
        settings: DecodeSettings,
        model: Box<dyn StructuredModel>,
    ) -> Self {
        Self::from_strategy(class, settings, DecodeStrategy::Structured(model))
    }

    pub fn with_tensor(
        class: LabelClass,
        settings: DecodeSettings,
        model: Box<dyn TensorModel>,
    ) -> Self {
        Self::from_strategy(class, settings, DecodeStrategy::RawTensor(model))
    }

    pub fn with_cascade(
        class: LabelClass,
        settings: DecodeSettings,
        model: Box<dyn CascadeClassifier>,
    ) -> Self {
        Self::from_strategy(class, settings, DecodeStrategy::Cascade(model))
    }

    /// An adapter that never detects anything, remembering why.
    pub fn unavailable(class: LabelClass, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let mut adapter = Self::from_strategy(
            class,
            DecodeSettings {
                confidence_threshold: 1.0,
                input_size: 1,
                class_names: Vec::new(),
            },
            DecodeStrategy::Unavailable {
                reason: reason.clone(),
            },
        );
        adapter.last_error = Some(reason);
        adapter
    }

    fn from_strategy(
        class: LabelClass,
        settings: DecodeSettings,
        strategy: DecodeStrategy,
    ) -> Self {
        Self {
            class,
            settings,
            strategy,
            frames_processed: 0,
            failures: 0,
            last_error: None,
        }
    }

    pub fn strategy(&self) -> &DecodeStrategy {
        &self.strategy
    }

    pub fn settings(&self) -> &DecodeSettings {
        &self.settings
    }

    pub fn health(&self) -> DetectorHealth {
        DetectorHealth {
            available: self.is_available(),
            frames_processed: self.frames_processed,
            failures: self.failures,
            last_error: self.last_error.clone(),
        }
    }

    fn run(&mut self, frame: &Frame) -> MosaicResult<Vec<Detection>> {
        let (width, height) = frame.dimensions();
        let settings = &self.settings;
        let class = self.class;

        match &mut self.strategy {
            DecodeStrategy::Structured(model) => {
                let input = to_model_input(frame, settings.input_size);
                let boxes = model.predict(&input, settings.confidence_threshold)?;
                Ok(decode_structured(&boxes, settings, class, width, height))
            }
            DecodeStrategy::RawTensor(model) => {
                let input = to_model_input(frame, settings.input_size);
                let tensor = model.forward(&input)?;
                Ok(decode_raw_tensor(&tensor, settings, class, width, height))
            }
            DecodeStrategy::Cascade(model) => {
                let gray = to_grayscale(frame);
                let boxes = model.detect_multi_scale(&gray)?;
                Ok(decode_cascade(&boxes, class))
            }
            DecodeStrategy::Unavailable { .. } => Ok(Vec::new()),
        }
    }
}

impl Detector for DetectorAdapter {
    fn class(&self) -> LabelClass {
        self.class
    }

    fn is_available(&self) -> bool {
        !matches!(self.strategy, DecodeStrategy::Unavailable { .. })
    }

    fn detect(&mut self, frame: &Frame) -> Vec<Detection> {
        if !self.is_available() {
            return Vec::new();
        }

        self.frames_processed += 1;
        match self.run(frame) {
            Ok(detections) => {
                tracing::debug!(
                    class = %self.class,
                    count = detections.len(),
                    "Detection pass complete"
                );
                detections
            }
            Err(e) => {
                self.failures += 1;
                tracing::warn!(
                    class = %self.class,
                    frame = self.frames_processed,
                    error = %e,
                    "Inference failed; returning no detections for this frame"
                );
                self.last_error = Some(e.to_string());
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structured::NativeBox;
    use image::RgbImage;
    use mosaic_common::error::MosaicError;
    use mosaic_model::PixelBox;

    struct FixedModel(Vec<NativeBox>);

    impl StructuredModel for FixedModel {
        fn predict(&mut self, input: &RgbImage, _t: f32) -> MosaicResult<Vec<NativeBox>> {
            assert_eq!(input.dimensions(), (640, 640));
            Ok(self.0.clone())
        }
    }

    struct BrokenModel;

    impl StructuredModel for BrokenModel {
        fn predict(&mut self, _input: &RgbImage, _t: f32) -> MosaicResult<Vec<NativeBox>> {
            Err(MosaicError::inference("model crashed"))
        }
    }

    fn settings() -> DecodeSettings {
        DecodeSettings {
            confidence_threshold: 0.3,
            input_size: 640,
            class_names: Vec::new(),
        }
    }

    #[test]
    fn test_infer_kind_from_extension() {
        assert_eq!(
            DecoderKind::infer(Path::new("models/face/yolov8n-face.onnx")),
            DecoderKind::RawTensor
        );
        assert_eq!(
            DecoderKind::infer(Path::new("models/face/detect.py")),
            DecoderKind::Structured
        );
    }

    #[test]
    fn test_label_resolution_order() {
        let s = DecodeSettings {
            class_names: vec!["face".into(), "license_plate".into()],
            ..settings()
        };
        assert_eq!(s.label_for(Some("person_face"), Some(1), LabelClass::Face), "person_face");
        assert_eq!(s.label_for(None, Some(1), LabelClass::Face), "license_plate");
        assert_eq!(s.label_for(None, Some(7), LabelClass::Plate), "plate");
        assert_eq!(s.label_for(Some(""), None, LabelClass::Face), "face");
    }

    #[test]
    fn test_missing_model_degrades_to_unavailable() {
        let config = DetectorConfig::new(LabelClass::Plate, "/nonexistent/plate-detector.bin");
        let mut adapter = DetectorAdapter::load(&config);

        assert!(!adapter.is_available());
        assert_eq!(adapter.strategy().name(), "unavailable");
        let frame = RgbImage::new(64, 48);
        assert!(adapter.detect(&frame).is_empty());

        let health = adapter.health();
        assert!(!health.available);
        assert_eq!(health.frames_processed, 0);
        assert!(health.last_error.is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_weights_file_without_runner_is_unavailable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let weights = dir.path().join("yolov8n-face.pt");
        std::fs::write(&weights, b"\x80\x02weights").unwrap();
        std::fs::set_permissions(&weights, std::fs::Permissions::from_mode(0o644)).unwrap();

        let config = DetectorConfig::new(LabelClass::Face, weights.clone());
        assert_eq!(config.kind, DecoderKind::Structured);
        let mut adapter = DetectorAdapter::load(&config);

        assert!(!adapter.is_available());
        for _ in 0..3 {
            assert!(adapter.detect(&RgbImage::new(32, 32)).is_empty());
        }
        let health = adapter.health();
        assert_eq!(health.frames_processed, 0);
        assert_eq!(health.failures, 0);
        assert!(health.last_error.unwrap().contains("not executable"));
    }

    #[test]
    fn test_structured_adapter_scales_to_frame() {
        let model = FixedModel(vec![NativeBox {
            label: None,
            class_id: None,
            confidence: 0.9,
            xyxy: [100.0, 100.0, 200.0, 200.0],
        }]);
        let mut adapter =
            DetectorAdapter::with_structured(LabelClass::Face, settings(), Box::new(model));

        let dets = adapter.detect(&RgbImage::new(1280, 480));
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].bbox(), PixelBox::new(200, 75, 400, 150));
        assert_eq!(adapter.health().frames_processed, 1);
    }

    #[test]
    fn test_inference_failure_is_counted_not_raised() {
        let mut adapter =
            DetectorAdapter::with_structured(LabelClass::Face, settings(), Box::new(BrokenModel));
        let frame = RgbImage::new(32, 32);

        assert!(adapter.detect(&frame).is_empty());
        assert!(adapter.detect(&frame).is_empty());

        let health = adapter.health();
        assert!(health.available);
        assert_eq!(health.frames_processed, 2);
        assert_eq!(health.failures, 2);
        assert!(health.last_error.unwrap().contains("model crashed"));
    }
}
