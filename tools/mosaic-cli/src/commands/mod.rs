pub mod anonymize;
pub mod check;
pub mod process;

use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use mosaic_common::config::{AppConfig, RedactionStrategy};
use mosaic_detect::{DecoderKind, DetectorConfig};
use mosaic_model::LabelClass;

/// Folder searched for in ancestor directories.
const MODELS_DIR: &str = "models";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MediaMode {
    Image,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum KindArg {
    /// Raw tensor for `.onnx` models, structured otherwise
    #[default]
    Auto,
    Structured,
    Tensor,
    Cascade,
}

/// Detector and redaction flags shared by `process` and `anonymize`.
///
/// Every flag overrides the loaded configuration when given.
#[derive(Debug, Clone, Args)]
pub struct DetectArgs {
    /// Face detector model
    #[arg(long)]
    pub face_model: Option<PathBuf>,

    /// License plate detector model
    #[arg(long)]
    pub plate_model: Option<PathBuf>,

    /// Minimum detection confidence [0.0, 1.0]
    #[arg(long)]
    pub conf: Option<f32>,

    /// Square model input size in pixels
    #[arg(long)]
    pub imgsz: Option<u32>,

    /// Redaction strategy: solid|pixelate
    #[arg(long)]
    pub strategy: Option<String>,

    /// Pixelation block size in pixels
    #[arg(long)]
    pub block_size: Option<u32>,

    /// How model output is decoded
    #[arg(long, value_enum, default_value_t = KindArg::Auto)]
    pub detector_kind: KindArg,
}

impl DetectArgs {
    /// Fold the flags into `config` and validate the result.
    pub fn apply(&self, config: &mut AppConfig) -> anyhow::Result<()> {
        let r = &mut config.redaction;
        if let Some(conf) = self.conf {
            r.confidence_threshold = conf;
        }
        if let Some(imgsz) = self.imgsz {
            r.input_size = imgsz;
        }
        if let Some(strategy) = &self.strategy {
            r.strategy = strategy.parse::<RedactionStrategy>()?;
        }
        if let Some(block_size) = self.block_size {
            r.block_size = block_size;
        }
        config.validate()?;
        Ok(())
    }

    fn explicit_model(&self, class: LabelClass) -> Option<&Path> {
        match class {
            LabelClass::Face => self.face_model.as_deref(),
            LabelClass::Plate => self.plate_model.as_deref(),
        }
    }

    /// Model path for a class: the flag, else a discovered default.
    pub fn model_path(&self, class: LabelClass) -> Option<PathBuf> {
        self.explicit_model(class)
            .map(Path::to_path_buf)
            .or_else(|| discover_model(class))
    }

    pub fn detector_config(
        &self,
        class: LabelClass,
        model_path: PathBuf,
        config: &AppConfig,
    ) -> DetectorConfig {
        let kind = match self.detector_kind {
            KindArg::Auto => DecoderKind::infer(&model_path),
            KindArg::Structured => DecoderKind::Structured,
            KindArg::Tensor => DecoderKind::RawTensor,
            KindArg::Cascade => DecoderKind::Cascade,
        };
        DetectorConfig::new(class, model_path)
            .with_kind(kind)
            .with_threshold(config.redaction.confidence_threshold)
            .with_input_size(config.redaction.input_size)
    }

    /// One detector per class. Classes with no model anywhere still get a
    /// detector pointed at the conventional path, which then reports itself
    /// unavailable.
    pub fn detector_configs(
        &self,
        classes: &[LabelClass],
        config: &AppConfig,
    ) -> Vec<DetectorConfig> {
        classes
            .iter()
            .map(|&class| {
                let path = self
                    .model_path(class)
                    .unwrap_or_else(|| Path::new(MODELS_DIR).join(default_model_file(class)));
                self.detector_config(class, path, config)
            })
            .collect()
    }
}

/// Conventional model location under `models/`.
pub fn default_model_file(class: LabelClass) -> PathBuf {
    match class {
        LabelClass::Face => Path::new("face").join("yolov8n-face.onnx"),
        LabelClass::Plate => Path::new("plate").join("plate-detector.onnx"),
    }
}

/// Nearest `models/` directory above `start`, inclusive.
pub fn find_models_dir(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(MODELS_DIR))
        .find(|candidate| candidate.is_dir())
}

/// Where model discovery starts: the working directory, then the
/// executable's directory.
pub fn search_roots() -> Vec<PathBuf> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    std::env::current_dir().ok().into_iter().chain(exe_dir).collect()
}

/// The conventional model file for `class` under the nearest `models/`
/// directory of any search root.
pub fn discover_model(class: LabelClass) -> Option<PathBuf> {
    let file = default_model_file(class);
    let path = search_roots()
        .iter()
        .filter_map(|root| find_models_dir(root))
        .map(|dir| dir.join(&file))
        .find(|candidate| candidate.is_file())?;
    tracing::debug!(class = %class, path = %path.display(), "Discovered model");
    Some(path)
}
