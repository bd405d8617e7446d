//! Write a redacted copy of an image or video.

use std::path::PathBuf;

use anyhow::Context;
use mosaic_common::config::{AppConfig, RedactionStrategy};
use mosaic_model::LabelClass;
use mosaic_render::PipelineContext;

use super::{DetectArgs, MediaMode};

/// Threshold `anonymize` starts from.
const DEFAULT_CONFIDENCE: f32 = 0.35;

/// What `anonymize` runs with before the config file and flags apply: a
/// stricter threshold and pixelation.
pub fn base_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.redaction.confidence_threshold = DEFAULT_CONFIDENCE;
    config.redaction.strategy = RedactionStrategy::Pixelate;
    config
}

pub fn run(
    mode: MediaMode,
    input: PathBuf,
    output: PathBuf,
    detect: DetectArgs,
    mut config: AppConfig,
) -> anyhow::Result<()> {
    detect.apply(&mut config)?;

    // Faces are always attempted; plates only when a model is available.
    let mut classes = vec![LabelClass::Face];
    if detect.model_path(LabelClass::Plate).is_some() {
        classes.push(LabelClass::Plate);
    }
    let detectors = detect.detector_configs(&classes, &config);
    let mut ctx = PipelineContext::from_config(&config, &detectors);

    match mode {
        MediaMode::Image => {
            let variant = ctx
                .redact_image_file(&input, &output)
                .with_context(|| format!("Failed to anonymize {}", input.display()))?;
            println!(
                "Redacted {} region(s): {}",
                variant.detections_applied().len(),
                output.display()
            );
        }
        MediaMode::Video => {
            let summary = ctx
                .redact_video_file(&input, &output)
                .with_context(|| format!("Failed to anonymize {}", input.display()))?;
            println!(
                "Redacted {} region(s) over {} frame(s) at {:.3} fps: {}",
                summary.detections,
                summary.frames,
                summary.fps,
                output.display()
            );
        }
    }

    Ok(())
}
