//! Detect and redact a single image, printing both variants to stdout.

use std::path::PathBuf;

use anyhow::Context;
use mosaic_common::config::AppConfig;
use mosaic_model::LabelClass;
use mosaic_render::PipelineContext;

use super::DetectArgs;

pub fn run(
    input: PathBuf,
    output_meta: Option<PathBuf>,
    detect: DetectArgs,
    mut config: AppConfig,
) -> anyhow::Result<()> {
    detect.apply(&mut config)?;

    let detectors = detect.detector_configs(&LabelClass::ALL, &config);
    let mut ctx = PipelineContext::from_config(&config, &detectors);

    let result = ctx
        .process_image(&input)
        .with_context(|| format!("Failed to process {}", input.display()))?;

    if let Some(meta_path) = output_meta {
        result
            .export_metadata(&meta_path)
            .with_context(|| format!("Failed to write metadata to {}", meta_path.display()))?;
    }

    println!("{}", result.joined_payloads());
    Ok(())
}
