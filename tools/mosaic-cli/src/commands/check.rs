//! Check system capabilities.

use mosaic_common::config::{config_file_path, AppConfig};
use mosaic_detect::{Detector, DetectorAdapter, DetectorConfig};
use mosaic_model::LabelClass;
use mosaic_render::video::command_exists;

use super::{default_model_file, discover_model, search_roots};

struct DetectorReport {
    class: LabelClass,
    path: Option<String>,
    available: bool,
    reason: Option<String>,
}

pub fn run(json: bool, config: AppConfig) -> anyhow::Result<()> {
    let ffmpeg = command_exists(&config.video.ffmpeg);
    let ffprobe = command_exists(&config.video.ffprobe);

    let detectors: Vec<DetectorReport> = LabelClass::ALL
        .iter()
        .map(|&class| match discover_model(class) {
            Some(path) => {
                let adapter = DetectorAdapter::load(
                    &DetectorConfig::new(class, &path)
                        .with_threshold(config.redaction.confidence_threshold)
                        .with_input_size(config.redaction.input_size),
                );
                DetectorReport {
                    class,
                    path: Some(path.display().to_string()),
                    available: adapter.is_available(),
                    reason: adapter.health().last_error,
                }
            }
            None => DetectorReport {
                class,
                path: None,
                available: false,
                reason: Some(format!(
                    "models/{} not found",
                    default_model_file(class).display()
                )),
            },
        })
        .collect();

    if json {
        let report = serde_json::json!({
            "config_path": config_file_path().display().to_string(),
            "ffmpeg": ffmpeg,
            "ffprobe": ffprobe,
            "detectors": detectors
                .iter()
                .map(|d| serde_json::json!({
                    "class": d.class,
                    "path": d.path,
                    "available": d.available,
                    "reason": d.reason,
                }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Mosaic System Check");
    println!("{}", "=".repeat(50));
    println!("     Config: {}", config_file_path().display());

    let status = |ok: bool| if ok { "[OK]  " } else { "[WARN]" };
    println!("{} ffmpeg ({}): video redaction", status(ffmpeg), config.video.ffmpeg);
    println!("{} ffprobe ({}): video probing", status(ffprobe), config.video.ffprobe);

    println!();
    println!("Model search roots:");
    for root in search_roots() {
        println!("     {}", root.display());
    }
    for d in &detectors {
        match (&d.path, d.available) {
            (Some(path), true) => println!("[OK]   {} detector: {path}", d.class),
            (path, _) => println!(
                "[WARN] {} detector unavailable{}: {}",
                d.class,
                path.as_deref().map(|p| format!(" ({p})")).unwrap_or_default(),
                d.reason.as_deref().unwrap_or("unknown reason")
            ),
        }
    }

    println!();
    if ffmpeg && ffprobe && detectors.iter().all(|d| d.available) {
        println!("All capabilities are available. Mosaic is ready.");
    } else {
        println!("Some capabilities are missing; affected classes yield no detections.");
    }

    Ok(())
}
