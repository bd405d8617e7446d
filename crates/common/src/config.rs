//! Application configuration.
//!
//! Every tunable that influences detection or redaction lives here so call
//! sites never carry their own defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MosaicError, MosaicResult};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Detection thresholds and redaction strategy.
    pub redaction: RedactionConfig,

    /// Output image encoding.
    pub encoding: EncodingConfig,

    /// Video reader/writer settings.
    pub video: VideoConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Detection and redaction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionConfig {
    /// Minimum detector confidence for a region to be kept.
    pub confidence_threshold: f32,

    /// Square model input resolution in pixels.
    pub input_size: u32,

    /// Pixelation block edge in pixels.
    pub block_size: u32,

    /// Obscuring transform applied to detected regions.
    pub strategy: RedactionStrategy,

    /// RGB value written by the solid-fill strategy.
    pub fill_color: [u8; 3],
}

/// Which obscuring transform to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedactionStrategy {
    /// Overwrite every pixel with a constant.
    Solid,
    /// Downsample then nearest-neighbor upsample.
    Pixelate,
}

/// Compressed image format used for encoded variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodedFormat {
    Jpeg,
    Png,
}

/// Output image encoding parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    pub format: EncodedFormat,

    /// JPEG quality (1-100). Ignored for PNG.
    pub jpeg_quality: u8,
}

/// Video pipeline parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Frame rate used when the source reports none.
    pub fallback_fps: f64,

    /// ffmpeg video encoder name for the output stream.
    pub codec: String,

    /// ffmpeg executable.
    pub ffmpeg: String,

    /// ffprobe executable.
    pub ffprobe: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "mosaic_render=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.3,
            input_size: 640,
            block_size: 15,
            strategy: RedactionStrategy::Solid,
            fill_color: [255, 255, 255],
        }
    }
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            format: EncodedFormat::Jpeg,
            jpeg_quality: 95,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            fallback_fps: 25.0,
            codec: "mpeg4".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load the standard config file layered over `base`.
    ///
    /// A missing file yields `base` unchanged. Fields the file sets replace
    /// the matching fields of `base`; everything else keeps its base value.
    pub fn load_over(base: Self) -> MosaicResult<Self> {
        let config_path = config_file_path();
        if !config_path.exists() {
            return Ok(base);
        }
        Self::load_from_over(&config_path, base)
    }

    /// Load config from an explicit path. Missing sections take defaults.
    pub fn load_from(path: impl AsRef<Path>) -> MosaicResult<Self> {
        Self::load_from_over(path, Self::default())
    }

    /// Load config from an explicit path layered over `base`.
    pub fn load_from_over(path: impl AsRef<Path>, base: Self) -> MosaicResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MosaicError::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let overlay: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            MosaicError::config(format!("Failed to parse {}: {e}", path.display()))
        })?;

        let mut merged = serde_json::to_value(base)?;
        merge_json(&mut merged, overlay);
        let config: Self = serde_json::from_value(merged).map_err(|e| {
            MosaicError::config(format!("Failed to parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> MosaicResult<()> {
        let r = &self.redaction;
        if !(0.0..=1.0).contains(&r.confidence_threshold) {
            return Err(MosaicError::config(format!(
                "confidence_threshold must be within [0, 1], got {}",
                r.confidence_threshold
            )));
        }
        if r.input_size == 0 {
            return Err(MosaicError::config("input_size must be positive"));
        }
        if r.block_size == 0 {
            return Err(MosaicError::config("block_size must be positive"));
        }
        if !(1..=100).contains(&self.encoding.jpeg_quality) {
            return Err(MosaicError::config(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.encoding.jpeg_quality
            )));
        }
        if !self.video.fallback_fps.is_finite() || self.video.fallback_fps <= 0.0 {
            return Err(MosaicError::config(format!(
                "fallback_fps must be positive, got {}",
                self.video.fallback_fps
            )));
        }
        Ok(())
    }
}

impl RedactionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Solid => "solid",
            Self::Pixelate => "pixelate",
        }
    }
}

impl fmt::Display for RedactionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RedactionStrategy {
    type Err = MosaicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "solid" | "fill" => Ok(Self::Solid),
            "pixelate" | "mosaic" => Ok(Self::Pixelate),
            other => Err(MosaicError::config(format!(
                "Unknown redaction strategy: {other}. Use: solid, pixelate"
            ))),
        }
    }
}

/// Recursively overwrite `base` with every field present in `overlay`.
fn merge_json(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge_json(base.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("mosaic").join("config.json")
}
