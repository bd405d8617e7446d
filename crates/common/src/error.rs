//! Error types shared across Mosaic crates.

use std::path::{Path, PathBuf};

/// Top-level error type for Mosaic operations.
#[derive(Debug, thiserror::Error)]
pub enum MosaicError {
    /// The input image or video could not be opened or decoded.
    #[error("Source unreadable: {path}: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },

    /// A configured detector failed to initialize.
    #[error("Detector unavailable ({label}): {reason}")]
    DetectorUnavailable { label: String, reason: String },

    /// Compressed-image or transport encoding failed.
    #[error("Encoding failure: {message}")]
    Encoding { message: String },

    #[error("Video error: {message}")]
    Video { message: String },

    #[error("Inference error: {message}")]
    Inference { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using MosaicError.
pub type MosaicResult<T> = Result<T, MosaicError>;

impl MosaicError {
    pub fn source_unreadable(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::SourceUnreadable {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn detector_unavailable(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DetectorUnavailable {
            label: label.into(),
            reason: reason.into(),
        }
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding {
            message: msg.into(),
        }
    }

    pub fn video(msg: impl Into<String>) -> Self {
        Self::Video {
            message: msg.into(),
        }
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether this error means the input itself could not be read.
    pub fn is_source_unreadable(&self) -> bool {
        matches!(self, Self::SourceUnreadable { .. })
    }
}
