//! Per-image processing result and its persisted metadata document.

use std::collections::BTreeMap;
use std::path::Path;

use mosaic_common::error::MosaicResult;
use serde::Serialize;

use crate::detection::Detection;

/// Token placed between encoded variants sharing one text channel.
pub const PAYLOAD_SEPARATOR: &str = "---SPLIT---";

/// A variant's frame after compression and transport encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedVariant {
    pub name: String,
    pub payload: String,
}

/// Everything produced for one input image.
///
/// Lives in process memory unless exported with [`ProcessingResult::export_metadata`].
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// Path or identifier of the source image.
    pub source: String,

    /// Encoded variants in the order they were composited.
    pub variants: Vec<EncodedVariant>,

    pub faces: Vec<Detection>,

    pub plates: Vec<Detection>,
}

impl ProcessingResult {
    /// Encoded payload of a named variant.
    pub fn payload(&self, name: &str) -> Option<&str> {
        self.variants
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.payload.as_str())
    }

    /// All variant payloads joined by [`PAYLOAD_SEPARATOR`], in variant order.
    pub fn joined_payloads(&self) -> String {
        join_payloads(self.variants.iter().map(|v| v.payload.as_str()))
    }

    /// Structured metadata: source, one key per variant, and detections per class.
    pub fn metadata(&self) -> MetadataDocument<'_> {
        MetadataDocument {
            original: &self.source,
            variants: self
                .variants
                .iter()
                .map(|v| (v.name.as_str(), v.payload.as_str()))
                .collect(),
            faces: &self.faces,
            plates: &self.plates,
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Write the metadata document as pretty-printed JSON.
    pub fn export_metadata(&self, path: impl AsRef<Path>) -> MosaicResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.metadata())?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Wrote detection metadata");
        Ok(())
    }
}

/// Self-describing metadata record for one processed image.
#[derive(Debug, Serialize)]
pub struct MetadataDocument<'a> {
    pub original: &'a str,

    /// Variant name to encoded payload, flattened into the top level.
    #[serde(flatten)]
    pub variants: BTreeMap<&'a str, &'a str>,

    pub faces: &'a [Detection],

    pub plates: &'a [Detection],

    /// RFC 3339 timestamp of when the document was produced.
    pub generated_at: String,
}

/// Join payloads with the separator token.
pub fn join_payloads<'a, I>(payloads: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    payloads.into_iter().collect::<Vec<_>>().join(PAYLOAD_SEPARATOR)
}

/// Split a joined channel back into payloads. Surrounding whitespace is trimmed.
pub fn split_payloads(joined: &str) -> Vec<&str> {
    joined.trim().split(PAYLOAD_SEPARATOR).collect()
}
