//! Labeled redaction variants.

use crate::detection::Detection;
use crate::Frame;

/// Variant with every detection class redacted.
pub const VARIANT_ALL: &str = "all";

/// Variant with only faces redacted.
pub const VARIANT_FACES_ONLY: &str = "faces_only";

/// A named subset of detections to redact on its own copy of a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantRequest {
    pub name: String,
    pub detections: Vec<Detection>,
}

impl VariantRequest {
    pub fn new(name: impl Into<String>, detections: Vec<Detection>) -> Self {
        Self {
            name: name.into(),
            detections,
        }
    }
}

/// The canonical image policy: `all` = faces then plates, `faces_only` = faces.
///
/// Overlapping boxes are kept as-is; no deduplication happens here.
pub fn canonical_requests(faces: &[Detection], plates: &[Detection]) -> Vec<VariantRequest> {
    let all: Vec<Detection> = faces.iter().chain(plates.iter()).cloned().collect();
    vec![
        VariantRequest::new(VARIANT_ALL, all),
        VariantRequest::new(VARIANT_FACES_ONLY, faces.to_vec()),
    ]
}

/// One redacted output frame. Read-only after creation.
#[derive(Debug, Clone)]
pub struct RedactionVariant {
    name: String,
    frame: Frame,
    applied: Vec<Detection>,
}

impl RedactionVariant {
    pub fn new(name: impl Into<String>, frame: Frame, applied: Vec<Detection>) -> Self {
        Self {
            name: name.into(),
            frame,
            applied,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Detections actually redacted, clipped, in application order.
    pub fn detections_applied(&self) -> &[Detection] {
        &self.applied
    }

    /// Give up the frame, e.g. to hand it to a video writer.
    pub fn into_frame(self) -> Frame {
        self.frame
    }
}
