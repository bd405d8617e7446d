//! Detected regions and the label classes they belong to.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::PixelBox;

/// Label class a detector is configured for.
///
/// Detections are grouped by the class of the detector that produced them,
/// independent of the label string the model itself reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelClass {
    Face,
    Plate,
}

impl LabelClass {
    pub const ALL: [LabelClass; 2] = [LabelClass::Face, LabelClass::Plate];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Face => "face",
            Self::Plate => "plate",
        }
    }
}

impl fmt::Display for LabelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single candidate region: label, detector confidence, and pixel box.
///
/// Immutable once built; clipping returns a new value. Confidence is the
/// detector's raw score and is not comparable across detector types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    label: String,
    confidence: f32,
    #[serde(rename = "box")]
    bbox: PixelBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: PixelBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn bbox(&self) -> PixelBox {
        self.bbox
    }

    /// Clipped copy, or `None` when the clipped box is degenerate.
    pub fn clip_to(&self, width: u32, height: u32) -> Option<Detection> {
        let bbox = self.bbox.clip_checked(width, height)?;
        Some(Detection {
            label: self.label.clone(),
            confidence: self.confidence,
            bbox,
        })
    }
}

/// Clip every detection to the frame, dropping degenerate ones and keeping order.
pub fn clip_all<'a, I>(detections: I, width: u32, height: u32) -> Vec<Detection>
where
    I: IntoIterator<Item = &'a Detection>,
{
    detections
        .into_iter()
        .filter_map(|d| d.clip_to(width, height))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_returns_new_detection() {
        let det = Detection::new("face", 0.9, PixelBox::new(-10, -10, 50, 700));
        let clipped = det.clip_to(640, 480).unwrap();
        assert_eq!(clipped.bbox(), PixelBox::new(0, 0, 50, 480));
        assert_eq!(det.bbox(), PixelBox::new(-10, -10, 50, 700));
        assert_eq!(clipped.label(), "face");
        assert_eq!(clipped.confidence(), 0.9);
    }

    #[test]
    fn test_clip_all_preserves_order_and_drops_degenerate() {
        let dets = vec![
            Detection::new("face", 0.9, PixelBox::new(10, 10, 20, 20)),
            Detection::new("face", 0.8, PixelBox::new(-30, 0, -1, 10)),
            Detection::new("plate", 0.7, PixelBox::new(5, 5, 15, 15)),
        ];
        let kept = clip_all(&dets, 100, 100);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence(), 0.9);
        assert_eq!(kept[1].label(), "plate");
    }

    #[test]
    fn test_detection_json_shape() {
        let det = Detection::new("face", 0.5, PixelBox::new(100, 100, 200, 200));
        let value = serde_json::to_value(&det).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"label": "face", "confidence": 0.5, "box": [100, 100, 200, 200]})
        );
    }

    #[test]
    fn test_label_class_names() {
        assert_eq!(LabelClass::Face.to_string(), "face");
        assert_eq!(
            serde_json::to_string(&LabelClass::Plate).unwrap(),
            "\"plate\""
        );
    }
}
