//! Pixel box geometry: model-space scaling and clip-to-frame.
//!
//! Pure and stateless. A box is `(x1, y1, x2, y2)` where `x2`/`y2` are
//! exclusive, so a valid box inside a `W x H` frame satisfies
//! `0 <= x1 < x2 <= W` and `0 <= y1 < y2 <= H`.

use serde::{Deserialize, Serialize};

/// Axis-aligned box in integer pixel coordinates.
///
/// Serialized as a 4-element array `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct PixelBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl PixelBox {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Convert a center-encoded float box to corner encoding.
    ///
    /// Leading edges round down and trailing edges round up so the integer
    /// box always covers the float box.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::from_corners_f32(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    /// Build from float corners, rounding outward.
    pub fn from_corners_f32(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1: saturating_i32(x1.floor()),
            y1: saturating_i32(y1.floor()),
            x2: saturating_i32(x2.ceil()),
            y2: saturating_i32(y2.ceil()),
        }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// Area in pixels; zero for degenerate boxes.
    pub fn area(&self) -> u64 {
        if self.is_degenerate() {
            return 0;
        }
        self.width() as u64 * self.height() as u64
    }

    /// Whether the box has zero or negative width or height.
    pub fn is_degenerate(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }

    /// Clamp the box to a `width x height` frame.
    ///
    /// Leading edges clamp to `[0, dim - 1]`, trailing edges to `[0, dim]`.
    /// The result may be degenerate; callers must skip such boxes.
    pub fn clip(&self, width: u32, height: u32) -> Self {
        let w = dim_i32(width);
        let h = dim_i32(height);
        Self {
            x1: self.x1.clamp(0, (w - 1).max(0)),
            y1: self.y1.clamp(0, (h - 1).max(0)),
            x2: self.x2.clamp(0, w),
            y2: self.y2.clamp(0, h),
        }
    }

    /// Clip and drop the box when nothing redactable remains.
    pub fn clip_checked(&self, width: u32, height: u32) -> Option<Self> {
        let clipped = self.clip(width, height);
        (!clipped.is_degenerate()).then_some(clipped)
    }

    /// Map a model-space box to image space with independent axis factors.
    pub fn scale(&self, scale: ScaleFactors) -> Self {
        Self::from_corners_f32(
            self.x1 as f32 * scale.x,
            self.y1 as f32 * scale.y,
            self.x2 as f32 * scale.x,
            self.y2 as f32 * scale.y,
        )
    }

    /// Whether a pixel lies inside the box.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x1 && x < self.x2 && y >= self.y1 && y < self.y2
    }
}

impl From<[i32; 4]> for PixelBox {
    fn from(v: [i32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<PixelBox> for [i32; 4] {
    fn from(b: PixelBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Per-axis factors mapping model-input coordinates to image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
    pub x: f32,
    pub y: f32,
}

impl ScaleFactors {
    /// `image_dim / model_dim` for each axis of a square model input.
    pub fn model_to_image(input_size: u32, image_width: u32, image_height: u32) -> Self {
        let input = input_size.max(1) as f32;
        Self {
            x: image_width as f32 / input,
            y: image_height as f32 / input,
        }
    }

    /// Scale a single model-space point.
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.x, y * self.y)
    }
}

fn dim_i32(dim: u32) -> i32 {
    i32::try_from(dim).unwrap_or(i32::MAX)
}

fn saturating_i32(v: f32) -> i32 {
    if v.is_nan() {
        return 0;
    }
    // `as` saturates at the i32 bounds for finite and infinite floats.
    v as i32
}
