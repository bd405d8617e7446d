//! Irreversible region transforms.

use image::imageops::{self, FilterType};
use image::Rgb;
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use mosaic_common::config::{RedactionConfig, RedactionStrategy};
use mosaic_model::{Frame, PixelBox};

/// How a region is obscured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redaction {
    /// Overwrite every pixel with one constant color.
    SolidFill { color: Rgb<u8> },

    /// Downsample by `block_size`, then blow back up with nearest-neighbor.
    Pixelate { block_size: u32 },
}

impl Default for Redaction {
    fn default() -> Self {
        Self::SolidFill {
            color: Rgb([255, 255, 255]),
        }
    }
}

impl Redaction {
    pub fn from_config(config: &RedactionConfig) -> Self {
        match config.strategy {
            RedactionStrategy::Solid => Self::SolidFill {
                color: Rgb(config.fill_color),
            },
            RedactionStrategy::Pixelate => Self::Pixelate {
                block_size: config.block_size.max(1),
            },
        }
    }

    pub fn strategy(&self) -> RedactionStrategy {
        match self {
            Self::SolidFill { .. } => RedactionStrategy::Solid,
            Self::Pixelate { .. } => RedactionStrategy::Pixelate,
        }
    }

    /// Redact `region` in place.
    ///
    /// The region is clipped to the frame first. Returns the clipped box that
    /// was written, or `None` (frame untouched) when nothing redactable remains.
    pub fn apply(&self, frame: &mut Frame, region: &PixelBox) -> Option<PixelBox> {
        let (width, height) = frame.dimensions();
        let clipped = region.clip_checked(width, height)?;
        let (x, y) = (clipped.x1, clipped.y1);
        let (w, h) = (clipped.width() as u32, clipped.height() as u32);

        match *self {
            Self::SolidFill { color } => {
                draw_filled_rect_mut(frame, Rect::at(x, y).of_size(w, h), color);
            }
            Self::Pixelate { block_size } => {
                pixelate(frame, x as u32, y as u32, w, h, block_size.max(1));
            }
        }
        Some(clipped)
    }
}

/// Number of coarse cells along one axis of a pixelated region.
pub fn cell_count(extent: u32, block_size: u32) -> u32 {
    (extent / block_size.max(1)).max(1)
}

fn pixelate(frame: &mut Frame, x: u32, y: u32, w: u32, h: u32, block_size: u32) {
    let region = imageops::crop_imm(&*frame, x, y, w, h).to_image();
    let small = imageops::resize(
        &region,
        cell_count(w, block_size),
        cell_count(h, block_size),
        FilterType::Triangle,
    );
    let blocky = imageops::resize(&small, w, h, FilterType::Nearest);
    imageops::replace(frame, &blocky, i64::from(x), i64::from(y));
}
