//! Frame preparation for model input.

use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{EncodableLayout, GrayImage, ImageBuffer, Pixel, PixelWithColorType, RgbImage};
use mosaic_common::error::MosaicResult;

/// Stretch a frame to the square model input. Aspect ratio is not preserved;
/// decoders undo this with independent per-axis scale factors.
pub fn to_model_input(frame: &RgbImage, input_size: u32) -> RgbImage {
    if frame.dimensions() == (input_size, input_size) {
        return frame.clone();
    }
    imageops::resize(frame, input_size, input_size, FilterType::Triangle)
}

pub fn to_grayscale(frame: &RgbImage) -> GrayImage {
    imageops::grayscale(frame)
}

/// Lossless PNG bytes, used to hand frames to external model processes.
pub fn encode_png<P>(image: &ImageBuffer<P, Vec<P::Subpixel>>) -> MosaicResult<Vec<u8>>
where
    P: Pixel + PixelWithColorType,
    [P::Subpixel]: EncodableLayout,
{
    let mut bytes = Vec::new();
    image.write_with_encoder(PngEncoder::new(&mut bytes))?;
    Ok(bytes)
}
