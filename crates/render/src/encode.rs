//! Frame serialization: compressed bytes, then a text-safe transport encoding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::ImageFormat;
use mosaic_common::config::{EncodedFormat, EncodingConfig};
use mosaic_common::error::{MosaicError, MosaicResult};
use mosaic_model::Frame;

/// Compresses frames and wraps them in standard base64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEncoder {
    format: EncodedFormat,
    jpeg_quality: u8,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::from_config(&EncodingConfig::default())
    }
}

impl FrameEncoder {
    pub fn new(format: EncodedFormat, jpeg_quality: u8) -> Self {
        Self {
            format,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn from_config(config: &EncodingConfig) -> Self {
        Self::new(config.format, config.jpeg_quality)
    }

    pub fn format(&self) -> EncodedFormat {
        self.format
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    pub fn image_format(&self) -> ImageFormat {
        match self.format {
            EncodedFormat::Jpeg => ImageFormat::Jpeg,
            EncodedFormat::Png => ImageFormat::Png,
        }
    }

    /// Compressed image bytes.
    pub fn encode(&self, frame: &Frame) -> MosaicResult<Vec<u8>> {
        let mut bytes = Vec::new();
        let written = match self.format {
            EncodedFormat::Jpeg => frame
                .write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, self.jpeg_quality)),
            EncodedFormat::Png => frame.write_with_encoder(PngEncoder::new(&mut bytes)),
        };
        written
            .map_err(|e| MosaicError::encoding(format!("{:?} encode failed: {e}", self.format)))?;
        Ok(bytes)
    }

    /// Compressed bytes as standard base64.
    pub fn encode_transport(&self, frame: &Frame) -> MosaicResult<String> {
        Ok(STANDARD.encode(self.encode(frame)?))
    }

    /// Recover compressed bytes from a transport payload.
    pub fn decode_transport(payload: &str) -> MosaicResult<Vec<u8>> {
        STANDARD
            .decode(payload.trim())
            .map_err(|e| MosaicError::encoding(format!("Invalid base64 payload: {e}")))
    }

    /// Decode a transport payload all the way back to pixels.
    pub fn decode_frame(payload: &str) -> MosaicResult<Frame> {
        let bytes = Self::decode_transport(payload)?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| MosaicError::encoding(format!("Payload is not an image: {e}")))?;
        Ok(image.to_rgb8())
    }
}
