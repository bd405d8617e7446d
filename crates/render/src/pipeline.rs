//! Media loop: drives detection, compositing, and serialization over one
//! image, a batch of images, or every frame of a video.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;
use mosaic_common::config::{AppConfig, VideoConfig};
use mosaic_common::error::{MosaicError, MosaicResult};
use mosaic_detect::{Detector, DetectorAdapter, DetectorConfig};
use mosaic_model::{
    canonical_requests, clip_all, Detection, EncodedVariant, Frame, LabelClass,
    ProcessingResult, RedactionVariant, VariantRequest, VARIANT_ALL,
};
use serde::Serialize;

use crate::compositor::{compose, compose_owned};
use crate::encode::FrameEncoder;
use crate::redact::Redaction;
use crate::video::{
    partial_path, probe_video, FfmpegReader, FfmpegWriter, FrameSink, FrameSource,
};

/// Progress of a single image through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStage {
    Loaded,
    Detected,
    Composited,
    Serialized,
}

/// Progress of a video stream through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoStage {
    Opened,
    Streaming(u64),
    Closed,
}

impl fmt::Display for ImageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loaded => "loaded",
            Self::Detected => "detected",
            Self::Composited => "composited",
            Self::Serialized => "serialized",
        };
        f.write_str(name)
    }
}

impl fmt::Display for VideoStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opened => f.write_str("opened"),
            Self::Streaming(frame) => write!(f, "streaming({frame})"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

/// Clipped, non-degenerate detections for one frame, grouped by class.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameDetections {
    pub faces: Vec<Detection>,
    pub plates: Vec<Detection>,
}

impl FrameDetections {
    pub fn len(&self) -> usize {
        self.faces.len() + self.plates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Faces then plates.
    pub fn all(&self) -> Vec<Detection> {
        self.faces.iter().chain(&self.plates).cloned().collect()
    }
}

/// Totals for one processed video.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VideoSummary {
    pub frames: u64,
    /// Regions redacted across all frames.
    pub detections: u64,
    pub fps: f64,
}

/// Everything a run needs, constructed once and passed explicitly.
pub struct PipelineContext {
    detectors: Vec<Box<dyn Detector>>,
    redaction: Redaction,
    encoder: FrameEncoder,
    video: VideoConfig,
}

impl PipelineContext {
    pub fn new(
        detectors: Vec<Box<dyn Detector>>,
        redaction: Redaction,
        encoder: FrameEncoder,
        video: VideoConfig,
    ) -> Self {
        Self {
            detectors,
            redaction,
            encoder,
            video,
        }
    }

    /// Load every configured detector. Detectors that fail to load stay in
    /// the context as unavailable.
    pub fn from_config(config: &AppConfig, detectors: &[DetectorConfig]) -> Self {
        let detectors = detectors
            .iter()
            .map(|c| Box::new(DetectorAdapter::load(c)) as Box<dyn Detector>)
            .collect();
        Self::new(
            detectors,
            Redaction::from_config(&config.redaction),
            FrameEncoder::from_config(&config.encoding),
            config.video.clone(),
        )
    }

    pub fn detectors(&self) -> &[Box<dyn Detector>] {
        &self.detectors
    }

    pub fn redaction(&self) -> &Redaction {
        &self.redaction
    }

    pub fn encoder(&self) -> &FrameEncoder {
        &self.encoder
    }

    /// Run every detector on the unmodified frame, clip, and group by class.
    pub fn detect(&mut self, frame: &Frame) -> FrameDetections {
        let (width, height) = frame.dimensions();
        let mut found = FrameDetections::default();

        for detector in &mut self.detectors {
            let raw = detector.detect(frame);
            let clipped = clip_all(&raw, width, height);
            if clipped.len() < raw.len() {
                tracing::debug!(
                    class = %detector.class(),
                    dropped = raw.len() - clipped.len(),
                    "Dropped degenerate regions"
                );
            }
            match detector.class() {
                LabelClass::Face => found.faces.extend(clipped),
                LabelClass::Plate => found.plates.extend(clipped),
            }
        }

        found
    }

    /// Image pipeline on an in-memory frame: both canonical variants, encoded.
    pub fn process_frame(&mut self, frame: &Frame, source: &str) -> MosaicResult<ProcessingResult> {
        let found = self.detect(frame);
        trace_image_stage(source, ImageStage::Detected);
        tracing::info!(
            source,
            faces = found.faces.len(),
            plates = found.plates.len(),
            "Detection complete"
        );

        let variants = compose(
            frame,
            &canonical_requests(&found.faces, &found.plates),
            &self.redaction,
        );
        trace_image_stage(source, ImageStage::Composited);

        let encoded = variants
            .iter()
            .map(|v| {
                Ok(EncodedVariant {
                    name: v.name().to_string(),
                    payload: self.encoder.encode_transport(v.frame())?,
                })
            })
            .collect::<MosaicResult<Vec<_>>>()?;
        trace_image_stage(source, ImageStage::Serialized);

        Ok(ProcessingResult {
            source: source.to_string(),
            variants: encoded,
            faces: found.faces,
            plates: found.plates,
        })
    }

    /// Load an image from disk and run the image pipeline on it.
    pub fn process_image(&mut self, path: &Path) -> MosaicResult<ProcessingResult> {
        let frame = load_frame(path)?;
        let source = path.display().to_string();
        trace_image_stage(&source, ImageStage::Loaded);
        self.process_frame(&frame, &source)
    }

    /// One result per input, in order. A failing input does not stop the rest.
    pub fn process_images(&mut self, paths: &[PathBuf]) -> Vec<MosaicResult<ProcessingResult>> {
        paths
            .iter()
            .map(|path| {
                let result = self.process_image(path);
                if let Err(e) = &result {
                    tracing::warn!(path = %path.display(), error = %e, "Image failed");
                }
                result
            })
            .collect()
    }

    /// Redact every detection into a single image file.
    ///
    /// The format follows the output extension. Nothing is left at `output`
    /// unless the whole write succeeds.
    pub fn redact_image_file(
        &mut self,
        input: &Path,
        output: &Path,
    ) -> MosaicResult<RedactionVariant> {
        let format = ImageFormat::from_path(output).map_err(|e| {
            MosaicError::unsupported(format!("Output format for {}: {e}", output.display()))
        })?;

        let frame = load_frame(input)?;
        let source = input.display().to_string();
        trace_image_stage(&source, ImageStage::Loaded);

        let found = self.detect(&frame);
        trace_image_stage(&source, ImageStage::Detected);

        let variant = compose_owned(
            frame,
            VariantRequest::new(VARIANT_ALL, found.all()),
            &self.redaction,
        );
        trace_image_stage(&source, ImageStage::Composited);

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let partial = partial_path(output);
        let committed = self
            .write_image(variant.frame(), &partial, format)
            .and_then(|()| std::fs::rename(&partial, output).map_err(MosaicError::from));
        if let Err(e) = committed {
            let _ = std::fs::remove_file(&partial);
            return Err(e);
        }
        trace_image_stage(&source, ImageStage::Serialized);

        tracing::info!(
            input = %input.display(),
            output = %output.display(),
            regions = variant.detections_applied().len(),
            "Image redacted"
        );
        Ok(variant)
    }

    fn write_image(&self, frame: &Frame, path: &Path, format: ImageFormat) -> MosaicResult<()> {
        if format == ImageFormat::Jpeg {
            let mut out = BufWriter::new(File::create(path)?);
            frame
                .write_with_encoder(JpegEncoder::new_with_quality(
                    &mut out,
                    self.encoder.jpeg_quality(),
                ))
                .map_err(|e| MosaicError::encoding(e.to_string()))?;
            out.flush()?;
            return Ok(());
        }
        frame
            .save_with_format(path, format)
            .map_err(|e| MosaicError::encoding(e.to_string()))
    }

    /// Transport-independent video loop.
    ///
    /// Frames are written in read order, each with every detection redacted.
    /// End of stream finishes the sink; any error stops the loop without
    /// finishing it.
    pub fn run_video(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
    ) -> MosaicResult<VideoSummary> {
        let expected = source.dimensions();
        let mut summary = VideoSummary {
            fps: source.fps(),
            ..VideoSummary::default()
        };
        trace_video_stage(VideoStage::Opened);

        while let Some(frame) = source.next_frame()? {
            if frame.dimensions() != expected {
                return Err(MosaicError::video(format!(
                    "Frame {} is {}x{}, stream is {}x{}",
                    summary.frames,
                    frame.width(),
                    frame.height(),
                    expected.0,
                    expected.1
                )));
            }

            let found = self.detect(&frame);
            let variant = compose_owned(
                frame,
                VariantRequest::new(VARIANT_ALL, found.all()),
                &self.redaction,
            );
            sink.write_frame(variant.frame())?;

            summary.detections += variant.detections_applied().len() as u64;
            summary.frames += 1;
            if summary.frames % 100 == 0 {
                trace_video_stage(VideoStage::Streaming(summary.frames));
            }
        }

        sink.finish()?;
        trace_video_stage(VideoStage::Closed);
        Ok(summary)
    }

    /// Redact a video file into another with the same geometry and rate.
    pub fn redact_video_file(
        &mut self,
        input: &Path,
        output: &Path,
    ) -> MosaicResult<VideoSummary> {
        let info = probe_video(input, &self.video)?;
        let mut reader = FfmpegReader::open(input, info.clone(), &self.video)?;
        let mut writer =
            FfmpegWriter::create(output, info.width, info.height, info.fps, &self.video)?;

        let summary = self.run_video(&mut reader, &mut writer)?;
        tracing::info!(
            input = %input.display(),
            output = %output.display(),
            frames = summary.frames,
            detections = summary.detections,
            fps = summary.fps,
            "Video redacted"
        );
        Ok(summary)
    }
}

/// Decode an image file into an RGB frame.
pub fn load_frame(path: &Path) -> MosaicResult<Frame> {
    if !path.is_file() {
        return Err(MosaicError::source_unreadable(path, "file not found"));
    }
    let image =
        image::open(path).map_err(|e| MosaicError::source_unreadable(path, e.to_string()))?;
    Ok(image.to_rgb8())
}

fn trace_image_stage(source: &str, stage: ImageStage) {
    tracing::debug!(source, stage = %stage, "Image stage");
}

fn trace_video_stage(stage: VideoStage) {
    tracing::debug!(stage = %stage, "Video stage");
}
