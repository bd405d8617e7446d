//! End-to-end behavior of the image and video loops with stand-in detectors.

use std::path::Path;

use image::Rgb;
use mosaic_common::config::{EncodedFormat, VideoConfig};
use mosaic_common::error::{MosaicError, MosaicResult};
use mosaic_detect::Detector;
use mosaic_model::{Detection, Frame, LabelClass, PixelBox, VARIANT_ALL, VARIANT_FACES_ONLY};
use mosaic_render::video::{parse_probe_output, writer_args};
use mosaic_render::{FrameEncoder, FrameSink, FrameSource, PipelineContext, Redaction};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const SKY: Rgb<u8> = Rgb([40, 90, 200]);

struct FixedDetector {
    class: LabelClass,
    detections: Vec<Detection>,
}

impl Detector for FixedDetector {
    fn class(&self) -> LabelClass {
        self.class
    }

    fn is_available(&self) -> bool {
        true
    }

    fn detect(&mut self, _frame: &Frame) -> Vec<Detection> {
        self.detections.clone()
    }
}

fn detector(class: LabelClass, boxes: &[(i32, i32, i32, i32, f32)]) -> Box<dyn Detector> {
    Box::new(FixedDetector {
        class,
        detections: boxes
            .iter()
            .map(|&(x1, y1, x2, y2, c)| {
                Detection::new(class.as_str(), c, PixelBox::new(x1, y1, x2, y2))
            })
            .collect(),
    })
}

fn png_context(detectors: Vec<Box<dyn Detector>>, redaction: Redaction) -> PipelineContext {
    PipelineContext::new(
        detectors,
        redaction,
        FrameEncoder::new(EncodedFormat::Png, 95),
        VideoConfig::default(),
    )
}

fn decode(payload: Option<&str>) -> Frame {
    FrameEncoder::decode_frame(payload.expect("variant present")).unwrap()
}

#[test]
fn scenario_a_no_detections_leaves_image_untouched() {
    let source = Frame::from_pixel(640, 480, WHITE);
    let mut ctx = PipelineContext::new(
        Vec::new(),
        Redaction::default(),
        FrameEncoder::default(),
        VideoConfig::default(),
    );

    let result = ctx.process_frame(&source, "white.jpg").unwrap();
    assert!(result.faces.is_empty());
    assert!(result.plates.is_empty());

    let expected = FrameEncoder::default().encode_transport(&source).unwrap();
    assert_eq!(result.payload(VARIANT_ALL), Some(expected.as_str()));
    assert_eq!(result.payload(VARIANT_FACES_ONLY), Some(expected.as_str()));
}

#[test]
fn scenario_b_single_face_solid_fill() {
    let source = Frame::from_pixel(640, 480, SKY);
    let mut ctx = png_context(
        vec![detector(LabelClass::Face, &[(100, 100, 200, 200, 0.9)])],
        Redaction::default(),
    );

    let result = ctx.process_frame(&source, "face.png").unwrap();
    let all = decode(result.payload(VARIANT_ALL));
    for (x, y, pixel) in all.enumerate_pixels() {
        let inside = (100..200).contains(&x) && (100..200).contains(&y);
        assert_eq!(*pixel, if inside { WHITE } else { SKY }, "pixel ({x}, {y})");
    }

    let meta = serde_json::to_value(result.metadata()).unwrap();
    assert_eq!(meta["faces"].as_array().unwrap().len(), 1);
    assert_eq!(meta["faces"][0]["box"], serde_json::json!([100, 100, 200, 200]));
    assert_eq!(meta["faces"][0]["label"], "face");
    assert!((meta["faces"][0]["confidence"].as_f64().unwrap() - 0.9).abs() < 1e-6);
}

#[test]
fn scenario_c_out_of_frame_box_is_clipped() {
    let source = Frame::from_pixel(640, 480, SKY);
    let mut ctx = png_context(
        vec![detector(LabelClass::Face, &[(-10, -10, 50, 700, 0.8)])],
        Redaction::default(),
    );

    let result = ctx.process_frame(&source, "edge.png").unwrap();
    assert_eq!(result.faces[0].bbox(), PixelBox::new(0, 0, 50, 480));

    let all = decode(result.payload(VARIANT_ALL));
    assert_eq!(all.get_pixel(0, 479), &WHITE);
    assert_eq!(all.get_pixel(49, 0), &WHITE);
    assert_eq!(all.get_pixel(50, 0), &SKY);
}

#[test]
fn scenario_d_zero_fps_source_uses_fallback() {
    let config = VideoConfig::default();
    let info = parse_probe_output(
        r#"{"streams": [{
            "width": 64, "height": 48, "avg_frame_rate": "0/0", "r_frame_rate": "0/0"
        }]}"#,
        config.fallback_fps,
    )
    .unwrap();
    assert_eq!(info.fps, 25.0);

    // The encoder is configured with the probed geometry and the fallback rate.
    let args: Vec<String> = writer_args(
        Path::new("clip.partial.mp4"),
        info.width,
        info.height,
        info.fps,
        &config,
    )
    .iter()
    .map(|a| a.to_string_lossy().into_owned())
    .collect();
    assert!(args.windows(2).any(|w| w[0] == "-s" && w[1] == "64x48"));
    assert!(args.windows(2).any(|w| w[0] == "-r" && w[1] == "25"));

    let mut source = MemorySource::new(info.fps, vec![Frame::new(64, 48)]);
    let mut sink = MemorySink::default();
    let summary = png_context(Vec::new(), Redaction::default())
        .run_video(&mut source, &mut sink)
        .unwrap();
    assert_eq!(summary.fps, 25.0);
}

#[test]
fn scenario_e_overlapping_faces_all_recorded() {
    let source = Frame::from_pixel(320, 240, SKY);
    let boxes = [(50, 50, 150, 150, 0.9), (60, 60, 140, 140, 0.7)];

    for redaction in [Redaction::default(), Redaction::Pixelate { block_size: 15 }] {
        let mut ctx = png_context(vec![detector(LabelClass::Face, &boxes)], redaction);
        let result = ctx.process_frame(&source, "pair.png").unwrap();
        assert_eq!(result.faces.len(), 2);

        let all = decode(result.payload(VARIANT_ALL));
        if redaction == Redaction::default() {
            for y in 50..150 {
                for x in 50..150 {
                    assert_eq!(all.get_pixel(x, y), &WHITE);
                }
            }
        }
        assert_eq!(all.get_pixel(10, 10), &SKY);
    }
}

#[test]
fn variants_do_not_leak_into_each_other() {
    let source = Frame::from_pixel(200, 100, SKY);
    let mut ctx = png_context(
        vec![
            detector(LabelClass::Face, &[(10, 10, 40, 40, 0.9)]),
            detector(LabelClass::Plate, &[(120, 60, 180, 90, 0.6)]),
        ],
        Redaction::default(),
    );

    let result = ctx.process_frame(&source, "street.png").unwrap();
    assert_eq!(result.plates.len(), 1);

    let all = decode(result.payload(VARIANT_ALL));
    let faces_only = decode(result.payload(VARIANT_FACES_ONLY));
    assert_eq!(all.get_pixel(150, 75), &WHITE);
    assert_eq!(faces_only.get_pixel(150, 75), &SKY);
    assert_eq!(all.get_pixel(20, 20), &WHITE);
    assert_eq!(faces_only.get_pixel(20, 20), &WHITE);
}

#[test]
fn batch_continues_past_unreadable_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.png");
    Frame::from_pixel(32, 32, SKY).save(&good).unwrap();
    let corrupt = dir.path().join("corrupt.png");
    std::fs::write(&corrupt, b"not an image").unwrap();
    let missing = dir.path().join("missing.png");

    let mut ctx = png_context(Vec::new(), Redaction::default());
    let results = ctx.process_images(&[corrupt, good.clone(), missing]);

    assert_eq!(results.len(), 3);
    assert!(results[0].as_ref().unwrap_err().is_source_unreadable());
    assert_eq!(results[1].as_ref().unwrap().source, good.display().to_string());
    assert!(results[2].as_ref().unwrap_err().is_source_unreadable());
}

#[test]
fn exported_metadata_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.png");
    Frame::from_pixel(64, 64, SKY).save(&input).unwrap();

    let mut ctx = png_context(
        vec![detector(LabelClass::Plate, &[(5, 5, 30, 20, 0.55)])],
        Redaction::default(),
    );
    let result = ctx.process_image(&input).unwrap();
    let meta_path = dir.path().join("meta.json");
    result.export_metadata(&meta_path).unwrap();

    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&meta_path).unwrap()).unwrap();
    assert_eq!(doc["original"], input.display().to_string());
    assert_eq!(doc["plates"][0]["box"], serde_json::json!([5, 5, 30, 20]));
    assert_eq!(doc[VARIANT_ALL], result.payload(VARIANT_ALL).unwrap());
}

// Video loop with in-memory transport.

struct MemorySource {
    fps: f64,
    frames: std::vec::IntoIter<Frame>,
    fail_at: Option<usize>,
    served: usize,
    dims: (u32, u32),
}

impl MemorySource {
    fn new(fps: f64, frames: Vec<Frame>) -> Self {
        let dims = frames.first().map(|f| f.dimensions()).unwrap_or((0, 0));
        Self {
            fps,
            frames: frames.into_iter(),
            fail_at: None,
            served: 0,
            dims,
        }
    }
}

impl FrameSource for MemorySource {
    fn dimensions(&self) -> (u32, u32) {
        self.dims
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn next_frame(&mut self) -> MosaicResult<Option<Frame>> {
        if self.fail_at == Some(self.served) {
            return Err(MosaicError::video("Truncated frame"));
        }
        self.served += 1;
        Ok(self.frames.next())
    }
}

#[derive(Default)]
struct MemorySink {
    frames: Vec<Frame>,
    finished: bool,
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, frame: &Frame) -> MosaicResult<()> {
        assert!(!self.finished);
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> MosaicResult<()> {
        self.finished = true;
        Ok(())
    }
}

/// Frame `i` carries its index in the bottom-right pixel.
fn numbered_frames(count: u8) -> Vec<Frame> {
    (0..count)
        .map(|i| {
            let mut frame = Frame::from_pixel(64, 48, SKY);
            frame.put_pixel(63, 47, Rgb([i, i, i]));
            frame
        })
        .collect()
}

#[test]
fn video_frames_written_in_read_order_and_redacted() {
    let mut source = MemorySource::new(30.0, numbered_frames(5));
    let mut sink = MemorySink::default();
    let mut ctx = png_context(
        vec![detector(LabelClass::Face, &[(0, 0, 16, 16, 0.9)])],
        Redaction::default(),
    );

    let summary = ctx.run_video(&mut source, &mut sink).unwrap();
    assert_eq!(summary.frames, 5);
    assert_eq!(summary.detections, 5);
    assert_eq!(summary.fps, 30.0);
    assert!(sink.finished);

    for (i, frame) in sink.frames.iter().enumerate() {
        assert_eq!(frame.get_pixel(63, 47), &Rgb([i as u8; 3]));
        assert_eq!(frame.get_pixel(8, 8), &WHITE);
        assert_eq!(frame.get_pixel(30, 30), &SKY);
    }
}

#[test]
fn video_read_failure_stops_stream_without_finishing() {
    let mut source = MemorySource::new(25.0, numbered_frames(5));
    source.fail_at = Some(2);
    let mut sink = MemorySink::default();

    let err = png_context(Vec::new(), Redaction::default())
        .run_video(&mut source, &mut sink)
        .unwrap_err();
    assert!(matches!(err, MosaicError::Video { .. }));
    assert_eq!(sink.frames.len(), 2);
    assert!(!sink.finished);
}

#[test]
fn empty_video_finishes_cleanly() {
    let mut source = MemorySource::new(25.0, Vec::new());
    let mut sink = MemorySink::default();
    let summary = png_context(Vec::new(), Redaction::default())
        .run_video(&mut source, &mut sink)
        .unwrap();
    assert_eq!(summary.frames, 0);
    assert!(sink.finished);
}

#[test]
fn missing_video_writes_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.mp4");
    let err = png_context(Vec::new(), Redaction::default())
        .redact_video_file(&dir.path().join("absent.mp4"), &output)
        .unwrap_err();

    assert!(err.is_source_unreadable());
    assert!(!output.exists());
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}
