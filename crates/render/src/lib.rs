//! Mosaic Render
//!
//! Turns detections into redacted output:
//!
//! ```text
//! frame ──► detectors (one per class) ──► clip ──┐
//!                                                ├── compositor: one clone per variant
//!                                                │        │
//!                                                │        ├── redact (solid fill | pixelate)
//!                                                │        ▼
//!                                   image ◄──────┴── encode (JPEG/PNG ─► base64) + metadata
//!                                   video ◄───────── ffmpeg rawvideo writer, same W/H/fps
//! ```

pub mod compositor;
pub mod encode;
pub mod pipeline;
pub mod redact;
pub mod video;

pub use compositor::*;
pub use encode::FrameEncoder;
pub use pipeline::*;
pub use redact::Redaction;
pub use video::{FfmpegReader, FfmpegWriter, FrameSink, FrameSource, VideoInfo};
