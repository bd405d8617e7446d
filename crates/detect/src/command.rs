//! External-process model backend.
//!
//! The model is an executable that reads one PNG on stdin and prints a JSON
//! array of [`NativeBox`] on stdout. Structured mode passes
//! `--imgsz <N> --conf <C>`; cascade mode passes `--cascade` and expects
//! image-space boxes for the full-resolution grayscale frame.

use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use image::{GrayImage, RgbImage};
use mosaic_common::error::{MosaicError, MosaicResult};
use mosaic_model::PixelBox;

use crate::cascade::CascadeClassifier;
use crate::preprocess::encode_png;
use crate::structured::{NativeBox, StructuredModel};

/// A detector living in another process, invoked once per frame.
#[derive(Debug, Clone)]
pub struct CommandModel {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl CommandModel {
    /// Resolve the model executable.
    ///
    /// Fails when the path is not a file, or on unix when no execute bit is
    /// set, so a weights file passed where a runner is expected is rejected
    /// once here instead of on every frame.
    pub fn load(program: impl AsRef<Path>) -> MosaicResult<Self> {
        let program = program.as_ref();
        let label = program.display().to_string();
        let metadata = std::fs::metadata(program)
            .ok()
            .filter(|m| m.is_file())
            .ok_or_else(|| MosaicError::detector_unavailable(&label, "model file not found"))?;
        if !is_executable(&metadata) {
            return Err(MosaicError::detector_unavailable(
                &label,
                "model file is not executable; use a raw-tensor model or a runner script",
            ));
        }
        Ok(Self {
            program: program.to_path_buf(),
            extra_args: Vec::new(),
        })
    }

    /// Arguments placed before the per-call flags.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn invoke(&self, png: Vec<u8>, args: &[String]) -> MosaicResult<Vec<NativeBox>> {
        tracing::trace!(program = %self.program.display(), ?args, "Invoking model process");
        let mut child = Command::new(&self.program)
            .args(&self.extra_args)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                MosaicError::inference(format!(
                    "Failed to start {}: {e}",
                    self.program.display()
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| MosaicError::inference("Failed to capture model stdin"))?;

        // Feed stdin from a thread so a model that writes before reading
        // cannot deadlock against a full stdout pipe.
        let writer = std::thread::spawn(move || match stdin.write_all(&png) {
            Err(e) if e.kind() != ErrorKind::BrokenPipe => Err(e),
            _ => Ok(()),
        });

        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| MosaicError::inference("Failed to capture model stderr"))?;
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr_pipe);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read model stderr: {err}>"),
            }
        });

        let mut stdout = String::new();
        if let Some(mut out) = child.stdout.take() {
            out.read_to_string(&mut stdout)
                .map_err(|e| MosaicError::inference(format!("Failed reading model output: {e}")))?;
        }

        let status = child
            .wait()
            .map_err(|e| MosaicError::inference(format!("Failed to wait on model: {e}")))?;
        let stderr = stderr_task
            .join()
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());
        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(MosaicError::inference(format!("Failed writing model input: {e}")))
            }
            Err(_) => return Err(MosaicError::inference("Model input writer panicked")),
        }

        if !status.success() {
            return Err(MosaicError::inference(format!(
                "Model exited with {status}: {}",
                stderr.trim()
            )));
        }

        let boxes: Vec<NativeBox> = serde_json::from_str(stdout.trim()).map_err(|e| {
            MosaicError::inference(format!("Model output is not a box list: {e}"))
        })?;
        Ok(boxes)
    }
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    true
}

impl StructuredModel for CommandModel {
    fn predict(
        &mut self,
        input: &RgbImage,
        confidence_threshold: f32,
    ) -> MosaicResult<Vec<NativeBox>> {
        let args = [
            "--imgsz".to_string(),
            input.width().to_string(),
            "--conf".to_string(),
            confidence_threshold.to_string(),
        ];
        self.invoke(encode_png(input)?, &args)
    }
}

impl CascadeClassifier for CommandModel {
    fn detect_multi_scale(&mut self, gray: &GrayImage) -> MosaicResult<Vec<PixelBox>> {
        let boxes = self.invoke(encode_png(gray)?, &["--cascade".to_string()])?;
        Ok(boxes
            .into_iter()
            .map(|b| {
                let [x1, y1, x2, y2] = b.xyxy;
                PixelBox::from_corners_f32(x1, y1, x2, y2)
            })
            .collect())
    }
}
