//! Video thumbnails via `ffprobe` + `ffmpeg`.
//!
//! The frame is taken at 10% of the duration (at least one second in) to skip
//! black lead-in frames.

use std::path::{Path, PathBuf};
use std::process::Command;

use image::RgbaImage;

use super::canvas::fit_to_square;
use super::tool::{run_capture, TOOL_TIMEOUT};
use super::{CapabilitySet, FileCategory, GenerationError, Generator};

/// Extracts one frame with the external `ffmpeg` tools.
#[derive(Debug, Clone)]
pub struct VideoGenerator {
    ffprobe: Option<PathBuf>,
    ffmpeg: Option<PathBuf>,
}

impl VideoGenerator {
    /// Generator using the tools found in `caps`.
    #[must_use]
    pub fn new(caps: &CapabilitySet) -> Self {
        Self {
            ffprobe: caps.ffprobe.clone(),
            ffmpeg: caps.ffmpeg.clone(),
        }
    }

    fn probe_duration(&self, ffprobe: &Path, path: &Path) -> Result<f64, GenerationError> {
        let mut cmd = Command::new(ffprobe);
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path);
        let out = run_capture(&mut cmd, path, TOOL_TIMEOUT)?;
        parse_duration(&String::from_utf8_lossy(&out))
            .ok_or_else(|| GenerationError::failed(path, "container reports no duration"))
    }
}

impl Generator for VideoGenerator {
    fn category(&self) -> FileCategory {
        FileCategory::Video
    }

    fn generate(&self, path: &Path, size: u32) -> Result<RgbaImage, GenerationError> {
        let ffprobe = self
            .ffprobe
            .as_deref()
            .ok_or(GenerationError::ToolMissing("ffprobe"))?;
        let ffmpeg = self
            .ffmpeg
            .as_deref()
            .ok_or(GenerationError::ToolMissing("ffmpeg"))?;

        let duration = self.probe_duration(ffprobe, path)?;
        let position = seek_position(duration);
        log::trace!(
            "Seeking {} to {:.2}s of {:.2}s",
            path.display(),
            position,
            duration
        );

        let mut cmd = Command::new(ffmpeg);
        cmd.args(["-v", "error", "-ss"])
            .arg(format!("{position:.3}"))
            .arg("-i")
            .arg(path)
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"]);
        let png = run_capture(&mut cmd, path, TOOL_TIMEOUT)?;
        if png.is_empty() {
            return Err(GenerationError::failed(path, "ffmpeg produced no frame"));
        }

        let frame = image::load_from_memory(&png).map_err(|source| GenerationError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(fit_to_square(&frame, size))
    }
}

/// Parse `ffprobe`'s duration output (seconds). Rejects non-positive values.
fn parse_duration(output: &str) -> Option<f64> {
    output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|l| l.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}

/// Where to grab the frame: 10% in, at least 1s, but never past the end.
/// Clips shorter than the one-second minimum use their midpoint.
#[must_use]
pub fn seek_position(duration: f64) -> f64 {
    let position = (duration * 0.10).max(1.0);
    if position >= duration {
        duration / 2.0
    } else {
        position
    }
}
