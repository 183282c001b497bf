//! PDF first-page thumbnails via poppler's `pdftoppm`.

use std::path::{Path, PathBuf};
use std::process::Command;

use image::imageops;
use image::{DynamicImage, Rgba, RgbaImage};

use super::canvas::fit_to_square;
use super::tool::{run_capture, TOOL_TIMEOUT};
use super::{CapabilitySet, FileCategory, GenerationError, Generator};

/// Rasterizes page one at twice the target size, then downscales.
#[derive(Debug, Clone)]
pub struct PdfGenerator {
    pdftoppm: Option<PathBuf>,
}

impl PdfGenerator {
    /// Generator using the `pdftoppm` found in `caps`.
    #[must_use]
    pub fn new(caps: &CapabilitySet) -> Self {
        Self {
            pdftoppm: caps.pdftoppm.clone(),
        }
    }
}

impl Generator for PdfGenerator {
    fn category(&self) -> FileCategory {
        FileCategory::Pdf
    }

    fn generate(&self, path: &Path, size: u32) -> Result<RgbaImage, GenerationError> {
        let pdftoppm = self
            .pdftoppm
            .as_deref()
            .ok_or(GenerationError::ToolMissing("pdftoppm"))?;

        let scale = size.saturating_mul(2).max(1);
        let mut cmd = Command::new(pdftoppm);
        cmd.args(["-f", "1", "-l", "1", "-png", "-scale-to"])
            .arg(scale.to_string())
            .arg(path);
        let png = run_capture(&mut cmd, path, TOOL_TIMEOUT)?;
        if png.is_empty() {
            return Err(GenerationError::failed(path, "pdftoppm produced no page"));
        }

        let page = image::load_from_memory(&png).map_err(|source| GenerationError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(fit_to_square(&on_white(page), size))
    }
}

/// Flatten any transparency in the rendered page onto white paper.
fn on_white(page: DynamicImage) -> DynamicImage {
    let page = page.into_rgba8();
    let mut paper = RgbaImage::from_pixel(page.width(), page.height(), Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut paper, &page, 0, 0);
    DynamicImage::ImageRgba8(paper)
}
