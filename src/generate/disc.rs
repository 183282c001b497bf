//! Disc image (ISO) thumbnails.
//!
//! With `7z` available the image is listed and searched for cover art, then
//! for the icon referenced by `autorun.inf`. Anything else, including a
//! missing `7z` or an unreadable image, falls back to a drawn disc labelled
//! with the file name, so this generator does not fail on content.

use std::path::{Path, PathBuf};
use std::process::Command;

use image::{DynamicImage, Rgba, RgbaImage};

use super::canvas::{clear_circle, fill_circle, fit_to_square, TextPainter, TRANSPARENT};
use super::tool::{run_capture, TOOL_TIMEOUT};
use super::{CapabilitySet, FileCategory, GenerationError, Generator};

const COVER_STEMS: [&str; 3] = ["cover", "folder", "front"];
const COVER_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];
const ICON_EXTENSIONS: [&str; 3] = ["ico", "png", "bmp"];

const DISC_FACE: Rgba<u8> = Rgba([206, 210, 220, 255]);
const DISC_SHEEN: Rgba<u8> = Rgba([232, 236, 244, 255]);
const DISC_HUB: Rgba<u8> = Rgba([150, 155, 168, 255]);
const LABEL: Rgba<u8> = Rgba([50, 54, 66, 255]);

/// Cover art, autorun icon, or a generic disc.
#[derive(Clone)]
pub struct DiscGenerator {
    seven_zip: Option<PathBuf>,
    painter: TextPainter,
}

/// One file or folder inside a disc image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscEntry {
    /// Path inside the image as `7z` reports it.
    pub path: String,
    /// Whether the entry is a folder.
    pub is_dir: bool,
}

impl DiscEntry {
    fn file_name(&self) -> &str {
        self.path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.path.as_str())
    }

    fn depth(&self) -> usize {
        self.path.matches(['/', '\\']).count()
    }
}

impl DiscGenerator {
    /// Generator using the `7z` binary and font found in `caps`.
    #[must_use]
    pub fn new(caps: &CapabilitySet) -> Self {
        Self {
            seven_zip: caps.seven_zip.clone(),
            painter: TextPainter::new(caps.font.clone()),
        }
    }

    fn embedded_art(
        &self,
        seven_zip: &Path,
        path: &Path,
    ) -> Result<Option<RgbaImage>, GenerationError> {
        let mut cmd = Command::new(seven_zip);
        cmd.args(["l", "-slt"]).arg(path);
        let listing = run_capture(&mut cmd, path, TOOL_TIMEOUT)?;
        let entries = parse_listing(&String::from_utf8_lossy(&listing));
        log::trace!("{} entries in {}", entries.len(), path.display());

        for cover in cover_candidates(&entries) {
            if let Some(img) = self.extract_image(seven_zip, path, &cover.path) {
                log::debug!("Using cover {} from {}", cover.path, path.display());
                return Ok(Some(img));
            }
        }

        let Some(autorun) = entries
            .iter()
            .filter(|e| !e.is_dir && e.file_name().eq_ignore_ascii_case("autorun.inf"))
            .min_by_key(|e| e.depth())
        else {
            return Ok(None);
        };
        let mut cmd = Command::new(seven_zip);
        cmd.args(["e", "-so"]).arg(path).arg(&autorun.path);
        let inf = run_capture(&mut cmd, path, TOOL_TIMEOUT)?;
        let Some(icon) = parse_autorun_icon(&String::from_utf8_lossy(&inf)) else {
            return Ok(None);
        };
        if !has_extension(&icon, &ICON_EXTENSIONS) {
            log::debug!("autorun icon {} is not a decodable image", icon);
            return Ok(None);
        }

        let parent = autorun
            .path
            .rfind(['/', '\\'])
            .map_or("", |i| &autorun.path[..i]);
        for variant in icon_name_variants(parent, &icon) {
            if !entries.iter().any(|e| !e.is_dir && e.path == variant) {
                continue;
            }
            if let Some(img) = self.extract_image(seven_zip, path, &variant) {
                return Ok(Some(img));
            }
        }
        Ok(None)
    }

    fn extract_image(&self, seven_zip: &Path, path: &Path, entry: &str) -> Option<RgbaImage> {
        let mut cmd = Command::new(seven_zip);
        cmd.args(["e", "-so"]).arg(path).arg(entry);
        let bytes = run_capture(&mut cmd, path, TOOL_TIMEOUT).ok()?;
        image::load_from_memory(&bytes).ok().map(|img| img.into_rgba8())
    }

    /// Concentric rings with a transparent spindle hole and `label` below
    /// the hub.
    fn generic_disc(&self, label: &str, size: u32) -> RgbaImage {
        let mut canvas = RgbaImage::from_pixel(size, size, TRANSPARENT);
        let c = size as f32 / 2.0;
        let r = size as f32 * 0.46;

        fill_circle(&mut canvas, c, c, r, 0.0, DISC_FACE);
        fill_circle(&mut canvas, c, c, r * 0.82, r * 0.70, DISC_SHEEN);
        fill_circle(&mut canvas, c, c, r * 0.30, 0.0, DISC_HUB);
        clear_circle(&mut canvas, c, c, r * 0.12);

        let px = (size as f32 * 0.11).max(4.0);
        let width = r * 1.3;
        let text = self.painter.truncate_to_width(label, px, width);
        self.painter.draw_centered(
            &mut canvas,
            &text,
            c - width / 2.0,
            c + width / 2.0,
            c + r * 0.38,
            px,
            LABEL,
        );
        canvas
    }
}

impl Generator for DiscGenerator {
    fn category(&self) -> FileCategory {
        FileCategory::Disc
    }

    fn generate(&self, path: &Path, size: u32) -> Result<RgbaImage, GenerationError> {
        if let Some(seven_zip) = self.seven_zip.as_deref() {
            match self.embedded_art(seven_zip, path) {
                Ok(Some(art)) => return Ok(fit_to_square(&DynamicImage::ImageRgba8(art), size)),
                Ok(None) => {}
                Err(e) => log::debug!("Falling back to generic disc for {}: {}", path.display(), e),
            }
        }

        let label = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(self.generic_disc(&label, size))
    }
}

/// Parse `7z l -slt` output. Entry blocks follow the `----------` line and
/// are separated by blank lines.
#[must_use]
pub fn parse_listing(output: &str) -> Vec<DiscEntry> {
    let mut entries = Vec::new();
    let Some((_, body)) = output.split_once("\n----------") else {
        return entries;
    };

    let mut path: Option<String> = None;
    let mut is_dir = false;
    let mut flush = |path: &mut Option<String>, is_dir: &mut bool| {
        if let Some(p) = path.take() {
            entries.push(DiscEntry {
                path: p,
                is_dir: *is_dir,
            });
        }
        *is_dir = false;
    };

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            flush(&mut path, &mut is_dir);
            continue;
        }
        if let Some(value) = line.strip_prefix("Path = ") {
            flush(&mut path, &mut is_dir);
            path = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("Folder = ") {
            is_dir = value.trim() == "+";
        } else if let Some(value) = line.strip_prefix("Attributes = ") {
            is_dir |= value.starts_with('D');
        }
    }
    flush(&mut path, &mut is_dir);
    entries
}

/// Cover-art entries, shallowest first.
fn cover_candidates(entries: &[DiscEntry]) -> Vec<&DiscEntry> {
    let mut covers: Vec<&DiscEntry> = entries
        .iter()
        .filter(|e| !e.is_dir)
        .filter(|e| {
            let name = e.file_name().to_ascii_lowercase();
            name.rsplit_once('.').is_some_and(|(stem, ext)| {
                COVER_STEMS.contains(&stem) && COVER_EXTENSIONS.contains(&ext)
            })
        })
        .collect();
    covers.sort_by(|a, b| a.depth().cmp(&b.depth()).then_with(|| a.path.cmp(&b.path)));
    covers
}

/// The `icon=` value from an `autorun.inf`, without icon index or quotes.
#[must_use]
pub fn parse_autorun_icon(inf: &str) -> Option<String> {
    inf.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("icon") {
            return None;
        }
        let value = value.split(',').next().unwrap_or("").trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

fn has_extension(name: &str, allowed: &[&str]) -> bool {
    name.rsplit_once('.').is_some_and(|(_, ext)| {
        let ext = ext.trim_end_matches(";1").to_ascii_lowercase();
        allowed.contains(&ext.as_str())
    })
}

/// Spellings of `icon` (relative to `parent`) to look for in the listing.
///
/// Disc filesystems disagree on case, the ISO9660 `;1` version suffix and
/// the path separator, so every combination is tried, as-is spelling first.
#[must_use]
pub fn icon_name_variants(parent: &str, icon: &str) -> Vec<String> {
    let icon = icon.trim_start_matches(['/', '\\']).replace('\\', "/");
    let joined = if parent.is_empty() {
        icon
    } else {
        format!("{}/{}", parent.replace('\\', "/"), icon)
    };
    let bare = joined.strip_suffix(";1").unwrap_or(&joined).to_string();

    let mut variants = Vec::new();
    for cased in [bare.clone(), bare.to_ascii_uppercase(), bare.to_ascii_lowercase()] {
        for versioned in [cased.clone(), format!("{cased};1")] {
            for separated in [versioned.clone(), versioned.replace('/', "\\")] {
                if !variants.contains(&separated) {
                    variants.push(separated);
                }
            }
        }
    }
    variants
}
