//! Android package icons.
//!
//! The APK is opened as a ZIP archive. The icon named by the manifest's
//! `<application android:icon>` is resolved through `resources.arsc` and
//! used when it decodes, densest bitmap or adaptive-icon definition first.
//! Otherwise launcher-icon bitmaps under `res/` are ranked by density
//! qualifier, then by entry size. Adaptive icons (`*_foreground` +
//! `*_background` at the same density) are composited and cropped to the
//! visible safe zone. The icon is drawn at 75% over a rounded base tile; an
//! APK without usable icons gets the bare tile.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use image::imageops;
use image::{DynamicImage, Rgba, RgbaImage};
use zip::ZipArchive;

use super::android::{self, ResValue, ResourceTable};
use super::canvas::{fill_rounded_rect, fit_within, TRANSPARENT};
use super::{FileCategory, GenerationError, Generator};

const BASE_TILE: Rgba<u8> = Rgba([61, 220, 132, 255]);

/// Adaptive-icon layers are 108dp with a 72dp visible centre.
const ADAPTIVE_FULL: u32 = 108;
const ADAPTIVE_VISIBLE: u32 = 72;

/// Icon entries larger than this are ignored.
const MAX_ICON_BYTES: u64 = 8 * 1024 * 1024;

/// Manifest and resource table entries larger than this are ignored.
const MAX_RESOURCE_BYTES: u64 = 32 * 1024 * 1024;

/// Resource references followed before giving up on the manifest icon.
const MAX_REFERENCE_HOPS: usize = 4;

/// Extracts and composes the launcher icon of an APK.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApkGenerator;

impl Generator for ApkGenerator {
    fn category(&self) -> FileCategory {
        FileCategory::Apk
    }

    fn generate(&self, path: &Path, size: u32) -> Result<RgbaImage, GenerationError> {
        let file = File::open(path).map_err(|e| GenerationError::io(path, e))?;
        let mut archive = ZipArchive::new(file)
            .map_err(|e| GenerationError::failed(path, format!("not a valid APK: {e}")))?;

        let icon = manifest_icon(&mut archive).or_else(|| {
            let candidates = collect_candidates(&mut archive);
            log::trace!("{} icon candidates in {}", candidates.len(), path.display());
            pick_adaptive(&mut archive, &candidates)
                .or_else(|| pick_plain(&mut archive, &candidates))
        });
        Ok(compose_on_tile(icon.as_ref(), size))
    }
}

fn read_entry<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>, name: &str) -> Option<Vec<u8>> {
    let mut entry = archive.by_name(name).ok()?;
    if entry.size() > MAX_RESOURCE_BYTES {
        return None;
    }
    let mut bytes = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
    entry.read_to_end(&mut bytes).ok()?;
    Some(bytes)
}

/// The icon declared in `AndroidManifest.xml`, if it resolves to something
/// drawable.
fn manifest_icon<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>) -> Option<DynamicImage> {
    let manifest = read_entry(archive, "AndroidManifest.xml")?;
    let icon = match android::find_attribute(&manifest, "application", "icon", android::ATTR_ICON) {
        Ok(Some(icon)) => icon,
        Ok(None) => return None,
        Err(e) => {
            log::debug!("Unreadable AndroidManifest.xml: {}", e);
            return None;
        }
    };

    let table = match read_entry(archive, "resources.arsc").map(|bytes| ResourceTable::parse(&bytes)) {
        Some(Ok(table)) => table,
        Some(Err(e)) => {
            log::debug!("Unreadable resources.arsc: {}", e);
            ResourceTable::default()
        }
        None => ResourceTable::default(),
    };
    log::trace!("Manifest icon {:?}", icon);
    resolve_drawable(archive, &table, &icon, 0)
}

fn resolve_drawable<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    table: &ResourceTable,
    value: &ResValue,
    hops: usize,
) -> Option<DynamicImage> {
    if hops > MAX_REFERENCE_HOPS {
        return None;
    }
    match value {
        ResValue::Color(color) => Some(DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, *color))),
        ResValue::String(path) => drawable_file(archive, table, path, hops),
        ResValue::Reference(id) => table
            .lookup(*id)
            .into_iter()
            .find_map(|entry| resolve_drawable(archive, table, &entry.value, hops + 1)),
    }
}

/// Decode a drawable file: a bitmap, or an `<adaptive-icon>` definition.
fn drawable_file<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    table: &ResourceTable,
    path: &str,
    hops: usize,
) -> Option<DynamicImage> {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".png") || lower.ends_with(".webp") {
        return read_image(archive, path);
    }
    if !lower.ends_with(".xml") {
        return None;
    }

    let xml = read_entry(archive, path)?;
    let layer = |element: &str| {
        android::find_attribute(&xml, element, "drawable", android::ATTR_DRAWABLE)
            .ok()
            .flatten()
    };
    let (foreground, background) = (layer("foreground")?, layer("background"));

    let foreground = resolve_drawable(archive, table, &foreground, hops + 1)?;
    let background = background
        .and_then(|bg| resolve_drawable(archive, table, &bg, hops + 1))
        .unwrap_or_else(|| DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, TRANSPARENT)));
    Some(DynamicImage::ImageRgba8(compose_adaptive(&foreground, &background)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    Plain,
    Foreground,
    Background,
}

#[derive(Debug, Clone)]
struct IconCandidate {
    name: String,
    /// Directory holding the entry, e.g. `res/mipmap-xxhdpi-v4`.
    dir: String,
    /// File stem without the layer suffix.
    base: String,
    layer: Layer,
    density: u8,
    size: u64,
}

fn collect_candidates<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>) -> Vec<IconCandidate> {
    let mut out = Vec::new();
    for i in 0..archive.len() {
        let Ok(entry) = archive.by_index(i) else {
            continue;
        };
        if entry.is_dir() || entry.size() > MAX_ICON_BYTES {
            continue;
        }
        if let Some(candidate) = classify(entry.name(), entry.size()) {
            out.push(candidate);
        }
    }
    out
}

/// Turn a ZIP entry name into an icon candidate, if it looks like one.
fn classify(name: &str, size: u64) -> Option<IconCandidate> {
    let lower = name.to_ascii_lowercase();
    if !lower.starts_with("res/") {
        return None;
    }
    let (dir, file) = lower.rsplit_once('/')?;
    let (stem, ext) = file.rsplit_once('.')?;
    if !matches!(ext, "png" | "webp") {
        return None;
    }
    if !(stem.contains("ic_launcher") || stem.contains("icon") || stem.contains("app_icon")) {
        return None;
    }

    let (base, layer) = if let Some(base) = stem.strip_suffix("_foreground") {
        (base, Layer::Foreground)
    } else if let Some(base) = stem.strip_suffix("_background") {
        (base, Layer::Background)
    } else {
        (stem, Layer::Plain)
    };

    Some(IconCandidate {
        name: name.to_string(),
        dir: dir.to_string(),
        base: base.to_string(),
        layer,
        density: density_rank(dir),
        size,
    })
}

/// Higher is denser; unqualified directories rank lowest.
fn density_rank(dir: &str) -> u8 {
    const ORDER: [(&str, u8); 5] = [
        ("xxxhdpi", 5),
        ("xxhdpi", 4),
        ("xhdpi", 3),
        ("hdpi", 2),
        ("mdpi", 1),
    ];
    ORDER
        .iter()
        .find(|(qualifier, _)| dir.contains(qualifier))
        .map_or(0, |(_, rank)| *rank)
}

fn read_image<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Option<DynamicImage> {
    let mut entry = archive.by_name(name).ok()?;
    let mut bytes = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
    entry.read_to_end(&mut bytes).ok()?;
    match image::load_from_memory(&bytes) {
        Ok(img) => Some(img),
        Err(e) => {
            log::debug!("Skipping undecodable icon {}: {}", name, e);
            None
        }
    }
}

/// Composite the best adaptive pair, if one exists at the top density.
fn pick_adaptive<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    candidates: &[IconCandidate],
) -> Option<DynamicImage> {
    let best_density = candidates.iter().map(|c| c.density).max()?;

    let mut foregrounds: Vec<&IconCandidate> = candidates
        .iter()
        .filter(|c| c.layer == Layer::Foreground && c.density == best_density)
        .collect();
    foregrounds.sort_by(|a, b| b.size.cmp(&a.size));

    for fg in foregrounds {
        let Some(bg) = candidates.iter().find(|c| {
            c.layer == Layer::Background && c.dir == fg.dir && c.base == fg.base
        }) else {
            continue;
        };
        let (Some(fg_img), Some(bg_img)) =
            (read_image(archive, &fg.name), read_image(archive, &bg.name))
        else {
            continue;
        };
        return Some(DynamicImage::ImageRgba8(compose_adaptive(&fg_img, &bg_img)));
    }
    None
}

/// Best single bitmap: plain icons first, then lone foreground layers.
fn pick_plain<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    candidates: &[IconCandidate],
) -> Option<DynamicImage> {
    let mut ranked: Vec<&IconCandidate> = candidates
        .iter()
        .filter(|c| c.layer != Layer::Background)
        .collect();
    ranked.sort_by(|a, b| {
        (b.layer == Layer::Plain, b.density, b.size).cmp(&(a.layer == Layer::Plain, a.density, a.size))
    });
    ranked.into_iter().find_map(|c| read_image(archive, &c.name))
}

/// Stack foreground over background and crop the visible centre.
fn compose_adaptive(foreground: &DynamicImage, background: &DynamicImage) -> RgbaImage {
    let side = foreground
        .width()
        .max(foreground.height())
        .max(background.width())
        .max(background.height())
        .max(1);
    let mut layered = background
        .resize_exact(side, side, imageops::FilterType::Lanczos3)
        .into_rgba8();
    let fg = foreground
        .resize_exact(side, side, imageops::FilterType::Lanczos3)
        .into_rgba8();
    imageops::overlay(&mut layered, &fg, 0, 0);

    let visible = (side * ADAPTIVE_VISIBLE / ADAPTIVE_FULL).max(1);
    let offset = (side - visible) / 2;
    imageops::crop_imm(&layered, offset, offset, visible, visible).to_image()
}

/// Draw the rounded base tile and put `icon` on it at 75% of the tile.
fn compose_on_tile(icon: Option<&DynamicImage>, size: u32) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(size, size, TRANSPARENT);
    let s = i64::from(size);
    let margin = (s / 25).max(0);
    fill_rounded_rect(&mut canvas, margin, margin, s - margin, s - margin, s / 5, BASE_TILE);

    if let Some(icon) = icon {
        let inner = (size * 3 / 4).max(1);
        let placed = fit_within(icon, inner, size);
        imageops::overlay(&mut canvas, &placed, 0, 0);
    }
    canvas
}
