//! One-time probe for optional external tools and fonts.

use std::fmt;
use std::path::{Path, PathBuf};

use ab_glyph::{FontArc, FontVec};

/// Monospace fonts looked up when no font is configured.
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/TTF/DejaVuSansMono.ttf",
    "/usr/share/fonts/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/dejavu-sans-mono-fonts/DejaVuSansMono.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationMono-Regular.ttf",
    "/usr/share/fonts/liberation-mono/LiberationMono-Regular.ttf",
    "/usr/share/fonts/truetype/noto/NotoSansMono-Regular.ttf",
    "/System/Library/Fonts/Menlo.ttc",
    "/System/Library/Fonts/Monaco.ttf",
    "C:\\Windows\\Fonts\\consola.ttf",
    "C:\\Windows\\Fonts\\cour.ttf",
];

/// What the host can do, discovered once at startup.
///
/// Generators consult this instead of spawning a tool and handling the
/// failure on every call.
#[derive(Clone, Default)]
pub struct CapabilitySet {
    /// `ffmpeg` binary (video frame extraction).
    pub ffmpeg: Option<PathBuf>,
    /// `ffprobe` binary (video duration).
    pub ffprobe: Option<PathBuf>,
    /// `pdftoppm` binary (PDF rasterization).
    pub pdftoppm: Option<PathBuf>,
    /// `7z` binary (ISO listing and extraction).
    pub seven_zip: Option<PathBuf>,
    /// Font for text rendering.
    pub font: Option<FontArc>,
    /// Where the font was loaded from.
    pub font_path: Option<PathBuf>,
}

impl CapabilitySet {
    /// Nothing available. Generators fall back to what needs no tools.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Probe `PATH` for external tools and locate a monospace font.
    ///
    /// `font_path` takes precedence over the built-in candidate list. Each
    /// missing capability is logged once, here.
    #[must_use]
    pub fn probe(font_path: Option<&Path>) -> Self {
        let caps = Self {
            ffmpeg: find_tool(&["ffmpeg"]),
            ffprobe: find_tool(&["ffprobe"]),
            pdftoppm: find_tool(&["pdftoppm"]),
            seven_zip: find_tool(&["7z", "7zz", "7za"]),
            ..Self::default()
        };
        let caps = match load_font(font_path) {
            Some((path, font)) => Self {
                font: Some(font),
                font_path: Some(path),
                ..caps
            },
            None => caps,
        };

        if !caps.video_available() {
            log::info!("ffmpeg/ffprobe not found; video thumbnails disabled");
        }
        if caps.pdftoppm.is_none() {
            log::info!("pdftoppm not found; PDF thumbnails disabled");
        }
        if caps.seven_zip.is_none() {
            log::info!("7z not found; disc images get a generic icon");
        }
        if caps.font.is_none() {
            log::info!("No monospace font found; text thumbnails use block glyphs");
        }
        caps
    }

    /// Both `ffmpeg` and `ffprobe` are present.
    #[must_use]
    pub fn video_available(&self) -> bool {
        self.ffmpeg.is_some() && self.ffprobe.is_some()
    }

    /// Human-readable `(name, location)` rows for display.
    #[must_use]
    pub fn report(&self) -> Vec<(&'static str, Option<&Path>)> {
        vec![
            ("ffmpeg", self.ffmpeg.as_deref()),
            ("ffprobe", self.ffprobe.as_deref()),
            ("pdftoppm", self.pdftoppm.as_deref()),
            ("7z", self.seven_zip.as_deref()),
            ("font", self.font_path.as_deref()),
        ]
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilitySet")
            .field("ffmpeg", &self.ffmpeg)
            .field("ffprobe", &self.ffprobe)
            .field("pdftoppm", &self.pdftoppm)
            .field("seven_zip", &self.seven_zip)
            .field("font_path", &self.font_path)
            .finish()
    }
}

fn find_tool(names: &[&str]) -> Option<PathBuf> {
    names.iter().find_map(|name| which::which(name).ok())
}

fn load_font(configured: Option<&Path>) -> Option<(PathBuf, FontArc)> {
    let configured = configured.map(Path::to_path_buf);
    let candidates = configured
        .into_iter()
        .chain(FONT_CANDIDATES.iter().map(PathBuf::from));

    for path in candidates {
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        match FontVec::try_from_vec_and_index(bytes, 0) {
            Ok(font) => {
                log::debug!("Using font {}", path.display());
                return Some((path, FontArc::new(font)));
            }
            Err(e) => log::debug!("Skipping font {}: {}", path.display(), e),
        }
    }
    None
}
