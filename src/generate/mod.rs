//! Thumbnail generation pipeline.
//!
//! Produces a `size × size` RGBA thumbnail for a file, dispatching on its
//! extension through a [`GeneratorRegistry`]. One [`Generator`] exists per
//! [`FileCategory`]:
//!
//! - [`image`]: raster images, Lanczos downscale centred on a transparent square
//! - [`video`]: one frame at ~10% of the duration via `ffprobe`/`ffmpeg`
//! - [`audio`]: peak waveform from decoded PCM (`symphonia`, `hound`)
//! - [`text`]: the first lines of the file rendered on a page
//! - [`pdf`]: first page rasterized with `pdftoppm`
//! - [`apk`]: launcher icon (including adaptive icons) on a base tile
//! - [`disc`]: cover art, autorun icon or a drawn disc for ISO images
//!
//! External tools are located once by [`CapabilitySet::probe`]; a generator
//! whose tool is missing fails fast with [`GenerationError::ToolMissing`].
//!
//! # Example
//!
//! ```no_run
//! use rustthumb::generate::{CapabilitySet, GenerationPipeline};
//! use std::path::Path;
//!
//! let pipeline = GenerationPipeline::new(CapabilitySet::probe(None), 8);
//! match pipeline.generate(Path::new("holiday.jpg"), 128) {
//!     Ok(thumb) => assert_eq!(thumb.dimensions(), (128, 128)),
//!     Err(e) if e.is_unsupported() => {}
//!     Err(e) => eprintln!("thumbnail failed: {e}"),
//! }
//! ```

pub mod android;
pub mod apk;
pub mod audio;
pub mod canvas;
pub mod capability;
pub mod disc;
pub mod image;
pub mod pdf;
pub mod text;
pub mod tool;
pub mod video;

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ::image::RgbaImage;

pub use capability::CapabilitySet;

use crate::cache::store::PAYLOAD_EXTENSION;

/// Broad kind of file a generator handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileCategory {
    /// Raster images.
    Image,
    /// Video containers.
    Video,
    /// Audio files.
    Audio,
    /// Plain text and source files.
    Text,
    /// PDF documents.
    Pdf,
    /// Android packages.
    Apk,
    /// Optical disc images.
    Disc,
}

impl FileCategory {
    /// Every category, in registration order.
    pub const ALL: [FileCategory; 7] = [
        Self::Image,
        Self::Video,
        Self::Audio,
        Self::Text,
        Self::Pdf,
        Self::Apk,
        Self::Disc,
    ];

    /// Lower-case extensions handled by this category.
    #[must_use]
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Image => &[
                "jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp", "ico",
            ],
            Self::Video => &[
                "mp4", "m4v", "mkv", "avi", "mov", "webm", "wmv", "flv", "mpg", "mpeg", "3gp",
            ],
            Self::Audio => &["wav", "mp3", "flac", "ogg", "oga", "m4a", "aac"],
            Self::Text => &[
                "txt", "md", "log", "csv", "json", "xml", "yaml", "yml", "toml", "ini", "cfg",
                "conf", "rs", "py", "c", "h", "cpp", "hpp", "js", "html", "css", "sh",
            ],
            Self::Pdf => &["pdf"],
            Self::Apk => &["apk"],
            Self::Disc => &["iso"],
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Text => "text",
            Self::Pdf => "pdf",
            Self::Apk => "apk",
            Self::Disc => "disc",
        };
        f.write_str(name)
    }
}

/// Errors from thumbnail generation.
#[derive(thiserror::Error, Debug)]
pub enum GenerationError {
    /// No generator is registered for this file type.
    #[error("No thumbnail generator for {0}")]
    Unsupported(PathBuf),

    /// The file is itself a cache payload.
    #[error("Refusing to thumbnail cache artifact {0}")]
    CacheArtifact(PathBuf),

    /// A required external tool is not installed.
    #[error("External tool not available: {0}")]
    ToolMissing(&'static str),

    /// The generator ran but could not produce an image.
    #[error("Thumbnail generation failed for {path}: {reason}")]
    Failed {
        /// Source file
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// The source could not be decoded.
    #[error("Failed to decode {path}: {source}")]
    Decode {
        /// Source file
        path: PathBuf,
        /// The underlying decoder error
        #[source]
        source: ::image::ImageError,
    },

    /// An I/O error while reading the source.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Source file
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl GenerationError {
    /// Convenience constructor for [`GenerationError::Failed`].
    pub fn failed(path: &Path, reason: impl Into<String>) -> Self {
        Self::Failed {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`GenerationError::Io`].
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether this means "no thumbnail available" rather than a failure.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::Unsupported(_) | Self::CacheArtifact(_) | Self::ToolMissing(_)
        )
    }
}

/// A thumbnail strategy for one file category.
pub trait Generator: Send + Sync {
    /// Category this generator serves.
    fn category(&self) -> FileCategory;

    /// Produce a `size × size` thumbnail for `path`.
    fn generate(&self, path: &Path, size: u32) -> Result<RgbaImage, GenerationError>;
}

/// Extension → generator table.
#[derive(Clone, Default)]
pub struct GeneratorRegistry {
    by_extension: HashMap<String, Arc<dyn Generator>>,
}

impl GeneratorRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in generator wired to `caps`.
    #[must_use]
    pub fn with_defaults(caps: &CapabilitySet, text_lines: usize) -> Self {
        let mut registry = Self::new();
        registry.register_category(Arc::new(image::ImageGenerator));
        registry.register_category(Arc::new(video::VideoGenerator::new(caps)));
        registry.register_category(Arc::new(audio::AudioGenerator));
        registry.register_category(Arc::new(text::TextGenerator::new(
            caps.font.clone(),
            text_lines,
        )));
        registry.register_category(Arc::new(pdf::PdfGenerator::new(caps)));
        registry.register_category(Arc::new(apk::ApkGenerator));
        registry.register_category(Arc::new(disc::DiscGenerator::new(caps)));
        registry
    }

    /// Register `generator` for one extension, replacing any previous entry.
    pub fn register(&mut self, extension: &str, generator: Arc<dyn Generator>) {
        self.by_extension
            .insert(extension.to_ascii_lowercase(), generator);
    }

    /// Register `generator` for every extension of its category.
    pub fn register_category(&mut self, generator: Arc<dyn Generator>) {
        for ext in generator.category().extensions() {
            self.register(ext, Arc::clone(&generator));
        }
    }

    /// Generator for `path`, looked up by lower-cased extension.
    #[must_use]
    pub fn lookup(&self, path: &Path) -> Option<&Arc<dyn Generator>> {
        let ext = extension_of(path)?;
        self.by_extension.get(&ext)
    }

    /// Number of registered extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_extension.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_extension.is_empty()
    }
}

/// Stateless entry point: file in, thumbnail out.
#[derive(Clone)]
pub struct GenerationPipeline {
    registry: GeneratorRegistry,
}

impl GenerationPipeline {
    /// Pipeline with the built-in generators.
    #[must_use]
    pub fn new(caps: CapabilitySet, text_lines: usize) -> Self {
        Self {
            registry: GeneratorRegistry::with_defaults(&caps, text_lines),
        }
    }

    /// Pipeline over a custom registry.
    #[must_use]
    pub fn with_registry(registry: GeneratorRegistry) -> Self {
        Self { registry }
    }

    /// The generator table.
    #[must_use]
    pub fn registry(&self) -> &GeneratorRegistry {
        &self.registry
    }

    /// Whether `path` has a registered generator and is not a cache payload.
    #[must_use]
    pub fn is_supported(&self, path: &Path) -> bool {
        !is_cache_artifact(path) && self.registry.lookup(path).is_some()
    }

    /// Generate a `size × size` thumbnail for `path`.
    ///
    /// Never panics: a panicking generator is reported as
    /// [`GenerationError::Failed`].
    pub fn generate(&self, path: &Path, size: u32) -> Result<RgbaImage, GenerationError> {
        if is_cache_artifact(path) {
            return Err(GenerationError::CacheArtifact(path.to_path_buf()));
        }
        let generator = self
            .registry
            .lookup(path)
            .ok_or_else(|| GenerationError::Unsupported(path.to_path_buf()))?;
        if size == 0 {
            return Err(GenerationError::failed(path, "thumbnail size must be non-zero"));
        }

        let metadata = std::fs::metadata(path).map_err(|e| GenerationError::io(path, e))?;
        if metadata.is_dir() {
            return Err(GenerationError::Unsupported(path.to_path_buf()));
        }
        if metadata.len() == 0 {
            return Err(GenerationError::failed(path, "file is empty"));
        }

        log::debug!(
            "Generating {} thumbnail for {} @{}",
            generator.category(),
            path.display(),
            size
        );
        let result = panic::catch_unwind(AssertUnwindSafe(|| generator.generate(path, size)))
            .unwrap_or_else(|_| Err(GenerationError::failed(path, "generator panicked")))?;

        if result.dimensions() == (size, size) {
            Ok(result)
        } else {
            Ok(canvas::fit_to_square(&::image::DynamicImage::ImageRgba8(result), size))
        }
    }
}

/// Whether `path` is a cache payload (`*.thumb`).
#[must_use]
pub fn is_cache_artifact(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| ext == PAYLOAD_EXTENSION)
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}
