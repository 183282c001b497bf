//! Thumbnail caching.
//!
//! Thumbnails are cached per `(source path, pixel size)` in two layers:
//!
//! * [`memory`]: a bounded LRU of decoded bitmaps.
//! * [`store`]: `<key>.thumb` payload files plus a JSON metadata sidecar.
//!
//! [`ThumbnailCache`] composes both and is the only type most callers need.
//! Keys come from [`key::derive_key`].
//!
//! # Cache Invalidation
//!
//! Every entry records the source file's mtime at generation time. An entry
//! is valid only while that recorded mtime is at least the live mtime of the
//! source; stale entries are reported as misses and overwritten by the next
//! `put`. Sources that cannot be stat'ed locally are never invalidated.
//!
//! # Example
//!
//! ```no_run
//! use rustthumb::cache::ThumbnailCache;
//! use std::path::Path;
//!
//! let cache = ThumbnailCache::new(Path::new("/tmp/thumbnail_cache"), 200).unwrap();
//! if cache.get(Path::new("/photos/cat.jpg"), 128).is_none() {
//!     // generate, then cache.put(...)
//! }
//! ```

pub mod entry;
pub mod key;
pub mod memory;
pub mod store;
pub mod thumbnail;

use std::path::PathBuf;

pub use entry::{CachedThumbnail, MetadataRecord, ThumbnailPayload};
pub use key::{derive_key, CacheKey};
pub use memory::{MemoryLru, DEFAULT_MEMORY_CAPACITY};
pub use store::PersistentStore;
pub use thumbnail::{encode_png, ThumbnailCache};

/// Errors raised by the cache layers.
///
/// None of these reach UI code as panics: the facade logs write failures and
/// turns read failures into misses.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// A payload could not be written to disk.
    #[error("Failed to write cached thumbnail {path}: {source}")]
    WriteFailed {
        /// Target payload path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Persisted or supplied bytes do not decode as an image.
    #[error("Corrupt thumbnail for key {key}: {reason}")]
    ReadCorrupt {
        /// Cache key of the entry
        key: String,
        /// Decoder message
        reason: String,
    },

    /// An I/O error on the cache directory itself.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Decoded entries in memory.
    pub memory_entries: usize,
    /// Memory layer capacity.
    pub memory_capacity: usize,
    /// Payload files on disk.
    pub disk_entries: usize,
    /// Total size of payload files in bytes.
    pub disk_bytes: u64,
}
