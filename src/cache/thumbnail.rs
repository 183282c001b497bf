//! The two-layer thumbnail cache facade.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use image::{ImageFormat, RgbaImage};

use super::entry::{is_fresh_against, source_mtime, CachedThumbnail, ThumbnailPayload};
use super::key::{derive_key, CacheKey};
use super::memory::MemoryLru;
use super::store::PersistentStore;
use super::{CacheError, CacheStats};
use crate::config::Config;

/// Memory LRU in front of a persistent store, addressed by `(path, size)`.
///
/// `get` and `is_cached` only touch the two layers and one `stat` of the
/// source file, so they are safe to call from a UI thread. `put` may be
/// called from any thread.
pub struct ThumbnailCache {
    memory: MemoryLru,
    store: PersistentStore,
}

impl ThumbnailCache {
    /// Open a cache rooted at `root` with `memory_capacity` decoded entries.
    pub fn new(root: &Path, memory_capacity: usize) -> Result<Self, CacheError> {
        Ok(Self {
            memory: MemoryLru::new(memory_capacity),
            store: PersistentStore::open(root)?,
        })
    }

    /// Open the cache described by `config`.
    pub fn open(config: &Config) -> Result<Self, CacheError> {
        Self::new(&config.cache_root(), config.memory_capacity)
    }

    /// Fetch the thumbnail for `path` at `size`, or `None` on a miss.
    ///
    /// Stale entries are never returned. A persisted payload that fails to
    /// decode is deleted and reported as a miss.
    pub fn get(&self, path: &Path, size: u32) -> Option<Arc<RgbaImage>> {
        let key = derive_key(path, size);

        if let Some(hit) = self.memory.get(&key) {
            if is_fresh_against(hit.source_mtime, path) {
                log::trace!("Memory hit for {} @{}", path.display(), size);
                return Some(hit.image);
            }
            log::debug!("Dropping stale memory entry for {}", path.display());
            self.memory.remove(&key);
        }

        let (bytes, recorded) = self.store.read(&key)?;
        if !is_fresh_against(recorded, path) {
            log::debug!("Stale disk entry for {} @{}", path.display(), size);
            return None;
        }

        match image::load_from_memory(&bytes) {
            Ok(decoded) => {
                let image = Arc::new(decoded.into_rgba8());
                self.memory.put(
                    key,
                    CachedThumbnail {
                        image: Arc::clone(&image),
                        source_mtime: recorded,
                    },
                );
                log::trace!("Disk hit for {} @{}", path.display(), size);
                Some(image)
            }
            Err(e) => {
                let err = CacheError::ReadCorrupt {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                log::warn!("{}", err);
                self.store.remove(&key);
                None
            }
        }
    }

    /// Store a thumbnail for `path` at `size` in both layers.
    ///
    /// The source mtime is taken from the live file (`0.0` if it cannot be
    /// stat'ed). A disk failure is logged and swallowed; the memory entry
    /// still serves the thumbnail for the rest of the session. The only error
    /// is an encoded payload that does not decode.
    pub fn put(
        &self,
        path: &Path,
        size: u32,
        payload: impl Into<ThumbnailPayload>,
    ) -> Result<Arc<RgbaImage>, CacheError> {
        self.put_with_mtime(path, size, payload, source_mtime(path).unwrap_or(0.0))
    }

    /// Like [`put`](Self::put), recording `mtime` as the source's
    /// modification time.
    ///
    /// Generators pass the mtime sampled before they read the source, so an
    /// edit that lands mid-generation leaves the entry stale.
    pub fn put_with_mtime(
        &self,
        path: &Path,
        size: u32,
        payload: impl Into<ThumbnailPayload>,
        mtime: f64,
    ) -> Result<Arc<RgbaImage>, CacheError> {
        let key = derive_key(path, size);

        let (image, encoded) = match payload.into() {
            ThumbnailPayload::Encoded(bytes) => {
                let image = image::load_from_memory(&bytes)
                    .map_err(|e| CacheError::ReadCorrupt {
                        key: key.to_string(),
                        reason: e.to_string(),
                    })?
                    .into_rgba8();
                (image, Some(bytes))
            }
            ThumbnailPayload::Image(image) => {
                let encoded = match encode_png(&image) {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        log::warn!("Failed to encode thumbnail for {}: {}", path.display(), e);
                        None
                    }
                };
                (image, encoded)
            }
        };

        let image = Arc::new(image);
        self.memory.put(
            key.clone(),
            CachedThumbnail {
                image: Arc::clone(&image),
                source_mtime: mtime,
            },
        );

        if let Some(bytes) = encoded {
            if let Err(e) = self.store.write(&key, &bytes, mtime) {
                log::warn!("{}", e);
            }
        }
        Ok(image)
    }

    /// Whether a fresh thumbnail exists for `path` at `size`, without decoding.
    #[must_use]
    pub fn is_cached(&self, path: &Path, size: u32) -> bool {
        let key = derive_key(path, size);
        if let Some(hit) = self.memory.peek(&key) {
            if is_fresh_against(hit.source_mtime, path) {
                return true;
            }
        }
        self.store.is_fresh(&key, path)
    }

    /// Drop one entry from both layers.
    pub fn remove(&self, path: &Path, size: u32) {
        let key = derive_key(path, size);
        self.memory.remove(&key);
        self.store.remove(&key);
    }

    /// Empty the memory layer only.
    pub fn clear_memory_cache(&self) {
        self.memory.clear();
    }

    /// Empty both layers. Returns the number of payload files deleted.
    pub fn clear_disk(&self) -> Result<usize, CacheError> {
        self.memory.clear();
        self.store.clear()
    }

    /// Entry counts and disk usage.
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let (disk_entries, disk_bytes) = self.store.usage()?;
        Ok(CacheStats {
            memory_entries: self.memory.len(),
            memory_capacity: self.memory.capacity(),
            disk_entries,
            disk_bytes,
        })
    }

    /// Key used for `path` at `size`.
    #[must_use]
    pub fn key_for(&self, path: &Path, size: u32) -> CacheKey {
        derive_key(path, size)
    }

    /// The memory layer.
    #[must_use]
    pub fn memory(&self) -> &MemoryLru {
        &self.memory
    }

    /// The persistent layer.
    #[must_use]
    pub fn store(&self) -> &PersistentStore {
        &self.store
    }
}

/// Encode an RGBA bitmap as PNG.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}
