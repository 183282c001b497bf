//! Disk-backed thumbnail store.
//!
//! Layout of the cache root:
//!
//! ```text
//! <root>/
//!   <key>.thumb            encoded payload (PNG)
//!   cache_metadata.json    { "<key>": { "mtime": <f64>, "created": <f64> }, ... }
//! ```
//!
//! Payloads and the sidecar are written to a temporary file in the same
//! directory and renamed into place, so readers never see a partial file.
//! When the rename fails the temporary file is copied over the target
//! instead. Sidecar persistence is best-effort: a failure is logged and the
//! in-process metadata map stays authoritative for the session.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tempfile::NamedTempFile;

use super::entry::{is_fresh_against, MetadataRecord};
use super::key::CacheKey;
use super::CacheError;

/// File extension of payload files.
pub const PAYLOAD_EXTENSION: &str = "thumb";

/// Name of the metadata sidecar inside the cache root.
pub const METADATA_FILE: &str = "cache_metadata.json";

type MetadataMap = BTreeMap<String, MetadataRecord>;

/// Persistent half of the thumbnail cache.
#[derive(Debug)]
pub struct PersistentStore {
    root: PathBuf,
    metadata: Mutex<MetadataMap>,
}

impl PersistentStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// An unreadable or corrupt sidecar is logged and replaced by an empty map;
    /// only failure to create the directory is an error.
    pub fn open(root: &Path) -> Result<Self, CacheError> {
        fs::create_dir_all(root).map_err(|source| CacheError::Io {
            path: root.to_path_buf(),
            source,
        })?;

        let metadata = load_metadata(&root.join(METADATA_FILE));
        log::debug!(
            "Opened thumbnail store at {} ({} metadata records)",
            root.display(),
            metadata.len()
        );

        Ok(Self {
            root: root.to_path_buf(),
            metadata: Mutex::new(metadata),
        })
    }

    /// The cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the payload file for `key`.
    #[must_use]
    pub fn payload_path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(format!("{}.{}", key.as_str(), PAYLOAD_EXTENSION))
    }

    fn lock(&self) -> MutexGuard<'_, MetadataMap> {
        self.metadata.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the payload and recorded source mtime for `key`.
    ///
    /// Any I/O failure is a miss. A payload without a metadata record reports
    /// a recorded mtime of `0.0`, which is stale for every local source.
    pub fn read(&self, key: &CacheKey) -> Option<(Vec<u8>, f64)> {
        let path = self.payload_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Failed to read cached thumbnail {}: {}", path.display(), e);
                return None;
            }
        };
        Some((bytes, self.recorded_mtime(key).unwrap_or(0.0)))
    }

    /// Whether a payload file exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.payload_path(key).is_file()
    }

    /// Recorded source mtime for `key`, if a metadata record exists.
    #[must_use]
    pub fn recorded_mtime(&self, key: &CacheKey) -> Option<f64> {
        self.lock().get(key.as_str()).map(|r| r.mtime)
    }

    /// Write `bytes` for `key` and record `source_mtime`.
    ///
    /// The payload write is the only failure reported; sidecar persistence is
    /// logged and swallowed.
    pub fn write(&self, key: &CacheKey, bytes: &[u8], source_mtime: f64) -> Result<(), CacheError> {
        let target = self.payload_path(key);
        write_atomic(&self.root, &target, bytes).map_err(|source| CacheError::WriteFailed {
            path: target.clone(),
            source,
        })?;

        let mut metadata = self.lock();
        metadata.insert(key.as_str().to_owned(), MetadataRecord::new(source_mtime));
        self.persist_metadata(&metadata);
        Ok(())
    }

    /// Whether the entry for `key` exists and is fresh with respect to `source`.
    ///
    /// See [`is_fresh_against`] for the comparison, including the rule for
    /// sources that cannot be stat'ed locally.
    #[must_use]
    pub fn is_fresh(&self, key: &CacheKey, source: &Path) -> bool {
        if !self.contains(key) {
            return false;
        }
        let recorded = self.recorded_mtime(key).unwrap_or(0.0);
        is_fresh_against(recorded, source)
    }

    /// Delete the payload and metadata record for `key`.
    pub fn remove(&self, key: &CacheKey) {
        let path = self.payload_path(key);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != io::ErrorKind::NotFound {
                log::warn!("Failed to remove {}: {}", path.display(), e);
            }
        }

        let mut metadata = self.lock();
        if metadata.remove(key.as_str()).is_some() {
            self.persist_metadata(&metadata);
        }
    }

    /// Delete every payload and the sidecar. Returns the number of payloads removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut metadata = self.lock();
        let mut removed = 0;
        for path in self.payload_files()? {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
        metadata.clear();

        let sidecar = self.root.join(METADATA_FILE);
        if let Err(e) = fs::remove_file(&sidecar) {
            if e.kind() != io::ErrorKind::NotFound {
                log::warn!("Failed to remove {}: {}", sidecar.display(), e);
            }
        }
        Ok(removed)
    }

    /// Number of payload files and their total size in bytes.
    pub fn usage(&self) -> Result<(usize, u64), CacheError> {
        let files = self.payload_files()?;
        let bytes = files
            .iter()
            .filter_map(|p| fs::metadata(p).ok())
            .map(|m| m.len())
            .sum();
        Ok((files.len(), bytes))
    }

    fn payload_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let entries = fs::read_dir(&self.root).map_err(|source| CacheError::Io {
            path: self.root.clone(),
            source,
        })?;
        Ok(entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == PAYLOAD_EXTENSION))
            .collect())
    }

    /// Serialize the whole map to the sidecar. Called with the lock held so
    /// concurrent writers serialize their read-modify-write cycles.
    fn persist_metadata(&self, metadata: &MetadataMap) {
        let sidecar = self.root.join(METADATA_FILE);
        let json = match serde_json::to_vec_pretty(metadata) {
            Ok(json) => json,
            Err(e) => {
                log::warn!("Failed to serialize thumbnail metadata: {}", e);
                return;
            }
        };
        if let Err(e) = write_atomic(&self.root, &sidecar, &json) {
            log::warn!(
                "Failed to persist thumbnail metadata to {}: {}",
                sidecar.display(),
                e
            );
        }
    }
}

fn load_metadata(path: &Path) -> MetadataMap {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return MetadataMap::new(),
        Err(e) => {
            log::warn!("Failed to read {}: {}", path.display(), e);
            return MetadataMap::new();
        }
    };
    match serde_json::from_slice(&content) {
        Ok(map) => map,
        Err(e) => {
            log::warn!(
                "Ignoring corrupt thumbnail metadata {}: {}",
                path.display(),
                e
            );
            MetadataMap::new()
        }
    }
}

/// Write `bytes` to `target` through a temporary file in `dir`.
pub(crate) fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;

    match tmp.persist(target) {
        Ok(_) => Ok(()),
        Err(err) => {
            log::debug!(
                "Rename to {} failed ({}), falling back to copy",
                target.display(),
                err.error
            );
            // The temporary file is deleted when `err.file` drops.
            fs::copy(err.file.path(), target).map(|_| ())
        }
    }
}
