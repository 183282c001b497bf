//! Deterministic cache key derivation.
//!
//! A cache key addresses one `(source path, pixel size)` pair in both cache
//! layers. Paths are canonicalized before hashing so that `./a/../b.png`,
//! `b.png` and its absolute spelling all land on the same key, and NFC
//! normalized so that macOS NFD spellings agree with NFC ones.
//!
//! The key is `<blake3 hex of the path bytes>_<size>`, which is stable across
//! process runs and safe to use as a file name.
//!
//! # Example
//!
//! ```
//! use rustthumb::cache::key::derive_key;
//! use std::path::Path;
//!
//! let a = derive_key(Path::new("/photos/cat.jpg"), 64);
//! let b = derive_key(Path::new("/photos/./cat.jpg"), 64);
//! assert_eq!(a, b);
//! assert!(a.as_str().ends_with("_64"));
//! ```

use std::ffi::OsString;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

/// Key addressing one thumbnail in the memory and disk layers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rebuild a key from its string form (e.g. a payload file stem).
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the cache key for `path` at `size` pixels.
///
/// Pure with respect to its inputs except for the canonicalization step,
/// which consults the filesystem to resolve symlinks when the path exists.
#[must_use]
pub fn derive_key(path: &Path, size: u32) -> CacheKey {
    let canonical = canonicalize_path(path);
    let digest = blake3::hash(canonical.as_os_str().as_encoded_bytes());
    CacheKey(format!("{}_{}", digest.to_hex(), size))
}

/// Canonicalize a path for keying and deduplication.
///
/// Existing paths are resolved with [`std::fs::canonicalize`]. Paths that do
/// not exist locally (remote or virtual paths) are made absolute and cleaned
/// lexically. The result is NFC normalized when it is valid UTF-8.
#[must_use]
pub fn canonicalize_path(path: &Path) -> PathBuf {
    let absolute = match std::fs::canonicalize(path) {
        Ok(resolved) => resolved,
        Err(_) => std::path::absolute(path)
            .map(|p| lexical_clean(&p))
            .unwrap_or_else(|_| lexical_clean(path)),
    };
    normalize_unicode(&absolute)
}

/// Remove `.` components and fold `..` against preceding normal components.
fn lexical_clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(cleaned.components().next_back(), Some(Component::Normal(_)))
                    && cleaned.pop();
                if !popped && !cleaned.has_root() {
                    cleaned.push("..");
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

fn normalize_unicode(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(OsString::from(s.nfc().collect::<String>())),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::tempdir;

    #[test]
    fn test_key_is_deterministic() {
        let a = derive_key(Path::new("/nonexistent/dir/file.png"), 128);
        let b = derive_key(Path::new("/nonexistent/dir/file.png"), 128);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_format() {
        let key = derive_key(Path::new("/nonexistent/file.png"), 96);
        let (hash, size) = key.as_str().rsplit_once('_').unwrap();
        assert_eq!(size, "96");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_size_changes_key() {
        let path = Path::new("/nonexistent/file.png");
        assert_ne!(derive_key(path, 64), derive_key(path, 128));
    }

    #[test]
    fn test_dot_components_collide() {
        let a = derive_key(Path::new("/nonexistent/a/../b/./c.png"), 64);
        let b = derive_key(Path::new("/nonexistent/b/c.png"), 64);
        assert_eq!(a, b);
    }

    #[test]
    fn test_relative_and_absolute_collide() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("img.png");
        std::fs::write(&file, b"x").unwrap();

        let dotted = dir.path().join(".").join("img.png");
        assert_eq!(derive_key(&file, 32), derive_key(&dotted, 32));
    }

    #[test]
    fn test_nfd_and_nfc_collide() {
        let nfc = derive_key(Path::new("/nonexistent/caf\u{e9}.png"), 64);
        let nfd = derive_key(Path::new("/nonexistent/cafe\u{301}.png"), 64);
        assert_eq!(nfc, nfd);
    }

    #[test]
    fn test_distinct_paths_distinct_keys() {
        let keys: HashSet<_> = (0..500)
            .map(|i| derive_key(Path::new(&format!("/nonexistent/file_{i}.png")), 64))
            .collect();
        assert_eq!(keys.len(), 500);
    }

    #[test]
    fn test_lexical_clean_keeps_leading_parent() {
        assert_eq!(lexical_clean(Path::new("../a/./b")), PathBuf::from("../a/b"));
        assert_eq!(lexical_clean(Path::new("/a/b/../../..")), PathBuf::from("/"));
    }
}
