//! Cache entry definitions and freshness rules.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// One record of the metadata sidecar (`cache_metadata.json`).
///
/// Times are seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Modification time of the source file when the thumbnail was generated.
    pub mtime: f64,
    /// Wall-clock time the thumbnail was written.
    pub created: f64,
}

impl MetadataRecord {
    /// Create a record stamped with the current time.
    ///
    /// Non-finite mtimes are stored as `0.0` so the sidecar always serializes.
    #[must_use]
    pub fn new(mtime: f64) -> Self {
        Self {
            mtime: finite_or_zero(mtime),
            created: now_secs(),
        }
    }
}

/// A decoded thumbnail held by the memory layer.
#[derive(Debug, Clone)]
pub struct CachedThumbnail {
    /// The decoded RGBA bitmap.
    pub image: Arc<RgbaImage>,
    /// Source mtime recorded when the thumbnail was stored.
    pub source_mtime: f64,
}

/// Payload accepted by [`crate::cache::ThumbnailCache::put`].
#[derive(Debug, Clone)]
pub enum ThumbnailPayload {
    /// An already encoded image (PNG or any format the `image` crate decodes).
    Encoded(Vec<u8>),
    /// An in-memory bitmap, encoded to PNG before it reaches disk.
    Image(RgbaImage),
}

impl From<RgbaImage> for ThumbnailPayload {
    fn from(image: RgbaImage) -> Self {
        Self::Image(image)
    }
}

impl From<Vec<u8>> for ThumbnailPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Encoded(bytes)
    }
}

/// Convert a [`SystemTime`] to fractional seconds since the epoch.
#[must_use]
pub fn system_time_secs(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

/// Current wall-clock time in seconds since the epoch.
#[must_use]
pub fn now_secs() -> f64 {
    system_time_secs(SystemTime::now())
}

/// Live modification time of `path`, or `None` if it cannot be stat'ed locally.
#[must_use]
pub fn source_mtime(path: &Path) -> Option<f64> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(system_time_secs)
}

/// Whether a thumbnail recorded at `recorded_mtime` is still valid for `source`.
///
/// Valid iff the recorded mtime is at least the live one. Sources that cannot
/// be stat'ed (remote or disc-virtual paths) have nothing to compare against
/// and are treated as fresh.
#[must_use]
pub fn is_fresh_against(recorded_mtime: f64, source: &Path) -> bool {
    match source_mtime(source) {
        Some(live) => recorded_mtime >= live,
        None => true,
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
