use filetime::FileTime;
use image::{Rgba, RgbaImage};
use rustthumb::cache::store::METADATA_FILE;
use rustthumb::cache::ThumbnailCache;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn source_in(dir: &Path) -> PathBuf {
    let path = dir.join("photo.jpg");
    fs::write(&path, b"jpeg-ish").unwrap();
    filetime::set_file_mtime(&path, FileTime::from_unix_time(1_500_000_000, 0)).unwrap();
    path
}

fn solid(size: u32) -> RgbaImage {
    RgbaImage::from_pixel(size, size, Rgba([12, 34, 56, 255]))
}

#[test]
fn test_garbage_sidecar_does_not_prevent_open() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("cache");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join(METADATA_FILE), b"{ this is not json").unwrap();

    let cache = ThumbnailCache::new(&root, 4).unwrap();
    let source = source_in(dir.path());
    assert!(cache.get(&source, 32).is_none());

    // The store keeps working and rewrites a valid sidecar.
    cache.put(&source, 32, solid(32)).unwrap();
    let text = fs::read_to_string(root.join(METADATA_FILE)).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert!(parsed.is_object());
}

#[test]
fn test_lost_sidecar_makes_payloads_stale() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("cache");
    let source = source_in(dir.path());

    {
        let cache = ThumbnailCache::new(&root, 4).unwrap();
        cache.put(&source, 32, solid(32)).unwrap();
    }
    fs::remove_file(root.join(METADATA_FILE)).unwrap();

    let cache = ThumbnailCache::new(&root, 4).unwrap();
    assert!(!cache.is_cached(&source, 32));
    assert!(cache.get(&source, 32).is_none());

    // Regeneration overwrites the orphaned payload.
    cache.put(&source, 32, solid(32)).unwrap();
    assert!(cache.is_cached(&source, 32));
}

#[test]
fn test_truncated_payload_is_a_miss_and_regenerable() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("cache");
    let source = source_in(dir.path());

    let cache = ThumbnailCache::new(&root, 4).unwrap();
    cache.put(&source, 64, solid(64)).unwrap();
    cache.clear_memory_cache();

    let payload = cache.store().payload_path(&cache.key_for(&source, 64));
    let bytes = fs::read(&payload).unwrap();
    fs::write(&payload, &bytes[..bytes.len() / 3]).unwrap();

    assert!(cache.get(&source, 64).is_none());
    assert!(!payload.exists());

    cache.put(&source, 64, solid(64)).unwrap();
    cache.clear_memory_cache();
    assert_eq!(cache.get(&source, 64).unwrap().dimensions(), (64, 64));
}

#[test]
fn test_foreign_files_in_cache_root_are_ignored() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("cache");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("notes.txt"), b"not ours").unwrap();

    let cache = ThumbnailCache::new(&root, 4).unwrap();
    let source = source_in(dir.path());
    cache.put(&source, 16, solid(16)).unwrap();

    let stats = cache.stats().unwrap();
    assert_eq!(stats.disk_entries, 1);
    assert_eq!(cache.clear_disk().unwrap(), 1);
    assert!(root.join("notes.txt").exists());
}

#[cfg(unix)]
#[test]
fn test_unwritable_cache_root_keeps_memory_entry() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let root = dir.path().join("cache");
    let cache = ThumbnailCache::new(&root, 4).unwrap();
    let source = source_in(dir.path());

    fs::set_permissions(&root, fs::Permissions::from_mode(0o555)).unwrap();
    // Root ignores permission bits; nothing to observe in that case.
    let probe = root.join("probe");
    if fs::write(&probe, b"x").is_ok() {
        fs::remove_file(&probe).unwrap();
        fs::set_permissions(&root, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let image = cache.put(&source, 32, solid(32)).unwrap();
    assert_eq!(image.dimensions(), (32, 32));
    assert!(cache.get(&source, 32).is_some());
    assert_eq!(cache.stats().unwrap().disk_entries, 0);

    fs::set_permissions(&root, fs::Permissions::from_mode(0o755)).unwrap();
}
