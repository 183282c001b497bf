use filetime::FileTime;
use image::{Rgba, RgbaImage};
use rustthumb::cache::ThumbnailCache;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

fn solid(size: u32, value: u8) -> RgbaImage {
    RgbaImage::from_pixel(size, size, Rgba([value, 0, 255 - value, 255]))
}

fn make_sources(dir: &std::path::Path, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("file_{i}.png"));
            fs::write(&path, format!("source {i}")).unwrap();
            filetime::set_file_mtime(&path, FileTime::from_unix_time(1_000_000 + i as i64, 0))
                .unwrap();
            path
        })
        .collect()
}

#[test]
fn test_get_twice_is_bit_identical() {
    let dir = tempdir().unwrap();
    let cache = ThumbnailCache::new(&dir.path().join("cache"), 4).unwrap();
    let source = make_sources(dir.path(), 1).remove(0);

    cache.put(&source, 32, solid(32, 40)).unwrap();

    let first = cache.get(&source, 32).unwrap();
    let second = cache.get(&source, 32).unwrap();
    assert_eq!(first.as_raw(), second.as_raw());

    // Also from disk in a fresh process-like instance.
    let reopened = ThumbnailCache::new(&dir.path().join("cache"), 4).unwrap();
    let third = reopened.get(&source, 32).unwrap();
    let fourth = reopened.get(&source, 32).unwrap();
    assert_eq!(third.as_raw(), fourth.as_raw());
    assert_eq!(first.as_raw(), third.as_raw());
}

#[test]
fn test_persisted_entry_survives_reopen() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("cache");
    let source = make_sources(dir.path(), 1).remove(0);

    {
        let cache = ThumbnailCache::new(&root, 4).unwrap();
        cache.put(&source, 64, solid(64, 99)).unwrap();
    }

    let cache = ThumbnailCache::new(&root, 4).unwrap();
    assert!(cache.memory().is_empty());
    assert!(cache.is_cached(&source, 64));
    let image = cache.get(&source, 64).unwrap();
    assert_eq!(image.dimensions(), (64, 64));
    assert_eq!(image.get_pixel(10, 10), &Rgba([99, 0, 156, 255]));
}

#[test]
fn test_freshness_after_source_edit() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("cache");
    let source = make_sources(dir.path(), 1).remove(0);
    let cache = ThumbnailCache::new(&root, 4).unwrap();

    cache.put(&source, 48, solid(48, 1)).unwrap();
    assert!(cache.get(&source, 48).is_some());

    filetime::set_file_mtime(&source, FileTime::from_unix_time(5_000_000, 0)).unwrap();

    // Neither layer may hand back the old bytes.
    assert!(cache.get(&source, 48).is_none());
    let reopened = ThumbnailCache::new(&root, 4).unwrap();
    assert!(reopened.get(&source, 48).is_none());

    // A regenerated thumbnail is served again.
    cache.put(&source, 48, solid(48, 2)).unwrap();
    let image = cache.get(&source, 48).unwrap();
    assert_eq!(image.get_pixel(0, 0), &Rgba([2, 0, 253, 255]));
}

#[test]
fn test_older_mtime_is_still_fresh() {
    let dir = tempdir().unwrap();
    let source = make_sources(dir.path(), 1).remove(0);
    let cache = ThumbnailCache::new(&dir.path().join("cache"), 4).unwrap();

    cache.put(&source, 16, solid(16, 3)).unwrap();
    // Restored from backup with an older timestamp.
    filetime::set_file_mtime(&source, FileTime::from_unix_time(10, 0)).unwrap();
    assert!(cache.get(&source, 16).is_some());
}

#[test]
fn test_memory_eviction_falls_back_to_disk() {
    let dir = tempdir().unwrap();
    let capacity = 3;
    let cache = ThumbnailCache::new(&dir.path().join("cache"), capacity).unwrap();
    let sources = make_sources(dir.path(), capacity + 1);

    for (i, source) in sources.iter().enumerate() {
        cache.put(source, 16, solid(16, i as u8)).unwrap();
    }

    let first_key = cache.key_for(&sources[0], 16);
    assert_eq!(cache.memory().len(), capacity);
    assert!(cache.memory().peek(&first_key).is_none());
    for source in &sources[1..] {
        assert!(cache.memory().peek(&cache.key_for(source, 16)).is_some());
    }

    // Evicted from memory, still on disk.
    let image = cache.get(&sources[0], 16).unwrap();
    assert_eq!(image.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
}

#[test]
fn test_different_sizes_are_different_entries() {
    let dir = tempdir().unwrap();
    let source = make_sources(dir.path(), 1).remove(0);
    let cache = ThumbnailCache::new(&dir.path().join("cache"), 8).unwrap();

    cache.put(&source, 64, solid(64, 10)).unwrap();
    assert!(cache.get(&source, 128).is_none());
    assert!(!cache.is_cached(&source, 128));

    cache.put(&source, 128, solid(128, 20)).unwrap();
    assert_eq!(cache.get(&source, 64).unwrap().dimensions(), (64, 64));
    assert_eq!(cache.get(&source, 128).unwrap().dimensions(), (128, 128));
    assert_eq!(cache.stats().unwrap().disk_entries, 2);
}

#[test]
fn test_relative_and_absolute_paths_share_entry() {
    let dir = tempdir().unwrap();
    let source = make_sources(dir.path(), 1).remove(0);
    let cache = ThumbnailCache::new(&dir.path().join("cache"), 8).unwrap();

    cache.put(&source, 32, solid(32, 7)).unwrap();

    let dotted = dir.path().join(".").join("file_0.png");
    assert!(cache.get(&dotted, 32).is_some());
}

#[test]
fn test_clear_disk_empties_both_layers() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("cache");
    let sources = make_sources(dir.path(), 3);
    let cache = ThumbnailCache::new(&root, 8).unwrap();

    for source in &sources {
        cache.put(source, 16, solid(16, 1)).unwrap();
    }
    assert_eq!(cache.clear_disk().unwrap(), 3);

    let stats = cache.stats().unwrap();
    assert_eq!(stats.memory_entries, 0);
    assert_eq!(stats.disk_entries, 0);
    assert_eq!(stats.disk_bytes, 0);
    assert!(root.is_dir());
}
