use image::{Rgb, RgbImage, RgbaImage};
use rustthumb::cache::ThumbnailCache;
use rustthumb::cancel::CancelToken;
use rustthumb::generate::{
    CapabilitySet, FileCategory, GenerationError, GenerationPipeline, Generator,
    GeneratorRegistry,
};
use rustthumb::precache::{PrecacheError, PrecacheScheduler};
use rustthumb::progress::{FnProgress, NoProgress};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::time::{Duration, Instant};
use tempfile::{tempdir, TempDir};

/// Records every generation and sleeps to widen race windows.
struct Slow {
    delay: Duration,
    calls: Arc<Mutex<HashMap<PathBuf, usize>>>,
}

impl Generator for Slow {
    fn category(&self) -> FileCategory {
        FileCategory::Text
    }

    fn generate(&self, path: &Path, size: u32) -> Result<RgbaImage, GenerationError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(path.to_path_buf())
            .or_default() += 1;
        std::thread::sleep(self.delay);
        Ok(RgbaImage::from_pixel(size, size, image::Rgba([1, 2, 3, 255])))
    }
}

fn slow_scheduler(
    delay: Duration,
) -> (TempDir, PrecacheScheduler, Arc<Mutex<HashMap<PathBuf, usize>>>) {
    let cache_dir = tempdir().unwrap();
    let cache = Arc::new(ThumbnailCache::new(cache_dir.path(), 64).unwrap());
    let calls = Arc::new(Mutex::new(HashMap::new()));
    let mut registry = GeneratorRegistry::new();
    registry.register(
        "txt",
        Arc::new(Slow {
            delay,
            calls: Arc::clone(&calls),
        }),
    );
    let pipeline = Arc::new(GenerationPipeline::with_registry(registry));
    (cache_dir, PrecacheScheduler::new(cache, pipeline), calls)
}

fn text_files(dir: &Path, count: usize) {
    for i in 0..count {
        fs::write(dir.join(format!("note_{i:02}.txt")), format!("line {i}")).unwrap();
    }
}

#[test]
fn test_precache_jpeg_then_get_sizes() {
    let photos = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let jpeg = photos.path().join("big.jpg");
    RgbImage::from_fn(1000, 1000, |x, y| Rgb([(x / 4) as u8, (y / 4) as u8, 128]))
        .save(&jpeg)
        .unwrap();

    let cache = Arc::new(ThumbnailCache::new(cache_dir.path(), 16).unwrap());
    let pipeline = Arc::new(GenerationPipeline::new(CapabilitySet::none(), 8));
    let scheduler = PrecacheScheduler::new(Arc::clone(&cache), pipeline);

    let summary = scheduler
        .precache(photos.path(), 64, 2, &CancelToken::new(), &NoProgress)
        .unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.generated, 1);
    assert!(!summary.cancelled);

    let thumb = cache.get(&jpeg, 64).unwrap();
    assert_eq!(thumb.dimensions(), (64, 64));
    assert!(cache.get(&jpeg, 128).is_none());
}

#[test]
fn test_concurrent_precache_generates_each_file_once() {
    let (_cache_dir, scheduler, calls) = slow_scheduler(Duration::from_millis(30));
    let dir = tempdir().unwrap();
    text_files(dir.path(), 12);

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let scheduler = scheduler.clone();
            let barrier = Arc::clone(&barrier);
            let dir = dir.path().to_path_buf();
            std::thread::spawn(move || {
                barrier.wait();
                scheduler
                    .precache(&dir, 64, 4, &CancelToken::new(), &NoProgress)
                    .unwrap()
            })
        })
        .collect();
    let summaries: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 12);
    assert!(calls.values().all(|&n| n == 1), "calls: {calls:?}");

    let generated: usize = summaries.iter().map(|s| s.generated).sum();
    assert_eq!(generated, 12);
}

#[test]
fn test_different_sizes_are_not_deduplicated() {
    let (_cache_dir, scheduler, calls) = slow_scheduler(Duration::from_millis(1));
    let dir = tempdir().unwrap();
    text_files(dir.path(), 3);

    for size in [64, 128] {
        let summary = scheduler
            .precache(dir.path(), size, 2, &CancelToken::new(), &NoProgress)
            .unwrap();
        assert_eq!(summary.generated, 3);
    }
    assert!(calls.lock().unwrap().values().all(|&n| n == 2));
}

#[test]
fn test_second_run_skips_cached_and_regenerates_edited() {
    let (_cache_dir, scheduler, calls) = slow_scheduler(Duration::ZERO);
    let dir = tempdir().unwrap();
    text_files(dir.path(), 4);

    let first = scheduler
        .precache(dir.path(), 32, 2, &CancelToken::new(), &NoProgress)
        .unwrap();
    assert_eq!(first.generated, 4);

    let edited = dir.path().join("note_02.txt");
    filetime::set_file_mtime(&edited, filetime::FileTime::from_unix_time(4_000_000_000, 0))
        .unwrap();

    let second = scheduler
        .precache(dir.path(), 32, 2, &CancelToken::new(), &NoProgress)
        .unwrap();
    assert_eq!(second.total, 1);
    assert_eq!(second.generated, 1);
    assert_eq!(calls.lock().unwrap()[&edited], 2);
}

#[test]
fn test_corrupt_and_empty_files_do_not_stall_pool() {
    let photos = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    RgbImage::from_pixel(50, 50, Rgb([0, 200, 0]))
        .save(photos.path().join("good.png"))
        .unwrap();
    fs::File::create(photos.path().join("empty.jpg")).unwrap();
    fs::write(photos.path().join("broken.png"), b"\x89PNG\r\n\x1a\nnot really").unwrap();
    fs::write(photos.path().join("readme.unknown"), b"skip me").unwrap();

    let cache = Arc::new(ThumbnailCache::new(cache_dir.path(), 16).unwrap());
    let pipeline = Arc::new(GenerationPipeline::new(CapabilitySet::none(), 8));
    let scheduler = PrecacheScheduler::new(cache, pipeline);

    let started = Instant::now();
    let summary = scheduler
        .precache(photos.path(), 48, 2, &CancelToken::new(), &NoProgress)
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(30));

    assert_eq!(summary.total, 3);
    assert_eq!(summary.generated, 1);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.completed(), 3);
}

#[test]
fn test_cancel_mid_batch() {
    let (_cache_dir, scheduler, calls) = slow_scheduler(Duration::from_millis(50));
    let scheduler = scheduler.with_shutdown_wait(Duration::from_millis(500));
    let dir = tempdir().unwrap();
    text_files(dir.path(), 40);

    let cancel = CancelToken::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let progress = {
        let cancel = cancel.clone();
        let seen = Arc::clone(&seen);
        FnProgress(move |done: usize, _total: usize, _path: &Path, _ok: bool| {
            seen.store(done, Ordering::SeqCst);
            if done >= 3 {
                cancel.cancel();
            }
        })
    };

    let summary = scheduler
        .precache(dir.path(), 64, 2, &cancel, &progress)
        .unwrap();

    assert!(summary.cancelled);
    assert!(summary.skipped_cancelled > 0);
    assert_eq!(summary.total, 40);
    assert_eq!(
        summary.generated + summary.failed + summary.unsupported + summary.skipped_cancelled,
        40
    );
    assert!(calls.lock().unwrap().len() < 40);
    assert!(seen.load(Ordering::SeqCst) >= 3);
}

#[test]
fn test_abandoned_tasks_keep_batch_claimed() {
    let (_cache_dir, scheduler, calls) = slow_scheduler(Duration::from_millis(600));
    let scheduler = scheduler.with_shutdown_wait(Duration::from_millis(50));
    let dir = tempdir().unwrap();
    text_files(dir.path(), 1);
    let file = dir.path().join("note_00.txt");

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        trigger.cancel();
    });
    let first = scheduler
        .precache(dir.path(), 64, 1, &cancel, &NoProgress)
        .unwrap();
    canceller.join().unwrap();
    assert!(first.cancelled);
    assert_eq!(first.skipped_cancelled, 1);

    // The first batch's task is still rendering.
    let second = scheduler
        .precache(dir.path(), 64, 1, &CancelToken::new(), &NoProgress)
        .unwrap();
    assert!(second.already_running);
    assert_eq!(second.generated, 0);

    let started = Instant::now();
    while !scheduler.cache().is_cached(&file, 64) {
        assert!(started.elapsed() < Duration::from_secs(5), "abandoned task never stored");
        std::thread::sleep(Duration::from_millis(20));
    }
    // Key release follows the store; wait for it before the final run.
    std::thread::sleep(Duration::from_millis(100));

    let third = scheduler
        .precache(dir.path(), 64, 1, &CancelToken::new(), &NoProgress)
        .unwrap();
    assert!(!third.already_running);
    assert_eq!(third.total, 0);
    assert_eq!(calls.lock().unwrap().get(&file).copied(), Some(1));
}

#[test]
fn test_precache_directory_reports_on_background_thread() {
    let (_cache_dir, scheduler, _calls) = slow_scheduler(Duration::ZERO);
    let dir = tempdir().unwrap();
    text_files(dir.path(), 5);

    let (tx, rx) = crossbeam_channel::bounded(1);
    let progress_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&progress_calls);
    let handle = scheduler
        .precache_directory(
            dir.path(),
            32,
            move |_done, total| {
                assert_eq!(total, 5);
                counter.fetch_add(1, Ordering::SeqCst);
            },
            move |result| {
                let _ = tx.send(result);
            },
            CancelToken::new(),
        )
        .unwrap();

    let summary = rx.recv_timeout(Duration::from_secs(10)).unwrap().unwrap();
    handle.join().unwrap();
    assert_eq!(summary.generated, 5);
    assert_eq!(progress_calls.load(Ordering::SeqCst), 5);
}

#[test]
fn test_precache_directory_on_missing_dir_reports_error() {
    let (_cache_dir, scheduler, _calls) = slow_scheduler(Duration::ZERO);
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope");

    let (tx, rx) = crossbeam_channel::bounded(1);
    let handle = scheduler
        .precache_directory(
            missing,
            32,
            |_, _| {},
            move |result| {
                let _ = tx.send(result);
            },
            CancelToken::new(),
        )
        .unwrap();
    let result = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    handle.join().unwrap();
    assert!(matches!(result, Err(PrecacheError::NotADirectory(_))));
}

#[test]
fn test_get_or_generate_uses_cache() {
    let (_cache_dir, scheduler, calls) = slow_scheduler(Duration::ZERO);
    let dir = tempdir().unwrap();
    text_files(dir.path(), 1);
    let path = dir.path().join("note_00.txt");

    let first = scheduler.get_or_generate(&path, 40).unwrap();
    let second = scheduler.get_or_generate(&path, 40).unwrap();
    assert_eq!(first.as_raw(), second.as_raw());
    assert_eq!(calls.lock().unwrap()[&path], 1);
}
