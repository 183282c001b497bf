//! Directory precaching on a bounded worker pool.
//!
//! [`PrecacheScheduler::precache`] lists one directory (not recursively),
//! keeps the files the pipeline can handle that have no fresh cache entry,
//! and generates them on a `rayon` pool of at most `max_workers` threads.
//! Results come back over a `crossbeam-channel` to the calling thread, which
//! drives the [`PrecacheProgress`] callbacks.
//!
//! # Cancellation
//!
//! Tasks check the [`CancelToken`] before starting. A task already
//! generating runs to completion and still writes its entry. Once cancelled,
//! the caller waits at most `shutdown_wait` for in-flight tasks before
//! returning.
//!
//! # Deduplication
//!
//! Only one batch per `(directory, size)` runs at a time in a process. A
//! second concurrent call returns immediately with
//! [`PrecacheSummary::already_running`] set. A cancelled batch counts as
//! running until its last abandoned task has finished.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use image::RgbaImage;
use walkdir::WalkDir;

use crate::cache::entry::source_mtime;
use crate::cache::key::canonicalize_path;
use crate::cache::ThumbnailCache;
use crate::cancel::CancelToken;
use crate::generate::{GenerationError, GenerationPipeline};
use crate::progress::{FnProgress, PrecacheProgress};

/// Default worker count.
pub const DEFAULT_WORKERS: usize = 4;

/// Default bound on waiting for in-flight tasks after cancellation.
pub const DEFAULT_SHUTDOWN_WAIT: Duration = Duration::from_secs(2);

/// How often the collector wakes up to look at the cancel token.
const COLLECT_POLL: Duration = Duration::from_millis(50);

/// Errors that stop a batch before any work is dispatched.
#[derive(thiserror::Error, Debug)]
pub enum PrecacheError {
    /// The target is missing or not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The directory could not be listed.
    #[error("Failed to list {path}: {source}")]
    Io {
        /// Directory being listed
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// The worker pool could not be created.
    #[error("Failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    /// The background thread could not be spawned.
    #[error("Failed to spawn precache thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// What happened to one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrecacheSummary {
    /// Files that needed work.
    pub total: usize,
    /// Thumbnails generated and stored.
    pub generated: usize,
    /// Generation attempts that failed.
    pub failed: usize,
    /// Files the pipeline reported as unsupported (e.g. missing tool).
    pub unsupported: usize,
    /// Files not attempted because the batch was cancelled.
    pub skipped_cancelled: usize,
    /// Another batch for the same directory and size was already running.
    pub already_running: bool,
    /// The batch was cancelled.
    pub cancelled: bool,
}

impl PrecacheSummary {
    /// Files with a result, one way or another.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.generated + self.failed + self.unsupported + self.skipped_cancelled
    }
}

/// Result of one worker task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Generated and stored.
    Generated,
    /// Generation failed.
    Failed,
    /// No generator could handle the file.
    Unsupported,
    /// Not attempted: cancelled first.
    Skipped,
}

type InFlight = Arc<Mutex<HashSet<(PathBuf, u32)>>>;

/// Removes its key from the in-flight set on drop.
struct InFlightGuard {
    set: InFlight,
    key: (PathBuf, u32),
}

impl InFlightGuard {
    fn acquire(set: &InFlight, key: (PathBuf, u32)) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        inserted.then(|| Self {
            set: Arc::clone(set),
            key,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Schedules thumbnail generation for whole directories.
///
/// Cloning is cheap; clones share the cache, the pipeline and the set of
/// running batches.
#[derive(Clone)]
pub struct PrecacheScheduler {
    cache: Arc<ThumbnailCache>,
    pipeline: Arc<GenerationPipeline>,
    in_flight: InFlight,
    workers: usize,
    include_hidden: bool,
    shutdown_wait: Duration,
}

impl PrecacheScheduler {
    /// Scheduler over `cache` and `pipeline` with default settings.
    #[must_use]
    pub fn new(cache: Arc<ThumbnailCache>, pipeline: Arc<GenerationPipeline>) -> Self {
        Self {
            cache,
            pipeline,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            workers: DEFAULT_WORKERS,
            include_hidden: false,
            shutdown_wait: DEFAULT_SHUTDOWN_WAIT,
        }
    }

    /// Worker count used by [`precache_directory`](Self::precache_directory).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Also precache dot-files.
    #[must_use]
    pub fn with_include_hidden(mut self, include_hidden: bool) -> Self {
        self.include_hidden = include_hidden;
        self
    }

    /// Bound on waiting for in-flight tasks after cancellation.
    #[must_use]
    pub fn with_shutdown_wait(mut self, wait: Duration) -> Self {
        self.shutdown_wait = wait;
        self
    }

    /// The shared cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<ThumbnailCache> {
        &self.cache
    }

    /// The shared pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Arc<GenerationPipeline> {
        &self.pipeline
    }

    /// Files in `dir` (non-recursive, sorted by name) the pipeline can handle.
    ///
    /// # Errors
    ///
    /// Returns [`PrecacheError::NotADirectory`] if `dir` is not a directory.
    pub fn eligible_files(&self, dir: &Path) -> Result<Vec<PathBuf>, PrecacheError> {
        if !dir.is_dir() {
            return Err(PrecacheError::NotADirectory(dir.to_path_buf()));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    if e.depth() == 0 {
                        return Err(PrecacheError::Io {
                            path: dir.to_path_buf(),
                            source: e.into(),
                        });
                    }
                    log::warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                    continue;
                }
            };

            let path = entry.path();
            if !self.include_hidden && is_hidden(path) {
                continue;
            }
            if !path.is_file() {
                continue;
            }
            if self.pipeline.is_supported(path) {
                files.push(path.to_path_buf());
            }
        }
        Ok(files)
    }

    /// Generate and store the thumbnail for one file, on this thread.
    ///
    /// # Errors
    ///
    /// Any [`GenerationError`]; a failed disk write is not an error.
    pub fn generate_one(&self, path: &Path, size: u32) -> Result<Arc<RgbaImage>, GenerationError> {
        generate_and_store(&self.cache, &self.pipeline, path, size)
    }

    /// Cached thumbnail, generating it on a miss.
    ///
    /// # Errors
    ///
    /// Any [`GenerationError`] from the miss path.
    pub fn get_or_generate(&self, path: &Path, size: u32) -> Result<Arc<RgbaImage>, GenerationError> {
        match self.cache.get(path, size) {
            Some(hit) => Ok(hit),
            None => self.generate_one(path, size),
        }
    }

    /// Precache `dir` at `size`, blocking until the batch ends.
    ///
    /// Failures of individual files are counted, logged and skipped; they
    /// never abort the batch.
    ///
    /// # Errors
    ///
    /// Only errors that prevent the batch from starting.
    pub fn precache(
        &self,
        dir: &Path,
        size: u32,
        max_workers: usize,
        cancel: &CancelToken,
        progress: &dyn PrecacheProgress,
    ) -> Result<PrecacheSummary, PrecacheError> {
        if !dir.is_dir() {
            return Err(PrecacheError::NotADirectory(dir.to_path_buf()));
        }

        let Some(guard) =
            InFlightGuard::acquire(&self.in_flight, (canonicalize_path(dir), size))
        else {
            log::info!(
                "Precache of {} @{} already running; skipping",
                dir.display(),
                size
            );
            return Ok(PrecacheSummary {
                already_running: true,
                ..PrecacheSummary::default()
            });
        };

        let needing: Vec<PathBuf> = self
            .eligible_files(dir)?
            .into_iter()
            .filter(|path| !self.cache.is_cached(path, size))
            .collect();

        let mut summary = PrecacheSummary {
            total: needing.len(),
            ..PrecacheSummary::default()
        };
        progress.on_start(summary.total);

        if needing.is_empty() {
            log::debug!("Nothing to precache in {} @{}", dir.display(), size);
            summary.cancelled = cancel.is_cancelled();
            progress.on_finish(&summary);
            return Ok(summary);
        }

        let workers = max_workers.clamp(1, needing.len());
        log::info!(
            "Precaching {} files in {} @{} with {} workers",
            needing.len(),
            dir.display(),
            size,
            workers
        );
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("rustthumb-precache-{i}"))
            .build()?;

        // Every task holds the batch key, so abandoned tasks keep it until
        // they finish even after this call has returned.
        let guard = Arc::new(guard);
        let (tx, rx) = crossbeam_channel::unbounded::<(PathBuf, FileOutcome)>();
        for path in needing {
            let guard = Arc::clone(&guard);
            let tx = tx.clone();
            let cache = Arc::clone(&self.cache);
            let pipeline = Arc::clone(&self.pipeline);
            let cancel = cancel.clone();
            pool.spawn(move || {
                let outcome = if cancel.is_cancelled() {
                    FileOutcome::Skipped
                } else {
                    match generate_and_store(&cache, &pipeline, &path, size) {
                        Ok(_) => FileOutcome::Generated,
                        Err(e) if e.is_unsupported() => {
                            log::debug!("No thumbnail for {}: {}", path.display(), e);
                            FileOutcome::Unsupported
                        }
                        Err(e) => {
                            log::warn!("{}", e);
                            FileOutcome::Failed
                        }
                    }
                };
                let _ = tx.send((path, outcome));
                drop(guard);
            });
        }
        drop(tx);
        drop(guard);

        let mut deadline: Option<Instant> = None;
        loop {
            match rx.recv_timeout(COLLECT_POLL) {
                Ok((path, outcome)) => {
                    match outcome {
                        FileOutcome::Generated => summary.generated += 1,
                        FileOutcome::Failed => summary.failed += 1,
                        FileOutcome::Unsupported => summary.unsupported += 1,
                        FileOutcome::Skipped => summary.skipped_cancelled += 1,
                    }
                    progress.on_file(
                        summary.completed(),
                        summary.total,
                        &path,
                        outcome == FileOutcome::Generated,
                    );
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if cancel.is_cancelled() {
                let limit = *deadline.get_or_insert_with(|| Instant::now() + self.shutdown_wait);
                if Instant::now() >= limit {
                    log::warn!(
                        "Stopped waiting for in-flight thumbnails in {} after {:?}",
                        dir.display(),
                        self.shutdown_wait
                    );
                    break;
                }
            }
        }

        // Anything not reported by now was never started or is abandoned.
        summary.skipped_cancelled += summary.total - summary.completed();
        summary.cancelled = cancel.is_cancelled();
        log::info!(
            "Precache of {} done: {} generated, {} failed, {} unsupported, {} skipped",
            dir.display(),
            summary.generated,
            summary.failed,
            summary.unsupported,
            summary.skipped_cancelled
        );
        progress.on_finish(&summary);
        Ok(summary)
    }

    /// Fire-and-forget [`precache`](Self::precache) on a background thread.
    ///
    /// `on_progress(done, total)` and `on_complete` run on that thread;
    /// callers marshal to their own UI thread if needed.
    ///
    /// # Errors
    ///
    /// [`PrecacheError::Spawn`] if the thread cannot be started.
    pub fn precache_directory<P, C>(
        &self,
        dir: impl Into<PathBuf>,
        size: u32,
        on_progress: P,
        on_complete: C,
        cancel: CancelToken,
    ) -> Result<JoinHandle<()>, PrecacheError>
    where
        P: Fn(usize, usize) + Send + Sync + 'static,
        C: FnOnce(Result<PrecacheSummary, PrecacheError>) + Send + 'static,
    {
        let dir = dir.into();
        let scheduler = self.clone();
        std::thread::Builder::new()
            .name("rustthumb-precache".to_string())
            .spawn(move || {
                let progress = FnProgress(move |done: usize, total: usize, _: &Path, _: bool| {
                    on_progress(done, total);
                });
                let result = scheduler.precache(&dir, size, scheduler.workers, &cancel, &progress);
                on_complete(result);
            })
            .map_err(PrecacheError::Spawn)
    }
}

fn generate_and_store(
    cache: &ThumbnailCache,
    pipeline: &GenerationPipeline,
    path: &Path,
    size: u32,
) -> Result<Arc<RgbaImage>, GenerationError> {
    // Sampled first: an edit during generation must leave the entry stale.
    let mtime = source_mtime(path).unwrap_or(0.0);
    let image = pipeline.generate(path, size)?;
    cache
        .put_with_mtime(path, size, image, mtime)
        .map_err(|e| GenerationError::failed(path, e.to_string()))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}
