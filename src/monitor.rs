//! Debounced directory change monitoring.
//!
//! One background thread polls every watched directory on a fixed interval.
//! A directory's stamp is the newest mtime among the directory itself and
//! its direct entries, so in-place edits of a file are noticed too. A change
//! moves the watch through
//!
//! ```text
//! Idle -> ChangeDetected -> Debouncing -> Invalidated -> Idle
//! ```
//!
//! and the callback fires once the stamp has been quiet for the debounce
//! window. Bursts of changes restart the window and collapse into one event.
//!
//! Callbacks never run on the polling thread. Events are queued and the
//! owner delivers them with [`BackgroundFileMonitor::dispatch_pending`] or
//! [`BackgroundFileMonitor::dispatch_timeout`] from its own (UI) thread.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, RecvTimeoutError, Sender};
use walkdir::WalkDir;

use crate::cache::entry::system_time_secs;
use crate::cache::key::canonicalize_path;

/// Default polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Errors from the monitor.
#[derive(thiserror::Error, Debug)]
pub enum MonitorError {
    /// Only directories can be watched.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The polling thread could not be started.
    #[error("Failed to spawn monitor thread: {0}")]
    SpawnFailed(#[source] std::io::Error),
}

/// Where a watched directory is in its change cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// No pending change.
    Idle,
    /// A change was seen on the latest poll.
    ChangeDetected,
    /// Waiting for the debounce window to pass without further changes.
    Debouncing,
    /// The event fired; back to `Idle` on the next poll.
    Invalidated,
}

/// Debounce bookkeeping for one directory.
#[derive(Debug, Clone)]
pub struct WatchTracker {
    state: WatchState,
    stamp: Option<f64>,
    pending_since: Option<Instant>,
}

impl WatchTracker {
    /// Tracker starting from an observed `stamp`.
    #[must_use]
    pub fn new(stamp: Option<f64>) -> Self {
        Self {
            state: WatchState::Idle,
            stamp,
            pending_since: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> WatchState {
        self.state
    }

    /// When the pending event becomes due, if one is pending.
    #[must_use]
    pub fn deadline(&self, debounce: Duration) -> Option<Instant> {
        self.pending_since.map(|since| since + debounce)
    }

    /// Feed one poll result taken at `now`.
    ///
    /// Only a newer stamp, or a directory that reappears, counts as a
    /// change. An older stamp just becomes the new baseline. A directory
    /// that vanishes drops any pending event.
    pub fn observe(&mut self, stamp: Option<f64>, now: Instant) {
        let changed = match (self.stamp, stamp) {
            (Some(old), Some(new)) => new > old,
            (None, Some(_)) => true,
            (Some(_), None) => {
                self.stamp = None;
                self.pending_since = None;
                self.state = WatchState::Idle;
                return;
            }
            (None, None) => false,
        };
        if changed {
            self.stamp = stamp;
            self.pending_since = Some(now);
            self.state = match self.state {
                WatchState::Idle | WatchState::Invalidated => WatchState::ChangeDetected,
                WatchState::ChangeDetected | WatchState::Debouncing => WatchState::Debouncing,
            };
            return;
        }
        self.stamp = stamp;
        self.state = match self.state {
            WatchState::ChangeDetected => WatchState::Debouncing,
            WatchState::Invalidated => WatchState::Idle,
            other => other,
        };
    }

    /// Whether the event is due at `now`. Returns `true` exactly once per
    /// debounced burst.
    pub fn fire_if_due(&mut self, now: Instant, debounce: Duration) -> bool {
        match self.deadline(debounce) {
            Some(due) if now >= due => {
                self.pending_since = None;
                self.state = WatchState::Invalidated;
                true
            }
            _ => false,
        }
    }
}

/// Newest mtime (epoch seconds) of `dir` and its direct entries, or `None`
/// if `dir` cannot be read.
#[must_use]
pub fn directory_stamp(dir: &Path) -> Option<f64> {
    let own = std::fs::metadata(dir).ok()?.modified().ok().map(system_time_secs)?;
    let newest_entry = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter_map(|entry| entry.metadata().ok()?.modified().ok())
        .map(system_time_secs)
        .fold(f64::NEG_INFINITY, f64::max);
    Some(own.max(newest_entry))
}

type Callback = Arc<Mutex<Box<dyn FnMut(&Path) + Send>>>;

struct Watch {
    id: u64,
    tracker: WatchTracker,
}

#[derive(Debug)]
struct ChangeEvent {
    path: PathBuf,
    id: u64,
}

/// Polls directories and queues debounced change events for the owner.
pub struct BackgroundFileMonitor {
    watches: Arc<Mutex<HashMap<PathBuf, Watch>>>,
    callbacks: Mutex<HashMap<PathBuf, (u64, Callback)>>,
    events: Receiver<ChangeEvent>,
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    next_id: AtomicU64,
}

impl BackgroundFileMonitor {
    /// Start the polling thread.
    ///
    /// # Errors
    ///
    /// [`MonitorError::SpawnFailed`] if the thread cannot be started.
    pub fn new(poll_interval: Duration, debounce: Duration) -> Result<Self, MonitorError> {
        let poll_interval = poll_interval.max(Duration::from_millis(1));
        let watches: Arc<Mutex<HashMap<PathBuf, Watch>>> = Arc::default();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let thread_watches = Arc::clone(&watches);
        let thread = std::thread::Builder::new()
            .name("rustthumb-monitor".to_string())
            .spawn(move || {
                poll_loop(&thread_watches, &event_tx, &shutdown_rx, poll_interval, debounce);
            })
            .map_err(MonitorError::SpawnFailed)?;

        log::debug!(
            "Monitor started (poll {:?}, debounce {:?})",
            poll_interval,
            debounce
        );
        Ok(Self {
            watches,
            callbacks: Mutex::new(HashMap::new()),
            events: event_rx,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
            next_id: AtomicU64::new(1),
        })
    }

    /// Watch `dir`, calling `on_change(dir)` after each debounced burst.
    /// Re-adding a directory replaces its callback.
    ///
    /// # Errors
    ///
    /// [`MonitorError::NotADirectory`] if `dir` is not a directory.
    pub fn add_directory<F>(&self, dir: &Path, on_change: F) -> Result<(), MonitorError>
    where
        F: FnMut(&Path) + Send + 'static,
    {
        if !dir.is_dir() {
            return Err(MonitorError::NotADirectory(dir.to_path_buf()));
        }
        let path = canonicalize_path(dir);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tracker = WatchTracker::new(directory_stamp(&path));
        let callback: Box<dyn FnMut(&Path) + Send> = Box::new(on_change);

        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.clone(), (id, Arc::new(Mutex::new(callback))));
        self.watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.clone(), Watch { id, tracker });
        log::debug!("Watching {}", path.display());
        Ok(())
    }

    /// Stop watching `dir`, dropping any pending event. Returns whether it
    /// was watched.
    pub fn remove_directory(&self, dir: &Path) -> bool {
        let path = canonicalize_path(dir);
        let removed = self
            .watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&path)
            .is_some();
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&path);
        if removed {
            log::debug!("Stopped watching {}", path.display());
        }
        removed
    }

    /// Watched directories (canonical form).
    #[must_use]
    pub fn watched(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        dirs.sort();
        dirs
    }

    /// State of the watch on `dir`.
    #[must_use]
    pub fn state_of(&self, dir: &Path) -> Option<WatchState> {
        self.watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&canonicalize_path(dir))
            .map(|w| w.tracker.state())
    }

    /// Run callbacks for every queued event. Returns how many ran.
    pub fn dispatch_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(event) = self.events.try_recv() {
            ran += usize::from(self.deliver(&event));
        }
        ran
    }

    /// Wait up to `timeout` for an event, then run it and anything else
    /// queued. Returns how many callbacks ran.
    pub fn dispatch_timeout(&self, timeout: Duration) -> usize {
        match self.events.recv_timeout(timeout) {
            Ok(event) => usize::from(self.deliver(&event)) + self.dispatch_pending(),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => 0,
        }
    }

    fn deliver(&self, event: &ChangeEvent) -> bool {
        let callback = {
            let callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
            match callbacks.get(&event.path) {
                Some((id, callback)) if *id == event.id => Arc::clone(callback),
                _ => {
                    log::trace!("Dropping event for unwatched {}", event.path.display());
                    return false;
                }
            }
        };
        let mut callback = callback.lock().unwrap_or_else(PoisonError::into_inner);
        (callback.as_mut())(&event.path);
        true
    }

    /// Stop and join the polling thread. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("Monitor thread panicked");
            }
            log::debug!("Monitor stopped");
        }
    }
}

impl Drop for BackgroundFileMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn poll_loop(
    watches: &Mutex<HashMap<PathBuf, Watch>>,
    events: &Sender<ChangeEvent>,
    shutdown: &Receiver<()>,
    poll_interval: Duration,
    debounce: Duration,
) {
    let ticker = crossbeam_channel::tick(poll_interval);
    loop {
        let next_due = watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter_map(|w| w.tracker.deadline(debounce))
            .min();
        let timer = next_due.map_or_else(crossbeam_channel::never, crossbeam_channel::at);

        select! {
            recv(shutdown) -> _ => break,
            recv(ticker) -> _ => poll_once(watches),
            recv(timer) -> _ => {}
        }

        let now = Instant::now();
        let mut guard = watches.lock().unwrap_or_else(PoisonError::into_inner);
        for (path, watch) in guard.iter_mut() {
            if watch.tracker.fire_if_due(now, debounce) {
                log::debug!("Change settled in {}", path.display());
                let _ = events.send(ChangeEvent {
                    path: path.clone(),
                    id: watch.id,
                });
            }
        }
    }
}

/// Stat every watched directory and feed the trackers.
fn poll_once(watches: &Mutex<HashMap<PathBuf, Watch>>) {
    let targets: Vec<(PathBuf, u64)> = watches
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|(path, w)| (path.clone(), w.id))
        .collect();

    // Directory listing happens without the lock held.
    let stamps: Vec<(PathBuf, u64, Option<f64>)> = targets
        .into_iter()
        .map(|(path, id)| {
            let stamp = directory_stamp(&path);
            (path, id, stamp)
        })
        .collect();

    let now = Instant::now();
    let mut guard = watches.lock().unwrap_or_else(PoisonError::into_inner);
    for (path, id, stamp) in stamps {
        if let Some(watch) = guard.get_mut(&path) {
            if watch.id == id {
                watch.tracker.observe(stamp, now);
            }
        }
    }
}
