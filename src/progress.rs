//! Precache progress reporting.
//!
//! [`PrecacheProgress`] is called from the scheduler's collector thread as
//! files finish. [`TerminalProgress`] draws an `indicatif` bar for the CLI;
//! [`FnProgress`] adapts a closure for embedders.

use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::precache::PrecacheSummary;

/// Receives precache progress.
///
/// Implementations must be cheap; they run between result deliveries.
pub trait PrecacheProgress: Send + Sync {
    /// The batch found `total` files needing work.
    fn on_start(&self, _total: usize) {}

    /// One file finished. `done` counts from 1.
    fn on_file(&self, done: usize, total: usize, path: &Path, ok: bool);

    /// The batch ended (normally or by cancellation).
    fn on_finish(&self, _summary: &PrecacheSummary) {}
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl PrecacheProgress for NoProgress {
    fn on_file(&self, _done: usize, _total: usize, _path: &Path, _ok: bool) {}
}

/// Forwards per-file progress to a closure.
pub struct FnProgress<F>(pub F);

impl<F> PrecacheProgress for FnProgress<F>
where
    F: Fn(usize, usize, &Path, bool) + Send + Sync,
{
    fn on_file(&self, done: usize, total: usize, path: &Path, ok: bool) {
        (self.0)(done, total, path, ok);
    }
}

/// Progress bar on stderr.
pub struct TerminalProgress {
    bar: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl TerminalProgress {
    /// A reporter; `quiet` disables all drawing.
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            quiet,
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }
}

impl PrecacheProgress for TerminalProgress {
    fn on_start(&self, total: usize) {
        if self.quiet {
            return;
        }
        let pb = ProgressBar::new(total as u64);
        pb.set_style(Self::style());
        pb.set_message("Generating thumbnails");
        pb.enable_steady_tick(Duration::from_millis(200));
        *self.bar.lock().unwrap_or_else(PoisonError::into_inner) = Some(pb);
    }

    fn on_file(&self, done: usize, _total: usize, path: &Path, ok: bool) {
        if let Some(pb) = self
            .bar
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            pb.set_position(done as u64);
            let name = truncate_path(&path.to_string_lossy(), 30);
            if ok {
                pb.set_message(name);
            } else {
                pb.set_message(format!("failed: {name}"));
            }
        }
    }

    fn on_finish(&self, summary: &PrecacheSummary) {
        if let Some(pb) = self
            .bar
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            if summary.cancelled {
                pb.abandon_with_message("Cancelled");
            } else {
                pb.finish_with_message("Done");
            }
        }
    }
}

/// Shorten a path for the progress message, keeping the file name.
#[must_use]
pub fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let count = file_name.chars().count();
    if count + 4 > max_len {
        let keep = max_len.saturating_sub(3);
        let tail: String = file_name.chars().skip(count.saturating_sub(keep)).collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}
