//! Composition root for the `rustthumb` binary.
//!
//! Wires configuration, the capability probe, the cache, the pipeline, the
//! scheduler and the monitor together for each subcommand.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bytesize::ByteSize;
use image::ImageFormat;

use crate::cache::ThumbnailCache;
use crate::cancel::{install_ctrlc_handler, CancelToken};
use crate::cli::{ClearArgs, Cli, Commands, GetArgs, PrecacheArgs, WatchArgs};
use crate::config::{Config, ConfigOverrides};
use crate::error::ExitCode;
use crate::generate::{CapabilitySet, GenerationPipeline};
use crate::logging::init_logging;
use crate::monitor::BackgroundFileMonitor;
use crate::precache::{PrecacheScheduler, PrecacheSummary};
use crate::progress::{NoProgress, TerminalProgress};

/// How long the watch loop blocks waiting for monitor events.
const WATCH_DISPATCH_WAIT: Duration = Duration::from_millis(200);

/// Run the CLI and return the process exit code.
///
/// # Errors
///
/// Unexpected failures (unreadable cache directory, bad arguments, ...).
/// "No thumbnail" and partial batches are exit codes, not errors.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    init_logging(cli.verbose, cli.quiet);

    let overrides = ConfigOverrides {
        cache_dir: cli.cache_dir.clone(),
        workers: match &cli.command {
            Commands::Precache(args) => args.workers,
            _ => None,
        },
    };
    let config = Config::load(cli.config.as_deref(), &overrides);
    log::debug!("Effective configuration: {:?}", config);

    match cli.command {
        Commands::Config => {
            let text = config.to_toml().context("Failed to render configuration")?;
            print!("{text}");
            Ok(ExitCode::Success)
        }
        Commands::Capabilities => {
            let caps = CapabilitySet::probe(config.font_path.as_deref());
            for (name, location) in caps.report() {
                match location {
                    Some(path) => println!("{name:<10} {}", path.display()),
                    None => println!("{name:<10} (not found)"),
                }
            }
            Ok(ExitCode::Success)
        }
        Commands::Stats => run_stats(&config),
        Commands::Clear(args) => run_clear(&config, &args),
        Commands::Get(args) => run_get(&config, &args),
        Commands::Precache(args) => run_precache(&config, &args, cli.quiet),
        Commands::Watch(args) => run_watch(&config, &args),
    }
}

fn open_cache(config: &Config) -> Result<Arc<ThumbnailCache>> {
    let cache = ThumbnailCache::open(config).with_context(|| {
        format!("Failed to open cache at {}", config.cache_root().display())
    })?;
    Ok(Arc::new(cache))
}

fn build_scheduler(config: &Config) -> Result<PrecacheScheduler> {
    let cache = open_cache(config)?;
    let caps = CapabilitySet::probe(config.font_path.as_deref());
    let pipeline = Arc::new(GenerationPipeline::new(caps, config.text_lines));
    Ok(PrecacheScheduler::new(cache, pipeline)
        .with_workers(config.workers)
        .with_include_hidden(config.include_hidden)
        .with_shutdown_wait(config.shutdown_wait()))
}

fn run_stats(config: &Config) -> Result<ExitCode> {
    let cache = open_cache(config)?;
    let stats = cache.stats().context("Failed to read cache directory")?;
    println!("Cache directory: {}", config.cache_root().display());
    println!("Entries:         {}", stats.disk_entries);
    println!("Size on disk:    {}", ByteSize::b(stats.disk_bytes));
    Ok(ExitCode::Success)
}

fn run_clear(config: &Config, args: &ClearArgs) -> Result<ExitCode> {
    let cache = open_cache(config)?;
    cache.clear_memory_cache();
    if args.memory_only {
        println!("Cleared in-memory thumbnails");
        return Ok(ExitCode::Success);
    }
    let removed = cache.clear_disk().context("Failed to clear cache directory")?;
    println!("Removed {removed} cached thumbnails");
    Ok(ExitCode::Success)
}

fn run_get(config: &Config, args: &GetArgs) -> Result<ExitCode> {
    if !args.path.exists() {
        bail!("No such file: {}", args.path.display());
    }
    let size = args.size.unwrap_or(config.default_size);
    let scheduler = build_scheduler(config)?;

    let thumbnail = match scheduler.get_or_generate(&args.path, size) {
        Ok(thumbnail) => thumbnail,
        Err(e) => {
            if e.is_unsupported() {
                log::info!("{}", e);
            } else {
                log::warn!("{}", e);
            }
            eprintln!("No thumbnail available for {}", args.path.display());
            return Ok(ExitCode::NoThumbnail);
        }
    };

    match &args.output {
        Some(out) => {
            thumbnail
                .save_with_format(out, ImageFormat::Png)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!("Wrote {}x{} thumbnail to {}", size, size, out.display());
        }
        None => println!(
            "{}x{} thumbnail cached for {}",
            thumbnail.width(),
            thumbnail.height(),
            args.path.display()
        ),
    }
    Ok(ExitCode::Success)
}

fn run_precache(config: &Config, args: &PrecacheArgs, quiet: bool) -> Result<ExitCode> {
    let size = args.size.unwrap_or(config.default_size);
    let cancel = install_ctrlc_handler().context("Failed to install Ctrl+C handler")?;
    let scheduler = build_scheduler(config)?;
    let progress = TerminalProgress::new(quiet);

    let summary = scheduler
        .precache(&args.dir, size, config.workers, &cancel, &progress)
        .with_context(|| format!("Failed to precache {}", args.dir.display()))?;

    if !quiet {
        print_summary(&args.dir, &summary);
    }
    Ok(exit_code_for(&summary))
}

fn run_watch(config: &Config, args: &WatchArgs) -> Result<ExitCode> {
    let size = args.size.unwrap_or(config.default_size);
    let cancel = install_ctrlc_handler().context("Failed to install Ctrl+C handler")?;
    let scheduler = build_scheduler(config)?;
    let mut monitor = BackgroundFileMonitor::new(config.poll_interval(), config.debounce())
        .context("Failed to start directory monitor")?;

    for dir in &args.dirs {
        refresh(&scheduler, dir, size, config.workers, &cancel);
        let (scheduler, cancel) = (scheduler.clone(), cancel.clone());
        monitor
            .add_directory(dir, move |changed: &Path| {
                log::info!("{} changed; refreshing thumbnails", changed.display());
                spawn_refresh(&scheduler, changed, size, &cancel);
            })
            .with_context(|| format!("Cannot watch {}", dir.display()))?;
    }

    let watched: Vec<PathBuf> = monitor.watched();
    log::info!("Watching {} directories; press Ctrl+C to stop", watched.len());
    while !cancel.is_cancelled() {
        monitor.dispatch_timeout(WATCH_DISPATCH_WAIT);
    }
    monitor.shutdown();
    Ok(ExitCode::Interrupted)
}

fn refresh(scheduler: &PrecacheScheduler, dir: &Path, size: u32, workers: usize, cancel: &CancelToken) {
    match scheduler.precache(dir, size, workers, cancel, &NoProgress) {
        Ok(summary) if summary.total > 0 => print_summary(dir, &summary),
        Ok(_) => log::debug!("{} is up to date", dir.display()),
        Err(e) => log::warn!("{}", e),
    }
}

/// Re-precache `dir` on a background thread so the dispatch loop keeps
/// serving other directories and Ctrl+C.
fn spawn_refresh(
    scheduler: &PrecacheScheduler,
    dir: &Path,
    size: u32,
    cancel: &CancelToken,
) -> Option<JoinHandle<()>> {
    let shown = dir.to_path_buf();
    let spawned = scheduler.precache_directory(
        dir,
        size,
        |_, _| {},
        move |result| match result {
            Ok(summary) if summary.total > 0 || summary.already_running => {
                print_summary(&shown, &summary);
            }
            Ok(_) => log::debug!("{} is up to date", shown.display()),
            Err(e) => log::warn!("{}", e),
        },
        cancel.clone(),
    );
    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::warn!("{}", e);
            None
        }
    }
}

fn print_summary(dir: &Path, summary: &PrecacheSummary) {
    if summary.already_running {
        println!("{}: a precache is already running", dir.display());
        return;
    }
    println!(
        "{}: {} generated, {} failed, {} unsupported, {} skipped ({} needed work)",
        dir.display(),
        summary.generated,
        summary.failed,
        summary.unsupported,
        summary.skipped_cancelled,
        summary.total
    );
}

/// Exit code for a finished batch.
#[must_use]
pub fn exit_code_for(summary: &PrecacheSummary) -> ExitCode {
    if summary.cancelled {
        ExitCode::Interrupted
    } else if summary.failed > 0 {
        ExitCode::PartialSuccess
    } else {
        ExitCode::Success
    }
}
