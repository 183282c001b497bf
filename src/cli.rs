//! Command-line interface definitions.
//!
//! # Example
//!
//! ```bash
//! # Thumbnail one file, writing the PNG
//! rustthumb get ~/Pictures/cat.jpg --size 96 --output cat.png
//!
//! # Warm the cache for a folder with 8 workers
//! rustthumb precache ~/Pictures --workers 8
//!
//! # Keep folders warm while they change (Ctrl+C to stop)
//! rustthumb -v watch ~/Pictures ~/Downloads
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Largest accepted thumbnail edge.
pub const MAX_THUMBNAIL_SIZE: u32 = 4096;

/// Thumbnail cache and generator for file browsers.
///
/// Thumbnails are cached in memory and on disk, keyed by canonical path and
/// size, and regenerated when the source file changes.
#[derive(Debug, Parser)]
#[command(name = "rustthumb")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (default: platform config dir/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Cache directory (overrides the configuration)
    #[arg(long, value_name = "PATH", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Get (or generate) the thumbnail for one file
    Get(GetArgs),
    /// Generate missing thumbnails for every file in a directory
    Precache(PrecacheArgs),
    /// Watch directories and re-precache them when they change
    Watch(WatchArgs),
    /// Empty the cache
    Clear(ClearArgs),
    /// Show cache occupancy
    Stats,
    /// Show which optional tools and fonts were found
    Capabilities,
    /// Print the effective configuration as TOML
    Config,
}

/// Arguments for `get`.
#[derive(Debug, Args)]
pub struct GetArgs {
    /// File to thumbnail
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Thumbnail edge length in pixels (default from configuration)
    #[arg(short, long, value_name = "N", value_parser = size_parser())]
    pub size: Option<u32>,

    /// Write the thumbnail as PNG to this file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Arguments for `precache`.
#[derive(Debug, Args)]
pub struct PrecacheArgs {
    /// Directory whose files should be thumbnailed (not recursive)
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Thumbnail edge length in pixels (default from configuration)
    #[arg(short, long, value_name = "N", value_parser = size_parser())]
    pub size: Option<u32>,

    /// Number of worker threads (default from configuration)
    #[arg(short, long, value_name = "N", value_parser = clap::value_parser!(usize))]
    pub workers: Option<usize>,
}

/// Arguments for `watch`.
#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Directories to watch
    #[arg(value_name = "DIR", required = true)]
    pub dirs: Vec<PathBuf>,

    /// Thumbnail edge length in pixels (default from configuration)
    #[arg(short, long, value_name = "N", value_parser = size_parser())]
    pub size: Option<u32>,
}

/// Arguments for `clear`.
#[derive(Debug, Args)]
pub struct ClearArgs {
    /// Only drop the in-memory layer (useful for embedders; a no-op across
    /// CLI runs)
    #[arg(long)]
    pub memory_only: bool,
}

fn size_parser() -> clap::builder::RangedI64ValueParser<u32> {
    clap::value_parser!(u32).range(1..=i64::from(MAX_THUMBNAIL_SIZE))
}
