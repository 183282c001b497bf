//! RustThumb - thumbnail cache and background generation pipeline
//!
//! A disk-backed, memory-LRU thumbnail cache keyed by canonical path and
//! size, fed by a multi-format generation pipeline (images, video, audio,
//! text, PDF, APK, ISO), a bounded precache scheduler with cooperative
//! cancellation, and a debounced directory monitor.
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use rustthumb::cache::ThumbnailCache;
//! use rustthumb::cancel::CancelToken;
//! use rustthumb::generate::{CapabilitySet, GenerationPipeline};
//! use rustthumb::precache::PrecacheScheduler;
//! use rustthumb::progress::NoProgress;
//!
//! # fn main() -> anyhow::Result<()> {
//! let cache = Arc::new(ThumbnailCache::new(Path::new("/tmp/thumbs"), 200)?);
//! let pipeline = Arc::new(GenerationPipeline::new(CapabilitySet::probe(None), 8));
//! let scheduler = PrecacheScheduler::new(Arc::clone(&cache), pipeline);
//!
//! scheduler.precache(Path::new("/home/me/Pictures"), 128, 4, &CancelToken::new(), &NoProgress)?;
//! let thumb = cache.get(Path::new("/home/me/Pictures/cat.jpg"), 128);
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod cache;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod generate;
pub mod logging;
pub mod monitor;
pub mod precache;
pub mod progress;

pub use app::run_app;
