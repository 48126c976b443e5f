//! Progress-callback trait for per-page pipeline events.
//!
//! Inject an [`Arc<dyn SplitProgressCallback>`] via
//! [`crate::config::SplitConfigBuilder::progress_callback`] to receive events
//! as each stage walks the document.
//!
//! # Example
//!
//! ```rust
//! use pdfsplit::{SplitConfig, SplitProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct ShardCounter {
//!     shards: AtomicUsize,
//! }
//!
//! impl SplitProgressCallback for ShardCounter {
//!     fn on_shard_complete(&self, index: usize, pages: usize, size_bytes: u64) {
//!         self.shards.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("shard {index}: {pages} pages, {size_bytes} bytes");
//!     }
//! }
//!
//! let counter = Arc::new(ShardCounter { shards: AtomicUsize::new(0) });
//!
//! let config = SplitConfig::builder()
//!     .progress_callback(counter as Arc<dyn SplitProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The pipeline stage an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Render,
    Assemble,
    Split,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Render => "Rendering",
            Stage::Assemble => "Assembling",
            Stage::Split => "Splitting",
        };
        f.pad(name)
    }
}

/// Called by the pipeline as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. The pipeline itself is single-threaded; the
/// `Send + Sync` bound lets hosts share one callback across runs.
pub trait SplitProgressCallback: Send + Sync {
    /// Called when a stage begins.
    ///
    /// # Arguments
    /// * `stage`: the stage starting
    /// * `total`: number of items (pages) the stage will attempt
    fn on_stage_start(&self, stage: Stage, total: usize) {
        let _ = (stage, total);
    }

    /// Called after a page made it through `stage`.
    ///
    /// `page_num` is the 1-indexed source page number.
    fn on_page_complete(&self, stage: Stage, page_num: usize, total: usize) {
        let _ = (stage, page_num, total);
    }

    /// Called when a page fails in `stage` and is skipped.
    fn on_page_error(&self, stage: Stage, page_num: usize, total: usize, error: &str) {
        let _ = (stage, page_num, total, error);
    }

    /// Called when a shard is closed (ceiling reached or input exhausted).
    ///
    /// # Arguments
    /// * `index`:      1-based shard number
    /// * `pages`:      pages in the shard
    /// * `size_bytes`: final on-disk size
    fn on_shard_complete(&self, index: usize, pages: usize, size_bytes: u64) {
        let _ = (index, pages, size_bytes);
    }

    /// Called once after the splitter finishes.
    ///
    /// # Arguments
    /// * `shards`:        number of shards written
    /// * `written_pages`: pages that reached a shard
    fn on_run_complete(&self, shards: usize, written_pages: usize) {
        let _ = (shards, written_pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl SplitProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::SplitConfig`].
pub type ProgressCallback = Arc<dyn SplitProgressCallback>;
