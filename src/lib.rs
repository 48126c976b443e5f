//! # pdfsplit
//!
//! Split a PDF into shards that each stay under a size ceiling, by way of a
//! rasterised copy.
//!
//! Every page is rendered to a JPEG, the JPEGs are stitched back into one
//! image-only PDF, and that PDF is cut greedily into `split_1.pdf`,
//! `split_2.pdf`, … so that each file stops growing as soon as it reaches the
//! ceiling (4.3 MiB by default). Because every page is an image of known
//! quality, DPI and JPEG quality control how many pages fit in a shard.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     check the file exists and starts with %PDF
//!  ├─ 2. Render    rasterise pages via pdfium → temp_page_{n}.jpg
//!  ├─ 3. Assemble  one page per JPEG → temp_large.pdf        (lopdf)
//!  ├─ 4. Split     greedy size-bounded shards → split_{n}.pdf (lopdf)
//!  └─ 5. Cleanup   page images and temp_large.pdf removed
//! ```
//!
//! Only rendering needs the native pdfium library. Assembly and splitting are
//! pure Rust and available on their own through [`assemble_images`] and
//! [`split_intermediate`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfsplit::{split_document, SplitConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SplitConfig::builder()
//!         .dpi(200)
//!         .max_shard_mib(4.3)
//!         .output_dir("split_pdfs")
//!         .build()?;
//!     let output = split_document("document.pdf", &config)?;
//!     for shard in &output.shards {
//!         println!("{}: {} pages, {} bytes", shard.path.display(), shard.pages.len(), shard.size_bytes);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfsplit` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdfsplit = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod scratch;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    PageSelection, RenderFailurePolicy, SplitConfig, SplitConfigBuilder,
    DEFAULT_INTERMEDIATE_PATH, DEFAULT_MAX_SHARD_BYTES, DEFAULT_OUTPUT_DIR,
};
pub use convert::{inspect, split_document, split_from_bytes};
pub use error::{PageError, SplitError};
pub use output::{
    AssemblyReport, DocumentMetadata, RenderedPage, ShardInfo, SplitOutput, SplitReport,
    SplitStats,
};
pub use pipeline::assemble::{assemble_images, image_page_document};
pub use pipeline::split::split_intermediate;
pub use progress::{NoopProgressCallback, ProgressCallback, SplitProgressCallback, Stage};
