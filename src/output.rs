//! Result types produced by the pipeline.
//!
//! Everything here is `Serialize` so the CLI can emit a whole run as JSON.

use crate::error::{PageError, SplitError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One temporary JPEG written by the renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedPage {
    /// 1-indexed source page number.
    pub page_num: usize,
    pub path: PathBuf,
    pub width_px: u32,
    pub height_px: u32,
    pub size_bytes: u64,
}

/// The intermediate PDF written by the assembler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyReport {
    pub path: PathBuf,
    /// Source page numbers contained in the intermediate PDF, in order.
    pub pages: Vec<usize>,
    /// Images that could not be converted.
    pub skipped: Vec<PageError>,
}

/// One output shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfo {
    /// 1-based shard number, as used in the file name.
    pub index: usize,
    pub path: PathBuf,
    /// Source page numbers in this shard, in order.
    pub pages: Vec<usize>,
    /// On-disk size measured after the last successful write.
    pub size_bytes: u64,
}

/// Result of the splitter stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SplitReport {
    pub shards: Vec<ShardInfo>,
    pub page_errors: Vec<PageError>,
}

impl SplitReport {
    /// Pages that reached a shard.
    pub fn written_pages(&self) -> usize {
        self.shards.iter().map(|s| s.pages.len()).sum()
    }
}

/// Basic document information, available without rendering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
    pub file_size_bytes: u64,
}

/// Timing and count statistics for a full run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SplitStats {
    /// Pages in the source document.
    pub source_pages: usize,
    /// Pages selected for processing.
    pub selected_pages: usize,
    pub rendered_pages: usize,
    pub assembled_pages: usize,
    pub written_pages: usize,
    pub shard_count: usize,
    pub render_duration_ms: u64,
    pub assemble_duration_ms: u64,
    pub split_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Result of a full render → assemble → split run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitOutput {
    pub shards: Vec<ShardInfo>,
    /// Soft failures from every stage, sorted by page number.
    pub page_errors: Vec<PageError>,
    pub metadata: DocumentMetadata,
    pub stats: SplitStats,
}

impl SplitOutput {
    /// Treat any soft page failure as an error.
    pub fn into_result(self) -> Result<Self, SplitError> {
        if self.page_errors.is_empty() {
            Ok(self)
        } else {
            Err(SplitError::PartialFailure {
                written: self.stats.written_pages,
                failed: self.page_errors.len(),
                total: self.stats.selected_pages,
            })
        }
    }
}
