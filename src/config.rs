//! Configuration types for the render → assemble → split pipeline.
//!
//! Every knob lives in [`SplitConfig`], built via its [`SplitConfigBuilder`].
//! The size ceiling in particular is a plain field rather than a module
//! constant, so each call (and each test) can choose its own.

use crate::error::SplitError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default shard ceiling: 4.3 MiB, rounded up to a whole byte.
pub const DEFAULT_MAX_SHARD_BYTES: u64 = 4_508_877;

/// Default output directory for shards.
pub const DEFAULT_OUTPUT_DIR: &str = "split_pdfs";

/// Default path of the transient intermediate PDF.
pub const DEFAULT_INTERMEDIATE_PATH: &str = "temp_large.pdf";

/// Convert a size in MiB to a byte ceiling, rounding up.
///
/// ```rust
/// assert_eq!(pdfsplit::config::mib_to_bytes(4.3), pdfsplit::config::DEFAULT_MAX_SHARD_BYTES);
/// assert_eq!(pdfsplit::config::mib_to_bytes(1.0), 1_048_576);
/// ```
pub fn mib_to_bytes(mib: f64) -> u64 {
    (mib * 1024.0 * 1024.0).ceil().max(0.0) as u64
}

/// Configuration for a full run (or a single stage of one).
///
/// Built via [`SplitConfig::builder()`] or using [`SplitConfig::default()`].
///
/// # Example
/// ```rust
/// use pdfsplit::SplitConfig;
///
/// let config = SplitConfig::builder()
///     .dpi(150)
///     .jpeg_quality(85)
///     .max_shard_bytes(10 * 1024 * 1024)
///     .output_dir("out")
///     .build()
///     .unwrap();
/// assert_eq!(config.max_shard_bytes, 10 * 1024 * 1024);
/// ```
#[derive(Clone)]
pub struct SplitConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–600. Default: 150.
    ///
    /// Also used by the assembler to size each page: an image of `w` pixels
    /// becomes a page `w × 72 / dpi` points wide, so it prints at the size of
    /// the source page.
    pub dpi: u32,

    /// JPEG quality for rendered pages (1–100). Default: 95.
    pub jpeg_quality: u8,

    /// Shard size ceiling in bytes. Default: [`DEFAULT_MAX_SHARD_BYTES`].
    ///
    /// Checked after each page is written: a shard is closed as soon as its
    /// on-disk size reaches this value. A single page larger than the ceiling
    /// still gets a shard of its own.
    pub max_shard_bytes: u64,

    /// Directory receiving the numbered shards. Created if absent.
    pub output_dir: PathBuf,

    /// Path of the intermediate PDF. Removed at the end of every run.
    pub intermediate_path: PathBuf,

    /// Directory for temporary page images.
    ///
    /// `None` (default) uses a private temporary directory that disappears
    /// with the run. When set, only the images this run created are removed.
    pub work_dir: Option<PathBuf>,

    /// File-name prefix for shards: `{prefix}_{n}.pdf`. Default: `split`.
    pub shard_prefix: String,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Explicit path to the pdfium shared library.
    ///
    /// When `None`, `PDFIUM_LIB_PATH` is consulted, then the system library.
    pub pdfium_library: Option<PathBuf>,

    /// What to do when a single page fails to render. Default: [`RenderFailurePolicy::Skip`].
    pub render_failure: RenderFailurePolicy,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            jpeg_quality: 95,
            max_shard_bytes: DEFAULT_MAX_SHARD_BYTES,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            intermediate_path: PathBuf::from(DEFAULT_INTERMEDIATE_PATH),
            work_dir: None,
            shard_prefix: "split".to_string(),
            password: None,
            pdfium_library: None,
            render_failure: RenderFailurePolicy::default(),
            pages: PageSelection::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for SplitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitConfig")
            .field("dpi", &self.dpi)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("max_shard_bytes", &self.max_shard_bytes)
            .field("output_dir", &self.output_dir)
            .field("intermediate_path", &self.intermediate_path)
            .field("work_dir", &self.work_dir)
            .field("shard_prefix", &self.shard_prefix)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pdfium_library", &self.pdfium_library)
            .field("render_failure", &self.render_failure)
            .field("pages", &self.pages)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn SplitProgressCallback>"),
            )
            .finish()
    }
}

impl SplitConfig {
    /// Create a new builder for `SplitConfig`.
    pub fn builder() -> SplitConfigBuilder {
        SplitConfigBuilder {
            config: Self::default(),
        }
    }

    /// Path of shard number `index` (1-based) inside the output directory.
    pub fn shard_path(&self, index: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.pdf", self.shard_prefix, index))
    }
}

/// Builder for [`SplitConfig`].
#[derive(Debug)]
pub struct SplitConfigBuilder {
    config: SplitConfig,
}

impl SplitConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Shard ceiling in bytes. Zero is rejected by [`Self::build`].
    pub fn max_shard_bytes(mut self, bytes: u64) -> Self {
        self.config.max_shard_bytes = bytes;
        self
    }

    /// Shard ceiling in MiB (fractional values allowed, e.g. `4.3`).
    pub fn max_shard_mib(mut self, mib: f64) -> Self {
        self.config.max_shard_bytes = mib_to_bytes(mib);
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn intermediate_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.intermediate_path = path.into();
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    pub fn shard_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.shard_prefix = prefix.into();
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn render_failure(mut self, policy: RenderFailurePolicy) -> Self {
        self.config.render_failure = policy;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SplitConfig, SplitError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(SplitError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.jpeg_quality == 0 || c.jpeg_quality > 100 {
            return Err(SplitError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if c.max_shard_bytes == 0 {
            return Err(SplitError::InvalidConfig(
                "Shard size ceiling must be greater than zero".into(),
            ));
        }
        if c.shard_prefix.is_empty()
            || c.shard_prefix.contains(['/', '\\'])
        {
            return Err(SplitError::InvalidConfig(format!(
                "Shard prefix must be a plain file-name fragment, got {:?}",
                c.shard_prefix
            )));
        }
        if c.intermediate_path.as_os_str().is_empty() {
            return Err(SplitError::InvalidConfig(
                "Intermediate PDF path must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What the renderer does when a single page fails to rasterise.
///
/// The assembler and splitter always skip a bad page and carry on; the
/// renderer does the same by default so one broken page never costs the
/// rest of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RenderFailurePolicy {
    /// Record a [`crate::error::PageError`] and continue with the next page. (default)
    #[default]
    Skip,
    /// Stop the run with [`SplitError::RasterisationFailed`].
    Abort,
}

/// Specifies which pages of the source PDF to process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// All pages (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed; output is sorted and deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

impl FromStr for PageSelection {
    type Err = SplitError;

    /// Parse `all`, `5`, `3-15`, or `1,3,5,7`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let invalid = |msg: String| SplitError::InvalidConfig(msg);
        let parse_page = |p: &str| -> Result<usize, SplitError> {
            let page: usize = p
                .trim()
                .parse()
                .map_err(|_| invalid(format!("Invalid page number: '{}'", p.trim())))?;
            if page < 1 {
                return Err(invalid(format!(
                    "Pages are 1-indexed, minimum is 1 (got {})",
                    page
                )));
            }
            Ok(page)
        };

        if s == "all" {
            return Ok(PageSelection::All);
        }

        if let Some((start, end)) = s.split_once('-') {
            let start = parse_page(start)?;
            let end = parse_page(end)?;
            if start > end {
                return Err(invalid(format!(
                    "Invalid page range '{}-{}': start must be <= end",
                    start, end
                )));
            }
            return Ok(PageSelection::Range(start, end));
        }

        if s.contains(',') {
            let pages = s
                .split(',')
                .map(parse_page)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(PageSelection::Set(pages));
        }

        Ok(PageSelection::Single(parse_page(&s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_configuration() {
        let c = SplitConfig::default();
        assert_eq!(c.dpi, 150);
        assert_eq!(c.max_shard_bytes, DEFAULT_MAX_SHARD_BYTES);
        assert_eq!(c.output_dir, PathBuf::from("split_pdfs"));
        assert_eq!(c.intermediate_path, PathBuf::from("temp_large.pdf"));
        assert_eq!(c.render_failure, RenderFailurePolicy::Skip);
    }

    #[test]
    fn ceiling_is_4_3_mib_rounded_up() {
        let exact = 4.3 * 1024.0 * 1024.0;
        assert!((DEFAULT_MAX_SHARD_BYTES as f64) >= exact);
        assert!((DEFAULT_MAX_SHARD_BYTES as f64) - exact < 1.0);
    }

    #[test]
    fn builder_clamps_and_validates() {
        let c = SplitConfig::builder()
            .dpi(10)
            .jpeg_quality(0)
            .build()
            .unwrap();
        assert_eq!(c.dpi, 72);
        assert_eq!(c.jpeg_quality, 1);

        let err = SplitConfig::builder().max_shard_bytes(0).build();
        assert!(matches!(err, Err(SplitError::InvalidConfig(_))));

        let err = SplitConfig::builder().shard_prefix("a/b").build();
        assert!(matches!(err, Err(SplitError::InvalidConfig(_))));
    }

    #[test]
    fn shard_path_uses_prefix_and_index() {
        let c = SplitConfig::builder()
            .output_dir("out")
            .shard_prefix("part")
            .build()
            .unwrap();
        assert_eq!(c.shard_path(3), PathBuf::from("out").join("part_3.pdf"));
    }

    #[test]
    fn debug_redacts_password() {
        let c = SplitConfig::builder().password("hunter2").build().unwrap();
        let dbg = format!("{:?}", c);
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(5), vec![0, 1, 2, 3, 4]);
        assert_eq!(PageSelection::Single(3).to_indices(5), vec![2]);
        assert_eq!(PageSelection::Single(6).to_indices(5), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 4).to_indices(5), vec![1, 2, 3]);
        assert_eq!(PageSelection::Range(4, 99).to_indices(5), vec![3, 4]);
        assert_eq!(
            PageSelection::Set(vec![3, 1, 3]).to_indices(5),
            vec![0, 2]
        );
        assert!(PageSelection::All.to_indices(0).is_empty());
    }

    #[test]
    fn page_selection_parses() {
        assert_eq!("all".parse::<PageSelection>().unwrap(), PageSelection::All);
        assert_eq!(" ALL ".parse::<PageSelection>().unwrap(), PageSelection::All);
        assert_eq!("5".parse::<PageSelection>().unwrap(), PageSelection::Single(5));
        assert_eq!(
            "3-15".parse::<PageSelection>().unwrap(),
            PageSelection::Range(3, 15)
        );
        assert_eq!(
            "1, 3,5".parse::<PageSelection>().unwrap(),
            PageSelection::Set(vec![1, 3, 5])
        );
    }

    #[test]
    fn page_selection_rejects_bad_input() {
        for bad in ["0", "5-3", "x", "1,,2", "0-4"] {
            assert!(
                bad.parse::<PageSelection>().is_err(),
                "expected '{bad}' to be rejected"
            );
        }
    }
}
