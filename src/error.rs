//! Error types for the pdfsplit library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SplitError`]: **Fatal**: the current stage cannot proceed at all
//!   (bad input file, wrong password, nothing to split, unwritable output).
//!   Returned as `Err(SplitError)` from the top-level `split_*` functions.
//!   Downstream stages are never invoked after one of these; temporary files
//!   are still removed.
//!
//! * [`PageError`]: **Non-fatal**: a single page failed to render, convert,
//!   or land in a shard, but every other page is fine. Collected into
//!   [`crate::output::SplitOutput::page_errors`] so callers can inspect
//!   partial success rather than losing the whole document to one bad page.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdfsplit library.
#[derive(Debug, Error)]
pub enum SplitError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The page selection matches none of the document's pages.
    #[error("Page selection {selection} matches none of the {total} pages")]
    PageOutOfRange { selection: String, total: usize },

    /// A page failed to rasterise and the run was configured to abort on it.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// The assembler converted zero images, so there is nothing to split.
    #[error("No pages added to the intermediate PDF ({attempted} image(s) attempted).\nCheck that the page images were rendered and converted successfully.")]
    NoPagesAssembled { attempted: usize },

    /// The intermediate PDF is not on disk when the splitter is about to run.
    #[error("The intermediate PDF was not created: '{path}'")]
    IntermediateMissing { path: PathBuf },

    /// The intermediate PDF could not be written.
    #[error("Failed to write intermediate PDF '{path}': {detail}")]
    IntermediateWriteFailed { path: PathBuf, detail: String },

    /// The output directory could not be created.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The directory for temporary page images could not be prepared.
    #[error("Failed to prepare work directory '{path}': {source}")]
    WorkDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Some pages were dropped along the way.
    ///
    /// Returned by [`crate::output::SplitOutput::into_result`] when the
    /// caller wants to treat any page failure as an error.
    #[error("{failed} page failure(s) during the run; {written}/{total} pages reached the output")]
    PartialFailure {
        written: usize,
        failed: usize,
        total: usize,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or run-time configuration validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium renders the source pages and must be available as a shared library.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium (or pass --pdfium-lib).\n\
  • Or install libpdfium where the system loader can find it.\n\
  • Prebuilt binaries: https://github.com/bblanchon/pdfium-binaries/releases\n\
  • --split-only does not need pdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// Page numbers are 1-indexed source page numbers, so a failure can be traced
/// back to the original document regardless of which stage reported it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PageError {
    /// Page rasterisation or JPEG encoding failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The page image could not be converted into a one-page PDF.
    #[error("Page {page}: image-to-PDF conversion failed: {detail}")]
    ConvertFailed { page: usize, detail: String },

    /// The page could not be copied into the shard accumulator.
    #[error("Page {page}: could not be added to shard {shard}: {detail}")]
    InsertFailed {
        page: usize,
        shard: usize,
        detail: String,
    },

    /// The shard holding this page could not be written to disk.
    #[error("Page {page}: saving shard {shard} failed: {detail}")]
    SaveFailed {
        page: usize,
        shard: usize,
        detail: String,
    },
}

impl PageError {
    /// The 1-indexed source page this error refers to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::ConvertFailed { page, .. }
            | PageError::InsertFailed { page, .. }
            | PageError::SaveFailed { page, .. } => *page,
        }
    }
}
