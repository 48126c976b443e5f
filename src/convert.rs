//! Whole-run entry points: render → assemble → split.
//!
//! Each stage runs to completion before the next starts. Temporary artefacts
//! (page images and the intermediate PDF) belong to a [`ScratchSpace`] that
//! is dropped when the run returns, whether it succeeded or not.

use crate::config::SplitConfig;
use crate::error::{PageError, SplitError};
use crate::output::{DocumentMetadata, SplitOutput, SplitStats};
use crate::pipeline::{assemble, input, render, split};
use crate::scratch::ScratchSpace;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info};

/// Rasterise `input`, rebuild it as an image-only PDF, and split that into
/// shards no larger than `config.max_shard_bytes` (except a single page that
/// is larger on its own).
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(SplitOutput)` on success, even if some pages were dropped along the
/// way (see [`SplitOutput::page_errors`], or call
/// [`SplitOutput::into_result`] to treat that as an error).
///
/// # Errors
/// Returns `Err(SplitError)` only for fatal errors:
/// - input missing, unreadable, not a PDF, corrupt, or locked
/// - pdfium cannot be bound
/// - no page survived rendering and assembly
/// - the intermediate PDF or the output directory cannot be written
pub fn split_document(
    input: impl AsRef<Path>,
    config: &SplitConfig,
) -> Result<SplitOutput, SplitError> {
    let total_start = Instant::now();
    let input = input.as_ref();
    info!("Starting split: {}", input.display());

    // ── Step 1: Validate input ───────────────────────────────────────────
    let pdf_path = input::resolve_local(input)?;
    input::ensure_distinct(&pdf_path, config)?;

    // ── Step 2: Bind pdfium, prepare scratch space ───────────────────────
    let pdfium = render::bind_pdfium(config.pdfium_library.as_deref())?;
    let mut scratch = ScratchSpace::new(config.work_dir.as_deref())?;
    scratch.track(&config.intermediate_path);
    debug!("Page images go to {}", scratch.image_dir().display());

    let metadata = render::read_metadata(&pdfium, &pdf_path, config.password.as_deref())?;
    info!("PDF has {} pages", metadata.page_count);

    // ── Step 3: Rasterise pages ──────────────────────────────────────────
    let render_start = Instant::now();
    let rendered = render::render_pages(&pdfium, &pdf_path, config, &mut scratch)?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!(
        "Rendered {} of {} pages in {}ms",
        rendered.pages.len(),
        rendered.selected_pages,
        render_duration_ms
    );

    // ── Step 4: Assemble the intermediate PDF ────────────────────────────
    let assemble_start = Instant::now();
    let images: Vec<(usize, PathBuf)> = rendered
        .pages
        .iter()
        .map(|p| (p.page_num, p.path.clone()))
        .collect();
    let assembly = assemble::assemble_images(&images, &config.intermediate_path, config)?;
    let assemble_duration_ms = assemble_start.elapsed().as_millis() as u64;

    if !config.intermediate_path.exists() {
        error!(
            "The intermediate PDF was not created: {}",
            config.intermediate_path.display()
        );
        return Err(SplitError::IntermediateMissing {
            path: config.intermediate_path.clone(),
        });
    }
    info!(
        "Large PDF created successfully: {}",
        config.intermediate_path.display()
    );

    // ── Step 5: Split into shards ────────────────────────────────────────
    let split_start = Instant::now();
    let report = split::split_labelled(
        &config.intermediate_path,
        Some(assembly.pages.as_slice()),
        config,
    )?;
    let split_duration_ms = split_start.elapsed().as_millis() as u64;

    // ── Step 6: Collect results ──────────────────────────────────────────
    let written_pages = report.written_pages();
    let stats = SplitStats {
        source_pages: rendered.source_pages,
        selected_pages: rendered.selected_pages,
        rendered_pages: rendered.pages.len(),
        assembled_pages: assembly.pages.len(),
        written_pages,
        shard_count: report.shards.len(),
        render_duration_ms,
        assemble_duration_ms,
        split_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    let page_errors = merge_page_errors([rendered.errors, assembly.skipped, report.page_errors]);

    if let Some(cb) = config.progress_callback.as_ref() {
        cb.on_run_complete(report.shards.len(), written_pages);
    }
    info!(
        "Split complete: {}/{} pages in {} shard(s) under {}, {}ms",
        written_pages,
        stats.selected_pages,
        stats.shard_count,
        config.output_dir.display(),
        stats.total_duration_ms
    );

    Ok(SplitOutput {
        shards: report.shards,
        page_errors,
        metadata,
        stats,
    })
    // `scratch` drops here and removes page images and the intermediate PDF.
}

/// Combine the soft failures of every stage, ordered by source page.
fn merge_page_errors<const N: usize>(stages: [Vec<PageError>; N]) -> Vec<PageError> {
    let mut errors: Vec<PageError> = stages.into_iter().flatten().collect();
    errors.sort_by_key(PageError::page);
    errors
}

/// Split PDF bytes held in memory.
///
/// The bytes are written to a managed [`tempfile`] that is removed when the
/// run returns.
///
/// # Example
/// ```rust,no_run
/// use pdfsplit::{split_from_bytes, SplitConfig};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("document.pdf")?;
/// let output = split_from_bytes(&bytes, &SplitConfig::default())?;
/// println!("{} shards", output.shards.len());
/// # Ok(())
/// # }
/// ```
pub fn split_from_bytes(bytes: &[u8], config: &SplitConfig) -> Result<SplitOutput, SplitError> {
    let mut tmp = tempfile::Builder::new()
        .prefix("pdfsplit-input-")
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| SplitError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| SplitError::Internal(format!("tempfile write: {e}")))?;
    // `tmp` is dropped (and the file deleted) when `split_document` returns
    split_document(tmp.path(), config)
}

/// Read PDF metadata without rendering or writing anything.
///
/// Uses `config.password` and `config.pdfium_library`.
pub fn inspect(
    input: impl AsRef<Path>,
    config: &SplitConfig,
) -> Result<DocumentMetadata, SplitError> {
    let pdf_path = input::resolve_local(input.as_ref())?;
    let pdfium = render::bind_pdfium(config.pdfium_library.as_deref())?;
    render::read_metadata(&pdfium, &pdf_path, config.password.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_input_fails_before_anything_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let config = SplitConfig::builder()
            .output_dir(dir.path().join("out"))
            .intermediate_path(dir.path().join("temp_large.pdf"))
            .build()
            .unwrap();
        let err = split_document(dir.path().join("missing.pdf"), &config).unwrap_err();
        assert!(matches!(err, SplitError::FileNotFound { .. }));
        assert!(!dir.path().join("out").exists());
        assert!(!dir.path().join("temp_large.pdf").exists());
    }

    #[test]
    fn intermediate_aliasing_the_input_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("doc.pdf");
        fs::write(&src, b"%PDF-1.7\n").unwrap();
        let config = SplitConfig::builder()
            .output_dir(dir.path().join("out"))
            .intermediate_path(&src)
            .build()
            .unwrap();
        let err = split_document(&src, &config).unwrap_err();
        assert!(matches!(err, SplitError::InvalidConfig(_)));
        assert!(src.exists(), "the input must never be touched");
    }

    #[test]
    fn intermediate_named_like_a_shard_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("doc.pdf");
        fs::write(&src, b"%PDF-1.7\n").unwrap();
        let out = dir.path().join("split_pdfs");
        let config = SplitConfig::builder()
            .output_dir(&out)
            .intermediate_path(out.join("split_1.pdf"))
            .build()
            .unwrap();
        let err = split_document(&src, &config).unwrap_err();
        assert!(matches!(err, SplitError::InvalidConfig(_)), "got {err:?}");
        assert!(!out.exists());
    }

    #[test]
    fn page_errors_are_ordered_by_page_across_stages() {
        let render = vec![PageError::RenderFailed {
            page: 7,
            detail: "x".into(),
        }];
        let assemble = vec![PageError::ConvertFailed {
            page: 2,
            detail: "x".into(),
        }];
        let split = vec![
            PageError::SaveFailed {
                page: 9,
                shard: 2,
                detail: "x".into(),
            },
            PageError::InsertFailed {
                page: 4,
                shard: 1,
                detail: "x".into(),
            },
        ];
        let pages: Vec<usize> = merge_page_errors([render, assemble, split])
            .iter()
            .map(PageError::page)
            .collect();
        assert_eq!(pages, vec![2, 4, 7, 9]);
    }

    #[test]
    fn non_pdf_bytes_are_rejected() {
        let err = split_from_bytes(b"PK\x03\x04zip", &SplitConfig::default()).unwrap_err();
        assert!(matches!(err, SplitError::NotAPdf { .. }));
    }
}
