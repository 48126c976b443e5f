//! PDF rasterisation: render selected pages to JPEG files via pdfium.
//!
//! Pages are rendered at `dpi / 72` scale, so a US Letter page at 300 DPI
//! becomes a 2550 × 3300 px image. Each image is written to the scratch space
//! as `temp_page_{n}.jpg` and registered for cleanup before it is written.
//!
//! PDFium is a native library bound at run time. [`bind_pdfium`] looks for it
//! at an explicit path, then `PDFIUM_LIB_PATH`, then wherever the system
//! loader finds it.

use crate::config::{PageSelection, RenderFailurePolicy, SplitConfig};
use crate::error::{PageError, SplitError};
use crate::output::{DocumentMetadata, RenderedPage};
use crate::pipeline::encode::encode_jpeg;
use crate::progress::Stage;
use crate::scratch::ScratchSpace;
use pdfium_render::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming the pdfium shared library (file or directory).
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Everything the renderer produced.
#[derive(Debug, Default)]
pub struct RenderOutcome {
    /// Pages in the source document.
    pub source_pages: usize,
    /// Pages the selection asked for.
    pub selected_pages: usize,
    /// Successfully rendered pages, in page order.
    pub pages: Vec<RenderedPage>,
    /// Pages that failed and were skipped.
    pub errors: Vec<PageError>,
}

/// Bind to the pdfium shared library.
///
/// `library` may name the library file itself or the directory holding it.
pub fn bind_pdfium(library: Option<&Path>) -> Result<Pdfium, SplitError> {
    let explicit = library
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from));

    let bindings = match explicit {
        Some(path) => {
            let lib = if path.is_dir() {
                PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(&path))
            } else {
                path
            };
            debug!("Binding pdfium from {}", lib.display());
            Pdfium::bind_to_library(&lib).map_err(|e| {
                SplitError::PdfiumBindingFailed(format!("{}: {:?}", lib.display(), e))
            })?
        }
        None => {
            debug!("Binding pdfium from the system library path");
            Pdfium::bind_to_system_library()
                .map_err(|e| SplitError::PdfiumBindingFailed(format!("{:?}", e)))?
        }
    };
    Ok(Pdfium::new(bindings))
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, SplitError> {
    pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                SplitError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                SplitError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            SplitError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}

/// Renders single pages of an open document to JPEG files.
pub trait PageRasteriser {
    /// Pages in the document.
    fn page_count(&self) -> usize;

    /// Render page `index` (0-based) and write it as a JPEG to `path`.
    fn render_page(&self, index: usize, path: &Path, quality: u8) -> Result<RenderedPage, String>;
}

/// [`PageRasteriser`] over the pages of a pdfium document.
struct PdfiumRasteriser<'d, 'a> {
    pages: &'d PdfPages<'a>,
    render_config: PdfRenderConfig,
}

impl PageRasteriser for PdfiumRasteriser<'_, '_> {
    fn page_count(&self) -> usize {
        self.pages.len() as usize
    }

    fn render_page(&self, index: usize, path: &Path, quality: u8) -> Result<RenderedPage, String> {
        let page = self.pages.get(index as u16).map_err(|e| format!("{:?}", e))?;
        let bitmap = page
            .render_with_config(&self.render_config)
            .map_err(|e| format!("{:?}", e))?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            index + 1,
            image.width(),
            image.height()
        );

        let jpeg =
            encode_jpeg(&image, quality).map_err(|e| format!("JPEG encoding failed: {}", e))?;
        fs::write(path, &jpeg).map_err(|e| format!("cannot write {}: {}", path.display(), e))?;

        Ok(RenderedPage {
            page_num: index + 1,
            path: path.to_path_buf(),
            width_px: image.width(),
            height_px: image.height(),
            size_bytes: jpeg.len() as u64,
        })
    }
}

/// Rasterise the selected pages of `pdf_path` into `scratch`.
///
/// Per-page failures follow `config.render_failure`: skipped and recorded by
/// default, or fatal with [`RenderFailurePolicy::Abort`].
pub fn render_pages(
    pdfium: &Pdfium,
    pdf_path: &Path,
    config: &SplitConfig,
    scratch: &mut ScratchSpace,
) -> Result<RenderOutcome, SplitError> {
    let document = open_document(pdfium, pdf_path, config.password.as_deref())?;
    let rasteriser = PdfiumRasteriser {
        pages: document.pages(),
        render_config: PdfRenderConfig::new().scale_page_by_factor(config.dpi as f32 / 72.0),
    };
    info!("PDF loaded: {} pages", rasteriser.page_count());
    rasterise_pages(&rasteriser, config, scratch)
}

/// Run the per-page render loop over any [`PageRasteriser`].
///
/// Every image path is registered with `scratch` before the page is
/// rendered, so a half-written image is removed with the rest.
pub fn rasterise_pages<R: PageRasteriser>(
    rasteriser: &R,
    config: &SplitConfig,
    scratch: &mut ScratchSpace,
) -> Result<RenderOutcome, SplitError> {
    let total_pages = rasteriser.page_count();
    let indices = config.pages.to_indices(total_pages);
    if indices.is_empty() && total_pages > 0 && config.pages != PageSelection::All {
        return Err(SplitError::PageOutOfRange {
            selection: format!("{:?}", config.pages),
            total: total_pages,
        });
    }

    let selected = indices.len();
    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_stage_start(Stage::Render, selected);
    }

    let mut outcome = RenderOutcome {
        source_pages: total_pages,
        selected_pages: selected,
        ..Default::default()
    };

    for idx in indices {
        let page_num = idx + 1;
        let path = scratch.page_image_path(page_num);
        scratch.track(&path);

        match rasteriser.render_page(idx, &path, config.jpeg_quality) {
            Ok(rendered) => {
                info!("Page {} converted to {}", page_num, path.display());
                if let Some(cb) = cb {
                    cb.on_page_complete(Stage::Render, page_num, selected);
                }
                outcome.pages.push(rendered);
            }
            Err(detail) => match config.render_failure {
                RenderFailurePolicy::Skip => {
                    warn!("Skipping page {}: {}", page_num, detail);
                    if let Some(cb) = cb {
                        cb.on_page_error(Stage::Render, page_num, selected, &detail);
                    }
                    outcome.errors.push(PageError::RenderFailed {
                        page: page_num,
                        detail,
                    });
                }
                RenderFailurePolicy::Abort => {
                    return Err(SplitError::RasterisationFailed {
                        page: page_num,
                        detail,
                    });
                }
            },
        }
    }

    Ok(outcome)
}

/// Read document metadata without rendering anything.
pub fn read_metadata(
    pdfium: &Pdfium,
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, SplitError> {
    let document = open_document(pdfium, pdf_path, password)?;
    let metadata = document.metadata();

    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    Ok(DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
        file_size_bytes: fs::metadata(pdf_path).map(|m| m.len()).unwrap_or(0),
    })
}
