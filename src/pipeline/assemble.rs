//! Assembly: page images → one multi-page intermediate PDF.
//!
//! Each image becomes a one-page PDF whose page is exactly the image at the
//! render resolution (`px × 72 / dpi` points), with the JPEG stream embedded
//! as a `DCTDecode` XObject. JPEGs in a colour space PDF readers understand
//! directly (gray or RGB) are embedded byte-for-byte; anything else is decoded
//! and re-encoded first. The one-page documents are then appended in order to
//! a [`PageAccumulator`] and the result written once at the end.
//!
//! A page that fails to convert is logged, recorded, and skipped. Zero
//! successful pages is fatal and leaves no file behind.

use crate::config::SplitConfig;
use crate::error::{PageError, SplitError};
use crate::output::AssemblyReport;
use crate::pipeline::compose::{ComposeError, PageAccumulator};
use crate::pipeline::encode::encode_jpeg;
use crate::progress::Stage;
use image::{DynamicImage, ImageFormat, ImageReader};
use lopdf::{dictionary, Document, Object, Stream};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a single image could not become a PDF page.
#[derive(Debug, Error)]
pub enum ImagePageError {
    #[error("cannot read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("image has zero width or height")]
    Empty,

    #[error(transparent)]
    Compose(#[from] ComposeError),
}

/// Pixel layout of the JPEG data that ends up in the PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JpegColour {
    Gray,
    Rgb,
}

impl JpegColour {
    fn pdf_name(self) -> &'static str {
        match self {
            JpegColour::Gray => "DeviceGray",
            JpegColour::Rgb => "DeviceRGB",
        }
    }
}

/// Build a one-page PDF that shows the image at `path` at its native size
/// for `dpi`.
pub fn image_page_document(
    path: &Path,
    dpi: u32,
    jpeg_quality: u8,
) -> Result<Document, ImagePageError> {
    let bytes = fs::read(path)?;
    let reader = ImageReader::new(Cursor::new(bytes.as_slice())).with_guessed_format()?;
    let format = reader.format();

    let passthrough = match (format, jpeg_component_count(&bytes)) {
        (Some(ImageFormat::Jpeg), Some(1)) => Some(JpegColour::Gray),
        (Some(ImageFormat::Jpeg), Some(3)) => Some(JpegColour::Rgb),
        _ => None,
    };

    let (width, height, colour, data) = match passthrough {
        Some(colour) => {
            let (w, h) = reader.into_dimensions()?;
            debug!("Embedding {} as-is ({}x{}, {:?})", path.display(), w, h, colour);
            (w, h, colour, bytes)
        }
        None => {
            let img = reader.decode()?;
            let colour = match img {
                DynamicImage::ImageLuma8(_) => JpegColour::Gray,
                _ => JpegColour::Rgb,
            };
            debug!("Re-encoding {} as JPEG ({:?})", path.display(), format);
            (img.width(), img.height(), colour, encode_jpeg(&img, jpeg_quality)?)
        }
    };

    if width == 0 || height == 0 {
        return Err(ImagePageError::Empty);
    }
    Ok(single_image_document(width, height, colour, data, dpi))
}

fn single_image_document(
    width: u32,
    height: u32,
    colour: JpegColour,
    jpeg: Vec<u8>,
    dpi: u32,
) -> Document {
    let page_w = width as f32 * 72.0 / dpi as f32;
    let page_h = height as f32 * 72.0 / dpi as f32;

    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => colour.pdf_name(),
            "BitsPerComponent" => 8_i64,
            "Filter" => "DCTDecode",
        },
        jpeg,
    ));

    let content = format!("q\n{page_w:.4} 0 0 {page_h:.4} 0 0 cm\n/Im0 Do\nQ\n");
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::from(page_w),
            Object::from(page_h),
        ],
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
        "Contents" => content_id,
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1_i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

/// Number of colour components declared in the JPEG frame header.
///
/// Walks the marker segments up to the first SOFn. Returns `None` for data
/// that is not a well-formed JPEG prefix.
fn jpeg_component_count(data: &[u8]) -> Option<u8> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }
    let mut i = 2;
    while i + 4 <= data.len() {
        if data[i] != 0xFF {
            return None;
        }
        let marker = data[i + 1];
        match marker {
            // Fill byte.
            0xFF => i += 1,
            // Standalone markers carry no length.
            0x01 | 0xD0..=0xD8 => i += 2,
            // SOS or EOI before any frame header.
            0xD9 | 0xDA => return None,
            // SOFn: length(2) precision(1) height(2) width(2) components(1).
            0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => {
                return data.get(i + 9).copied();
            }
            _ => {
                let len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
                i += 2 + len;
            }
        }
    }
    None
}

/// Combine page images into one PDF at `dest`, in the order given.
///
/// `images` pairs each 1-indexed source page number with its image file.
/// Images that cannot be converted are skipped and listed in
/// [`AssemblyReport::skipped`].
///
/// # Errors
/// * [`SplitError::NoPagesAssembled`] when no image converted; nothing is written.
/// * [`SplitError::IntermediateWriteFailed`] when `dest` cannot be written.
pub fn assemble_images<P: AsRef<Path>>(
    images: &[(usize, P)],
    dest: &Path,
    config: &SplitConfig,
) -> Result<AssemblyReport, SplitError> {
    let total = images.len();
    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_stage_start(Stage::Assemble, total);
    }

    let mut accumulator = PageAccumulator::new();
    let mut pages = Vec::with_capacity(total);
    let mut skipped = Vec::new();

    for (page_num, path) in images {
        let path = path.as_ref();
        let result = image_page_document(path, config.dpi, config.jpeg_quality)
            .and_then(|doc| {
                accumulator
                    .import_first_page(&doc)
                    .map_err(ImagePageError::from)
            });

        match result {
            Ok(_) => {
                debug!("Added {} as page {}", path.display(), accumulator.page_count());
                pages.push(*page_num);
                if let Some(cb) = cb {
                    cb.on_page_complete(Stage::Assemble, *page_num, total);
                }
            }
            Err(e) => {
                warn!("Error converting {} to PDF: {}", path.display(), e);
                let detail = e.to_string();
                if let Some(cb) = cb {
                    cb.on_page_error(Stage::Assemble, *page_num, total, &detail);
                }
                skipped.push(PageError::ConvertFailed {
                    page: *page_num,
                    detail,
                });
            }
        }
    }

    if accumulator.is_empty() {
        warn!("No pages were added to the PDF. The intermediate PDF will not be created.");
        return Err(SplitError::NoPagesAssembled { attempted: total });
    }

    accumulator
        .save_to_file(dest)
        .map_err(|e| SplitError::IntermediateWriteFailed {
            path: dest.to_path_buf(),
            detail: e.to_string(),
        })?;
    info!(
        "Combined PDF saved as: {} ({} pages)",
        dest.display(),
        pages.len()
    );

    Ok(AssemblyReport {
        path: dest.to_path_buf(),
        pages,
        skipped,
    })
}
