//! Image encoding: `DynamicImage` → JPEG bytes.
//!
//! Rendered pages are stored as JPEG because the assembler can embed JPEG
//! data in a PDF verbatim (`DCTDecode`), so the size of every shard follows
//! directly from the quality chosen here. Alpha is flattened first since
//! JPEG has no transparency.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageError};
use tracing::debug;

/// Encode an image as a baseline JPEG at `quality` (1–100).
///
/// Grayscale images stay single-channel; everything else is written as RGB.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));

    match img {
        DynamicImage::ImageLuma8(gray) => gray.write_with_encoder(encoder)?,
        other => other.to_rgb8().write_with_encoder(encoder)?,
    }

    debug!(
        "Encoded {}x{} image → {} bytes JPEG (q={})",
        img.width(),
        img.height(),
        buf.len(),
        quality
    );
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma, Rgba, RgbaImage};

    #[test]
    fn encode_rgba_image_as_jpeg() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 128])));
        let bytes = encode_jpeg(&img, 90).expect("encode should succeed");
        assert_eq!(&bytes[..2], &[0xFF, 0xD8], "JPEG SOI marker");
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (10, 10));
    }

    #[test]
    fn grayscale_stays_single_channel() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 4, Luma([200])));
        let bytes = encode_jpeg(&img, 80).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.color(), image::ColorType::L8);
    }

    #[test]
    fn lower_quality_is_smaller() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(64, 64, |x, y| {
            Rgba([(x * 4) as u8, (y * 4) as u8, ((x ^ y) * 4) as u8, 255])
        }));
        let high = encode_jpeg(&img, 100).unwrap();
        let low = encode_jpeg(&img, 10).unwrap();
        assert!(low.len() < high.len());
    }
}
