//! Image loading for the decode cascade

use std::io::Cursor;

use image::{DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, ImageReader, RgbImage, RgbaImage};
use tracing::debug;

use crate::error::{QrError, Result};

/// Containers the fallback loader tries after the lenient PNG pass, in order
const FALLBACK_FORMATS: [ImageFormat; 5] = [
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::Bmp,
    ImageFormat::Tiff,
    ImageFormat::WebP,
];

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Sniff the container and decode with default limits
pub fn load_primary(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(QrError::from)
}

/// Decode with a separate, lenient reader.
///
/// PNG input goes through the `png` decoder with chunk checksums ignored, so
/// uploads with damaged CRCs still load. Anything else is tried against each
/// remaining container explicitly, with decoding limits lifted.
///
/// A successful result is normalized to grayscale and round-tripped through
/// an in-memory PNG so later stages see a plain 8-bit bitmap whatever the
/// source container carried.
pub fn load_fallback(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.starts_with(&PNG_SIGNATURE) {
        let image = load_lenient_png(bytes)?;
        debug!("Fallback loader read PNG with checksums ignored");
        return materialize(image);
    }

    let mut last_error = None;

    for format in FALLBACK_FORMATS {
        let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
        reader.no_limits();
        match reader.decode() {
            Ok(image) => {
                debug!("Fallback loader accepted bytes as {:?}", format);
                return materialize(image);
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error
        .map(QrError::from)
        .unwrap_or_else(|| QrError::Image("no decoder accepted the bytes".to_string())))
}

fn load_lenient_png(bytes: &[u8]) -> Result<DynamicImage> {
    let mut options = png::DecodeOptions::default();
    options.set_ignore_crc(true);
    let mut decoder = png::Decoder::new_with_options(Cursor::new(bytes), options);
    decoder.set_transformations(png::Transformations::normalize_to_color8());

    let mut reader = decoder.read_info()?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf)?;
    buf.truncate(info.buffer_size());

    let (width, height) = (info.width, info.height);
    let image = match info.color_type {
        png::ColorType::Grayscale => {
            GrayImage::from_raw(width, height, buf).map(DynamicImage::ImageLuma8)
        }
        png::ColorType::GrayscaleAlpha => {
            GrayAlphaImage::from_raw(width, height, buf).map(DynamicImage::ImageLumaA8)
        }
        png::ColorType::Rgb => RgbImage::from_raw(width, height, buf).map(DynamicImage::ImageRgb8),
        png::ColorType::Rgba => {
            RgbaImage::from_raw(width, height, buf).map(DynamicImage::ImageRgba8)
        }
        // Palettes are expanded by the transformations above
        png::ColorType::Indexed => None,
    };

    image.ok_or_else(|| {
        QrError::Image(format!(
            "unexpected PNG frame layout: {:?} {}x{}",
            info.color_type, width, height
        ))
    })
}

fn materialize(image: DynamicImage) -> Result<DynamicImage> {
    let gray = DynamicImage::ImageLuma8(image.to_luma8());
    let mut png = Vec::new();
    gray.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    image::load_from_memory_with_format(&png, ImageFormat::Png).map_err(QrError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn png_bytes(image: DynamicImage) -> Vec<u8> {
        let mut out = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    /// Flip one byte of the CRC that trails the first chunk of type `kind`
    fn corrupt_chunk_crc(png: &mut [u8], kind: &[u8; 4]) {
        let mut pos = PNG_SIGNATURE.len();
        while pos + 8 <= png.len() {
            let len = u32::from_be_bytes([png[pos], png[pos + 1], png[pos + 2], png[pos + 3]]) as usize;
            let crc_at = pos + 8 + len;
            if &png[pos + 4..pos + 8] == kind {
                png[crc_at] ^= 0xff;
                return;
            }
            pos = crc_at + 4;
        }
        panic!("no {:?} chunk", std::str::from_utf8(kind));
    }

    #[test]
    fn test_primary_loads_png() {
        let bytes = png_bytes(DynamicImage::ImageLuma8(GrayImage::from_pixel(
            10,
            10,
            Luma([7]),
        )));
        let image = load_primary(&bytes).unwrap();
        assert_eq!((image.width(), image.height()), (10, 10));
    }

    #[test]
    fn test_loaders_reject_garbage() {
        let garbage = b"definitely not an image".to_vec();
        assert!(load_primary(&garbage).is_err());
        assert!(load_fallback(&garbage).is_err());
    }

    #[test]
    fn test_fallback_materializes_grayscale() {
        let bytes = png_bytes(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            4,
            6,
            image::Rgb([255, 0, 0]),
        )));
        let image = load_fallback(&bytes).unwrap();
        assert!(matches!(image, DynamicImage::ImageLuma8(_)));
        assert_eq!((image.width(), image.height()), (4, 6));
    }

    #[test]
    fn test_fallback_reads_png_with_bad_crc() {
        let mut gray = GrayImage::from_pixel(12, 8, Luma([255]));
        gray.put_pixel(3, 2, Luma([0]));
        let mut bytes = png_bytes(DynamicImage::ImageLuma8(gray));
        corrupt_chunk_crc(&mut bytes, b"IDAT");

        assert!(load_primary(&bytes).is_err());
        let image = load_fallback(&bytes).unwrap().to_luma8();
        assert_eq!(image.dimensions(), (12, 8));
        assert_eq!(image.get_pixel(3, 2), &Luma([0]));
        assert_eq!(image.get_pixel(4, 2), &Luma([255]));
    }

    #[test]
    fn test_fallback_reads_rgba_png_with_bad_crc() {
        let rgba = image::RgbaImage::from_pixel(5, 5, image::Rgba([0, 0, 0, 255]));
        let mut bytes = png_bytes(DynamicImage::ImageRgba8(rgba));
        corrupt_chunk_crc(&mut bytes, b"IDAT");

        let image = load_fallback(&bytes).unwrap();
        assert!(matches!(image, DynamicImage::ImageLuma8(_)));
        assert_eq!(image.to_luma8().get_pixel(2, 2), &Luma([0]));
    }
}
