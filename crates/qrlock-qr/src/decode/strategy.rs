//! Preprocessing strategies for the decode cascade
//!
//! Every strategy reduces the input to an 8-bit luminance bitmap, optionally
//! reshapes it, and hands it to the symbol reader.

use image::{imageops, imageops::FilterType, DynamicImage, GrayImage, Luma};
use imageproc::{
    contrast::{otsu_level, threshold, ThresholdType},
    distance_transform::Norm,
    filter::{box_filter, gaussian_blur_f32},
    morphology::close,
};
use tracing::trace;

use super::{DecodeStrategy, Stage};
use crate::error::{QrError, Result};

/// Largest image a rescale may produce, in pixels
pub const MAX_RESCALED_PIXELS: u64 = 40_000_000;

/// Smallest edge a rescale may produce (one version-1 symbol, one px/module)
pub const MIN_RESCALED_EDGE: u32 = 21;

/// Run the symbol reader over a luminance bitmap.
///
/// Returns the first grid whose payload decodes to a non-empty string.
pub fn read_symbol(gray: &GrayImage) -> Result<Option<String>> {
    let (width, height) = gray.dimensions();
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
        width as usize,
        height as usize,
        |x, y| gray.get_pixel(x as u32, y as u32).0[0],
    );

    let grids = prepared.detect_grids();
    trace!("Reader found {} candidate grid(s)", grids.len());

    let mut last_error = None;
    for grid in grids {
        match grid.decode() {
            Ok((_, content)) if !content.is_empty() => return Ok(Some(content)),
            Ok(_) => {}
            Err(e) => last_error = Some(e),
        }
    }

    match last_error {
        Some(e) => Err(QrError::Symbol(format!("{:?}", e))),
        None => Ok(None),
    }
}

/// Detection over native pixels, taking the darkest channel of each pixel
/// so colored modules still read as dark
pub struct Native;

impl DecodeStrategy for Native {
    fn name(&self) -> &str {
        "native"
    }

    fn stage(&self) -> Stage {
        Stage::Native
    }

    fn attempt(&self, image: &DynamicImage) -> Result<Option<String>> {
        let rgb = image.to_rgb8();
        let darkest = GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
            let [r, g, b] = rgb.get_pixel(x, y).0;
            Luma([r.min(g).min(b)])
        });
        read_symbol(&darkest)
    }
}

/// Detection over the luma conversion
pub struct Grayscale;

impl DecodeStrategy for Grayscale {
    fn name(&self) -> &str {
        "grayscale"
    }

    fn stage(&self) -> Stage {
        Stage::Grayscale
    }

    fn attempt(&self, image: &DynamicImage) -> Result<Option<String>> {
        read_symbol(&image.to_luma8())
    }
}

/// Binarization and denoising passes over the grayscale image
#[derive(Debug, Clone, Copy)]
pub enum Transform {
    FixedThreshold(u8),
    /// Local mean over a square of the given radius
    AdaptiveThreshold(u32),
    OtsuThreshold,
    /// Morphological close with a square of the given radius
    Close(u8),
    GaussianBlur(f32),
}

impl Transform {
    fn apply(&self, gray: &GrayImage) -> GrayImage {
        match *self {
            Transform::FixedThreshold(level) => threshold(gray, level, ThresholdType::Binary),
            Transform::AdaptiveThreshold(radius) => local_mean_threshold(gray, radius),
            Transform::OtsuThreshold => threshold(gray, otsu_level(gray), ThresholdType::Binary),
            Transform::Close(radius) => close(gray, Norm::LInf, radius),
            Transform::GaussianBlur(sigma) => gaussian_blur_f32(gray, sigma),
        }
    }
}

/// Pixels darker than the mean of their neighbourhood become black
fn local_mean_threshold(gray: &GrayImage, radius: u32) -> GrayImage {
    let mean = box_filter(gray, radius, radius);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] < mean.get_pixel(x, y).0[0] {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

pub struct Transformed {
    name: &'static str,
    transform: Transform,
}

impl Transformed {
    pub fn new(name: &'static str, transform: Transform) -> Self {
        Self { name, transform }
    }
}

impl DecodeStrategy for Transformed {
    fn name(&self) -> &str {
        self.name
    }

    fn stage(&self) -> Stage {
        Stage::Transform
    }

    fn attempt(&self, image: &DynamicImage) -> Result<Option<String>> {
        read_symbol(&self.transform.apply(&image.to_luma8()))
    }
}

/// Cubic resampling by a fixed factor
pub struct Rescale {
    name: String,
    factor: f32,
}

impl Rescale {
    pub fn new(factor: f32) -> Self {
        Self {
            name: format!("rescale-{:.1}", factor),
            factor,
        }
    }

    /// Target dimensions, or `None` when the result is out of bounds
    pub fn target(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        let w = (width as f32 * self.factor).round() as u32;
        let h = (height as f32 * self.factor).round() as u32;
        if w < MIN_RESCALED_EDGE || h < MIN_RESCALED_EDGE {
            return None;
        }
        if u64::from(w) * u64::from(h) > MAX_RESCALED_PIXELS {
            return None;
        }
        Some((w, h))
    }
}

impl DecodeStrategy for Rescale {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage(&self) -> Stage {
        Stage::Rescale
    }

    fn attempt(&self, image: &DynamicImage) -> Result<Option<String>> {
        let gray = image.to_luma8();
        let Some((w, h)) = self.target(gray.width(), gray.height()) else {
            trace!("{} skipped for {}x{}", self.name, gray.width(), gray.height());
            return Ok(None);
        };
        read_symbol(&imageops::resize(&gray, w, h, FilterType::CatmullRom))
    }
}

/// Photometric adjustments over the grayscale image
#[derive(Debug, Clone, Copy)]
pub enum Enhancement {
    /// Contrast change in percent
    Contrast(f32),
    /// Unsharp mask (sigma, threshold)
    Sharpen(f32, i32),
    /// Multiply every level by the factor, saturating at white
    Brightness(f32),
    Invert,
    /// Stretch the observed min..max range to the full 0..255 range
    Autocontrast,
}

impl Enhancement {
    fn apply(&self, gray: &GrayImage) -> GrayImage {
        match *self {
            Enhancement::Contrast(percent) => imageops::contrast(gray, percent),
            Enhancement::Sharpen(sigma, threshold) => imageops::unsharpen(gray, sigma, threshold),
            Enhancement::Brightness(factor) => scale_levels(gray, factor),
            Enhancement::Invert => {
                let mut out = gray.clone();
                imageops::invert(&mut out);
                out
            }
            Enhancement::Autocontrast => autocontrast(gray),
        }
    }
}

fn scale_levels(gray: &GrayImage, factor: f32) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = f32::from(gray.get_pixel(x, y).0[0]) * factor;
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

fn autocontrast(gray: &GrayImage) -> GrayImage {
    let (lo, hi) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    if hi <= lo {
        return gray.clone();
    }
    let span = f32::from(hi - lo);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y).0[0];
        Luma([((f32::from(v - lo) * 255.0) / span).round() as u8])
    })
}

pub struct Enhanced {
    name: &'static str,
    enhancement: Enhancement,
}

impl Enhanced {
    pub fn new(name: &'static str, enhancement: Enhancement) -> Self {
        Self { name, enhancement }
    }
}

impl DecodeStrategy for Enhanced {
    fn name(&self) -> &str {
        self.name
    }

    fn stage(&self) -> Stage {
        Stage::Enhance
    }

    fn attempt(&self, image: &DynamicImage) -> Result<Option<String>> {
        read_symbol(&self.enhancement.apply(&image.to_luma8()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::QrEncoder;

    #[test]
    fn test_read_symbol_on_rendered_code() {
        let gray = QrEncoder::render("read me").unwrap();
        assert_eq!(read_symbol(&gray).unwrap().as_deref(), Some("read me"));
    }

    #[test]
    fn test_read_symbol_on_blank_image() {
        let blank = GrayImage::from_pixel(200, 200, Luma([255]));
        assert_eq!(read_symbol(&blank).unwrap(), None);
    }

    #[test]
    fn test_native_reads_colored_modules() {
        let gray = QrEncoder::render("colored").unwrap();
        // Dark modules become saturated blue, light stay white
        let rgb = image::RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
            if gray.get_pixel(x, y).0[0] == 0 {
                image::Rgb([0, 0, 255])
            } else {
                image::Rgb([255, 255, 255])
            }
        });
        let image = DynamicImage::ImageRgb8(rgb);
        assert_eq!(Native.attempt(&image).unwrap().as_deref(), Some("colored"));
    }

    #[test]
    fn test_rescale_bounds() {
        let half = Rescale::new(0.5);
        assert_eq!(half.name(), "rescale-0.5");
        assert_eq!(half.target(400, 300), Some((200, 150)));
        assert_eq!(half.target(30, 30), None);

        let double = Rescale::new(2.0);
        assert_eq!(double.target(8000, 8000), None);
    }

    #[test]
    fn test_autocontrast_stretches_range() {
        let gray = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 100 } else { 150 }]));
        let out = autocontrast(&gray);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn test_brightness_is_multiplicative() {
        let gray = GrayImage::from_fn(4, 1, |x, _| Luma([[0, 50, 100, 240][x as usize]]));
        let out = Enhancement::Brightness(1.2).apply(&gray);
        let levels: Vec<u8> = out.pixels().map(|p| p.0[0]).collect();
        assert_eq!(levels, vec![0, 60, 120, 255]);
    }

    #[test]
    fn test_transforms_preserve_dimensions() {
        let gray = QrEncoder::render("dims").unwrap();
        for transform in [
            Transform::FixedThreshold(127),
            Transform::AdaptiveThreshold(5),
            Transform::OtsuThreshold,
            Transform::Close(1),
            Transform::GaussianBlur(0.8),
        ] {
            let out = transform.apply(&gray);
            assert_eq!(out.dimensions(), gray.dimensions(), "{:?}", transform);
        }
    }
}
