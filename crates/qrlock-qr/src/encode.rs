//! QR symbol rendering
//!
//! Symbols are rendered at error-correction level H (about 30% of the
//! symbol can be damaged and still read), 8 pixels per module, with a
//! 6-module white border. Output is an RGB PNG, pure black on pure white.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{imageops, DynamicImage, GrayImage, ImageFormat, Luma};
use qrcode::{types::QrError as SymbolError, EcLevel, QrCode};
use tracing::debug;

use crate::error::{QrError, Result};

/// Pixels per module edge
pub const MODULE_PIXELS: u32 = 8;

/// White border width, in modules
pub const BORDER_MODULES: u32 = 6;

const DARK: Luma<u8> = Luma([0]);
const LIGHT: Luma<u8> = Luma([255]);

/// Renders transport strings as QR symbols
pub struct QrEncoder;

impl QrEncoder {
    /// Build the symbol matrix, choosing the smallest version that fits
    fn symbol(payload: &str) -> Result<QrCode> {
        QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::H).map_err(|e| match e {
            SymbolError::DataTooLong => QrError::Capacity(format!(
                "{} bytes at error correction level H",
                payload.len()
            )),
            other => QrError::Encode(other.to_string()),
        })
    }

    /// Render the payload to a bordered grayscale bitmap
    pub fn render(payload: &str) -> Result<GrayImage> {
        let code = Self::symbol(payload)?;

        let symbol = code
            .render::<Luma<u8>>()
            .quiet_zone(false)
            .module_dimensions(MODULE_PIXELS, MODULE_PIXELS)
            .dark_color(DARK)
            .light_color(LIGHT)
            .build();

        let border = BORDER_MODULES * MODULE_PIXELS;
        let mut canvas = GrayImage::from_pixel(
            symbol.width() + 2 * border,
            symbol.height() + 2 * border,
            LIGHT,
        );
        imageops::replace(&mut canvas, &symbol, i64::from(border), i64::from(border));

        debug!(
            "Rendered QR version {:?} ({} modules) as {}x{} px",
            code.version(),
            code.width(),
            canvas.width(),
            canvas.height()
        );
        Ok(canvas)
    }

    /// Render the payload as RGB PNG bytes
    pub fn encode_png(payload: &str) -> Result<Vec<u8>> {
        let canvas = Self::render(payload)?;
        let rgb = DynamicImage::ImageLuma8(canvas).to_rgb8();

        let mut png_bytes = Vec::new();
        DynamicImage::ImageRgb8(rgb).write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)?;
        Ok(png_bytes)
    }

    /// Write the PNG to `qr_<8 hex>.png` inside `dir` and return its path.
    ///
    /// The caller owns the file and is responsible for reclaiming it.
    pub fn write_png(payload: &str, dir: &Path) -> Result<PathBuf> {
        let png_bytes = Self::encode_png(payload)?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let path = dir.join(format!("qr_{}.png", &id[..8]));
        std::fs::write(&path, png_bytes)?;
        Ok(path)
    }

    /// Render using Unicode half blocks for terminal display
    pub fn to_unicode(payload: &str) -> Result<String> {
        let code = Self::symbol(payload)?;
        let colors = code.to_colors();
        let width = code.width();
        let quiet = 2;
        let total = width + 2 * quiet;

        let dark = |x: usize, y: usize| -> bool {
            if x < quiet || y < quiet || x >= width + quiet || y >= width + quiet {
                return false;
            }
            colors[(y - quiet) * width + (x - quiet)] == qrcode::Color::Dark
        };

        // Dark modules print as spaces so the symbol reads on dark terminals
        let mut result = String::new();
        for y in (0..total).step_by(2) {
            for x in 0..total {
                let ch = match (dark(x, y), dark(x, y + 1)) {
                    (true, true) => ' ',
                    (true, false) => '▄',
                    (false, true) => '▀',
                    (false, false) => '█',
                };
                result.push(ch);
            }
            result.push('\n');
        }
        Ok(result)
    }
}
