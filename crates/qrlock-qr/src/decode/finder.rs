//! Finder-pattern heuristic
//!
//! Looks at the top-left corner of an image the way a finder pattern would
//! sit in a cleanly rendered symbol. A corner made of very few distinct gray
//! levels suggests a QR-like bitmap that none of the strategies could read.
//! This is diagnostic only and never yields content.

use image::DynamicImage;

/// Distinct gray levels at or below which the corner counts as binary
const MAX_LEVELS: usize = 3;

/// Side of the sampled square as a fraction of the shorter image edge
const CORNER_DIVISOR: u32 = 10;

/// Whether the top-left corner looks like a binary finder pattern
pub fn looks_like_qr(image: &DynamicImage) -> bool {
    let gray = image.to_luma8();
    let side = gray.width().min(gray.height()) / CORNER_DIVISOR;
    if side == 0 {
        return false;
    }

    let mut seen = [false; 256];
    let mut levels = 0;
    for y in 0..side {
        for x in 0..side {
            let value = gray.get_pixel(x, y).0[0] as usize;
            if !seen[value] {
                seen[value] = true;
                levels += 1;
                if levels > MAX_LEVELS {
                    return false;
                }
            }
        }
    }
    true
}
