//! Fixed-level binarization for the threshold sweep.
//!
//! Sweep values are expressed as percent of full scale (the operator-facing
//! unit: `50` means "cut at mid-gray"), converted to a `u8` level here.

use image::GrayImage;

/// Convert a percent threshold (1..=100) to a grayscale level.
#[inline]
pub fn threshold_level(percent: u8) -> u8 {
    ((percent as u32 * 255) / 100).min(255) as u8
}

/// Binarize to a black/white image: pixels below `level` become 0, the rest
/// 255. Backends receive the result like any other raster.
pub fn binarize(gray: &GrayImage, level: u8) -> GrayImage {
    let mut out = gray.clone();
    for p in out.pixels_mut() {
        p.0[0] = if p.0[0] < level { 0 } else { 255 };
    }
    out
}

/// Dark-pixel mask at `level`, row-major. Used by the patch finder.
pub(crate) fn dark_mask(gray: &GrayImage, level: u8) -> Vec<bool> {
    gray.pixels().map(|p| p.0[0] < level).collect()
}
