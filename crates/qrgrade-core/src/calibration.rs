//! Unit calibration between generation-time and scan-time coordinates.
//!
//! The exam generator records marker positions in the typesetter's scaled
//! units: an `sp`-derived integer where `65535` units equal one TeX point of
//! `0.351459804` mm (25.4 / 72.27). Scan-time coordinates are plain pixels
//! at the configured DPI. These constants are correctness-critical: changing
//! either silently shifts every reconciled native position.

use serde::{Deserialize, Serialize};

/// Generator encoder full scale: units per typesetter point.
pub const GENERATOR_FULL_SCALE: f64 = 65535.0;

/// Millimetres per typesetter point (25.4 mm / 72.27 pt).
pub const GENERATOR_UNIT_MM: f64 = 0.351459804;

/// Physical page height of the generated sheets (A4, mm). The generator's
/// y axis grows upwards from the bottom edge; scan rasters grow downwards,
/// so native y coordinates are flipped against this height.
pub const PAGE_HEIGHT_MM: f64 = 297.0;

/// Convert a generator-unit coordinate to millimetres.
#[inline]
pub fn generator_units_to_mm(units: f64) -> f64 {
    units / GENERATOR_FULL_SCALE * GENERATOR_UNIT_MM
}

/// Physical geometry shared by the decoder and the native-layout loader.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CodeGeometry {
    /// Raster resolution of the scanned input.
    pub dpi: f64,
    /// Printed side length of one code, in millimetres.
    pub code_size_mm: f64,
}

impl Default for CodeGeometry {
    fn default() -> Self {
        Self {
            dpi: 400.0,
            code_size_mm: 8.0,
        }
    }
}

impl CodeGeometry {
    /// Pixels per millimetre at the configured DPI.
    #[inline]
    pub fn pixels_per_mm(&self) -> f64 {
        self.dpi / 25.4
    }

    /// Expected code side length in pixels.
    #[inline]
    pub fn code_size_px(&self) -> i32 {
        (self.code_size_mm * self.pixels_per_mm()).round() as i32
    }

    /// Map a generator-unit x coordinate to scan pixels.
    #[inline]
    pub fn native_x_to_px(&self, units: f64) -> i32 {
        (generator_units_to_mm(units) * self.pixels_per_mm()) as i32
    }

    /// Map a generator-unit y coordinate to scan pixels, flipping the axis
    /// from bottom-up (typesetter) to top-down (raster).
    #[inline]
    pub fn native_y_to_px(&self, units: f64) -> i32 {
        let page_px = PAGE_HEIGHT_MM * self.pixels_per_mm();
        (page_px as i32) - ((generator_units_to_mm(units) * self.pixels_per_mm()) as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn one_point_converts_to_one_unit_step() {
        assert_relative_eq!(
            generator_units_to_mm(GENERATOR_FULL_SCALE),
            GENERATOR_UNIT_MM
        );
    }

    #[test]
    fn code_size_px_follows_dpi() {
        let geom = CodeGeometry {
            dpi: 400.0,
            code_size_mm: 8.0,
        };
        // 8 mm * 400/25.4 px/mm = 125.98 -> 126
        assert_eq!(geom.code_size_px(), 126);
    }

    #[test]
    fn native_y_is_flipped() {
        let geom = CodeGeometry::default();
        let page_px = (PAGE_HEIGHT_MM * geom.pixels_per_mm()) as i32;
        // the typeset origin is the bottom edge, which is the raster bottom
        assert_eq!(geom.native_y_to_px(0.0), page_px);
        assert!(geom.native_y_to_px(GENERATOR_FULL_SCALE * 100.0) < page_px);
    }
}
