//! Reconciling the native (as-generated) layout with a scanned page.
//!
//! Print/scan distortion shifts every marker by an offset that varies
//! smoothly along the page (skew, curl), and may also rescale the page as a
//! whole (print shrink, DPI mismatch). Two page anchors in opposite corners
//! are enough to model both effects:
//!
//! - the per-marker offset is interpolated linearly between the two anchors'
//!   observed-minus-native deltas (dx as a function of y, dy of x);
//! - the global scale is the ratio of observed to native inter-anchor
//!   distance.
//!
//! Either anchor may be missing: one anchor degrades to a constant offset,
//! none to a zero offset.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

use crate::code::Code;

/// One anchor seen both in the scan and in the native layout.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AnchorPair {
    pub observed: Point2<f64>,
    pub native: Point2<f64>,
}

impl AnchorPair {
    pub fn from_codes(observed: &Code, native: &Code) -> AnchorPair {
        let (ox, oy) = observed.center();
        let (nx, ny) = native.center();
        AnchorPair {
            observed: Point2::new(ox, oy),
            native: Point2::new(nx, ny),
        }
    }

    /// Observed-minus-native delta of this anchor.
    #[inline]
    pub fn delta(&self) -> Vector2<f64> {
        self.observed - self.native
    }
}

/// Offset model for one page, built from up to two anchor pairs.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct PageAlignment {
    pub upper: Option<AnchorPair>,
    pub lower: Option<AnchorPair>,
}

impl PageAlignment {
    pub fn new(upper: Option<AnchorPair>, lower: Option<AnchorPair>) -> PageAlignment {
        PageAlignment { upper, lower }
    }

    /// Identity alignment: zero offset everywhere.
    pub fn identity() -> PageAlignment {
        PageAlignment::default()
    }

    /// Offset to add to a native position at `p`.
    ///
    /// With both anchors, dx is interpolated in the target's y coordinate
    /// between the anchors' dx deltas, and dy in the target's x coordinate;
    /// positions outside the anchor span extrapolate along the same line.
    /// With one anchor the offset is that anchor's delta; with none it is
    /// zero.
    pub fn delta_at(&self, p: Point2<f64>) -> Vector2<f64> {
        match (self.upper, self.lower) {
            (Some(up), Some(dw)) => {
                let du = up.delta();
                let dd = dw.delta();

                let span_y = dw.observed.y - up.observed.y;
                let span_x = dw.observed.x - up.observed.x;

                // degenerate anchor placement collapses to the upper delta
                let dx = if span_y.abs() > f64::EPSILON {
                    (p.y - up.observed.y) * (dd.x - du.x) / span_y + du.x
                } else {
                    du.x
                };
                let dy = if span_x.abs() > f64::EPSILON {
                    (p.x - up.observed.x) * (dd.y - du.y) / span_x + du.y
                } else {
                    du.y
                };
                Vector2::new(dx, dy)
            }
            (Some(up), None) => up.delta(),
            (None, Some(dw)) => dw.delta(),
            (None, None) => Vector2::zeros(),
        }
    }

    /// Observed / native inter-anchor distance along y.
    ///
    /// This is the page-scale correction, independent of the positional
    /// offset. `None` unless both anchors are present and the native span is
    /// non-degenerate.
    pub fn page_ratio(&self) -> Option<f64> {
        let (up, dw) = (self.upper?, self.lower?);
        let native_span = (up.native.y - dw.native.y).abs();
        if native_span <= f64::EPSILON {
            return None;
        }
        let observed_span = (up.observed.y - dw.observed.y).abs();
        Some(observed_span / native_span)
    }

    /// Shift one native code onto its expected scanned position.
    pub fn apply_to_code(&self, code: &mut Code) {
        let (cx, cy) = code.center();
        let d = self.delta_at(Point2::new(cx, cy));
        code.translate(d.x.round() as i32, d.y.round() as i32);
    }

    /// Shift a whole native page layout onto the scanned page.
    pub fn apply_to_codes(&self, codes: &mut [Code]) {
        for code in codes {
            self.apply_to_code(code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pair(nx: f64, ny: f64, ox: f64, oy: f64) -> AnchorPair {
        AnchorPair {
            native: Point2::new(nx, ny),
            observed: Point2::new(ox, oy),
        }
    }

    #[test]
    fn two_anchor_offset_is_linear_in_position() {
        // upper anchor: dx = +5, lower anchor: dx = +15; same construction
        // on the other axis for dy
        let up = pair(100.0, 100.0, 105.0, 110.0);
        let dw = pair(900.0, 900.0, 915.0, 920.0);
        let alignment = PageAlignment::new(Some(up), Some(dw));

        // midpoint of the observed y span gets the midpoint dx
        let d = alignment.delta_at(Point2::new(510.0, 515.0));
        assert_relative_eq!(d.x, 10.0, epsilon = 1e-9);
        assert_relative_eq!(d.y, 15.0, epsilon = 1e-9);

        // at the anchors themselves the offset is exactly their delta
        let d_up = alignment.delta_at(up.observed);
        assert_relative_eq!(d_up.x, 5.0, epsilon = 1e-9);
        let d_dw = alignment.delta_at(dw.observed);
        assert_relative_eq!(d_dw.x, 15.0, epsilon = 1e-9);
    }

    #[test]
    fn extrapolation_follows_the_same_line() {
        let up = pair(100.0, 100.0, 105.0, 100.0);
        let dw = pair(100.0, 900.0, 115.0, 900.0);
        let alignment = PageAlignment::new(Some(up), Some(dw));

        // 400 above the upper anchor: dx = 5 - 400 * (10/800) = 0
        let d = alignment.delta_at(Point2::new(100.0, -300.0));
        assert_relative_eq!(d.x, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn single_anchor_offset_is_constant() {
        let up = pair(100.0, 100.0, 105.0, 103.0);
        let alignment = PageAlignment::new(Some(up), None);

        for (x, y) in [(0.0, 0.0), (500.0, 700.0), (2000.0, 1.0)] {
            let d = alignment.delta_at(Point2::new(x, y));
            assert_relative_eq!(d.x, 5.0, epsilon = 1e-9);
            assert_relative_eq!(d.y, 3.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn no_anchor_offset_is_zero() {
        let alignment = PageAlignment::identity();
        let d = alignment.delta_at(Point2::new(123.0, 456.0));
        assert_eq!(d, Vector2::zeros());
    }

    #[test]
    fn page_ratio_compares_anchor_spans() {
        let up = pair(100.0, 100.0, 100.0, 110.0);
        let dw = pair(100.0, 900.0, 100.0, 830.0);
        let alignment = PageAlignment::new(Some(up), Some(dw));

        // observed span 720 over native span 800
        assert_relative_eq!(alignment.page_ratio().unwrap(), 0.9, epsilon = 1e-9);

        // one anchor is not enough for a scale estimate
        assert!(PageAlignment::new(Some(up), None).page_ratio().is_none());
    }

    #[test]
    fn zero_delta_application_is_idempotent() {
        use crate::code::{Code, Payload};

        let up = pair(100.0, 100.0, 100.0, 100.0);
        let dw = pair(900.0, 900.0, 900.0, 900.0);
        let alignment = PageAlignment::new(Some(up), Some(dw));

        let mut code = Code::new(
            Payload::parse("210826001011").unwrap(),
            400,
            500,
            30,
            30,
            1,
            1,
        );
        let before = code.clone();
        alignment.apply_to_code(&mut code);
        alignment.apply_to_code(&mut code);
        assert_eq!(code, before);
    }
}
