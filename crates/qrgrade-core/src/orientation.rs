//! Page orientation from anchor codes.
//!
//! Each generated page carries a primary page anchor in the north-east
//! corner and a secondary anchor in the south-west corner. Finding either
//! anchor in any other quadrant tells us which quarter-turn brings the page
//! back to canonical orientation; the same transform is then applied to the
//! raster and to every code's box coordinates.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::code::{Code, CodeKind};

/// Quadrant of a point relative to the page center.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quadrant {
    NorthWest,
    NorthEast,
    SouthWest,
    SouthEast,
}

impl Quadrant {
    /// Classify a point on a `width` × `height` page.
    pub fn of(x: f64, y: f64, width: u32, height: u32) -> Quadrant {
        let west = x < width as f64 / 2.0;
        let north = y < height as f64 / 2.0;
        match (north, west) {
            (true, true) => Quadrant::NorthWest,
            (true, false) => Quadrant::NorthEast,
            (false, true) => Quadrant::SouthWest,
            (false, false) => Quadrant::SouthEast,
        }
    }

    /// The point-reflected quadrant (180° around the page center).
    pub fn opposite(self) -> Quadrant {
        match self {
            Quadrant::NorthWest => Quadrant::SouthEast,
            Quadrant::NorthEast => Quadrant::SouthWest,
            Quadrant::SouthWest => Quadrant::NorthEast,
            Quadrant::SouthEast => Quadrant::NorthWest,
        }
    }
}

/// Rotation bringing a page to canonical orientation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    None,
    /// Quarter turn clockwise.
    Clockwise90,
    /// Quarter turn counter-clockwise.
    CounterClockwise90,
    Half,
}

impl Rotation {
    #[inline]
    pub fn is_identity(self) -> bool {
        self == Rotation::None
    }

    /// Whether this rotation swaps page width and height.
    #[inline]
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Clockwise90 | Rotation::CounterClockwise90)
    }
}

/// Page size after applying `rotation` to a `width` × `height` raster.
pub fn rotated_page_size(rotation: Rotation, width: u32, height: u32) -> (u32, u32) {
    if rotation.swaps_axes() {
        (height, width)
    } else {
        (width, height)
    }
}

/// Canonical corner for an anchor kind.
fn canonical_quadrant(kind: CodeKind) -> Option<Quadrant> {
    match kind {
        CodeKind::PageAnchorPrimary => Some(Quadrant::NorthEast),
        CodeKind::PageAnchorSecondary => Some(Quadrant::SouthWest),
        _ => None,
    }
}

/// Rotation that moves quadrant `found` onto quadrant `target`.
fn rotation_to(found: Quadrant, target: Quadrant) -> Rotation {
    use Quadrant::*;
    if found == target {
        return Rotation::None;
    }
    if found == target.opposite() {
        return Rotation::Half;
    }
    // one quarter turn left; clockwise rotation cycles NW -> NE -> SE -> SW
    let clockwise_next = match found {
        NorthWest => NorthEast,
        NorthEast => SouthEast,
        SouthEast => SouthWest,
        SouthWest => NorthWest,
    };
    if clockwise_next == target {
        Rotation::Clockwise90
    } else {
        Rotation::CounterClockwise90
    }
}

/// Infer the normalizing rotation from one page anchor.
///
/// Returns `Rotation::None` for non-anchor codes. The two anchor kinds live
/// in opposite corners, so their quadrant-to-rotation mappings are mirrored
/// automatically by targeting each kind's own canonical corner.
pub fn resolve_rotation(anchor: &Code, page_width: u32, page_height: u32) -> Rotation {
    let Some(target) = canonical_quadrant(anchor.kind()) else {
        debug!(
            "orientation requested for non-anchor code {}",
            anchor.payload.raw()
        );
        return Rotation::None;
    };

    let (cx, cy) = anchor.center();
    let found = Quadrant::of(cx, cy, page_width, page_height);
    rotation_to(found, target)
}

impl Rotation {
    /// Rotate one code box in place on a `page_width` × `page_height` page.
    ///
    /// Quarter turns swap the box's own width/height along with the page
    /// axes; the transform keeps the box top-left based in the rotated
    /// raster.
    pub fn apply_to_code(self, code: &mut Code, page_width: u32, page_height: u32) {
        let (w, h) = (page_width as i32, page_height as i32);
        let (x, y) = (code.x, code.y);
        match self {
            Rotation::None => {}
            Rotation::Half => {
                code.x = w - x - code.w;
                code.y = h - y - code.h;
            }
            Rotation::Clockwise90 => {
                code.x = h - y - code.h;
                code.y = x;
                std::mem::swap(&mut code.w, &mut code.h);
            }
            Rotation::CounterClockwise90 => {
                code.x = y;
                code.y = w - x - code.w;
                std::mem::swap(&mut code.w, &mut code.h);
            }
        }
    }

    /// Rotate every code of a page in place.
    pub fn apply_to_codes(self, codes: &mut [Code], page_width: u32, page_height: u32) {
        if self.is_identity() {
            return;
        }
        for code in codes {
            self.apply_to_code(code, page_width, page_height);
        }
    }
}
