//! Pluggable symbol-reading backends.

use image::GrayImage;

/// One raw candidate reported by a backend: decoded text plus the bounding
/// box of the symbol in the image it was read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawSymbol {
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl RawSymbol {
    /// Shift the bounding box, used when the symbol was read from a crop.
    pub fn offset(mut self, dx: i32, dy: i32) -> RawSymbol {
        self.x += dx;
        self.y += dy;
        self
    }
}

/// A symbol-decoding backend.
///
/// Implementations wrap external recognition libraries (or test fixtures)
/// and are treated as interchangeable: the adapter runs every enabled
/// backend on every pass and pools the results. Implementations must not
/// panic on undecodable input — an empty vector is the "nothing found"
/// answer.
pub trait SymbolReader: Send + Sync {
    /// Short backend name for log lines.
    fn name(&self) -> &str;

    /// Decode all symbols visible in `image`.
    fn read(&self, image: &GrayImage) -> Vec<RawSymbol>;
}
