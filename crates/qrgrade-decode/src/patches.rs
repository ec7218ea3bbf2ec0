//! Patch-candidate extraction.
//!
//! Whole-image decoding misses markers that are partially degraded by print
//! noise. As a fallback, connected dark regions whose bounding box matches
//! the expected physical code footprint (± tolerance) are cut out and
//! re-submitted to the backends individually.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::threshold::dark_mask;

/// Geometry filter for patch candidates.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PatchParams {
    /// Expected code side length in pixels.
    pub code_size_px: i32,
    /// Accepted relative deviation from `code_size_px` (e.g. `0.25`).
    pub tolerance: f64,
}

impl PatchParams {
    fn side_range(&self) -> (i32, i32) {
        let tol = (self.code_size_px as f64 * self.tolerance).round() as i32;
        ((self.code_size_px - tol).max(1), self.code_size_px + tol)
    }
}

/// Bounding box of one patch candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n as u32).collect(),
        }
    }

    fn find(&mut self, x: u32) -> u32 {
        let mut root = x;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        // path compression
        let mut cur = x;
        while self.parent[cur as usize] != root {
            let next = self.parent[cur as usize];
            self.parent[cur as usize] = root;
            cur = next;
        }
        root
    }

    fn union(&mut self, x: u32, y: u32) {
        let rx = self.find(x);
        let ry = self.find(y);
        if rx != ry {
            self.parent[rx as usize] = ry;
        }
    }
}

/// Find dark connected regions sized like a printed code.
///
/// Two-pass 4/8-connectivity labeling over the dark mask at `level`,
/// followed by the footprint filter. The returned rectangles are in page
/// pixel coordinates, sorted top-to-bottom then left-to-right so that the
/// downstream pooling order is deterministic.
pub fn find_patch_candidates(gray: &GrayImage, level: u8, params: &PatchParams) -> Vec<PatchRect> {
    let width = gray.width() as usize;
    let height = gray.height() as usize;
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let mask = dark_mask(gray, level);
    let mut labels = vec![0u32; width * height];
    let mut next_label = 1u32;
    let mut uf = UnionFind::new(width * height + 1);

    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            if !mask[idx] {
                continue;
            }

            let mut neighbors = [0u32; 4];
            let mut n = 0;
            if x > 0 && mask[idx - 1] {
                neighbors[n] = labels[idx - 1];
                n += 1;
            }
            if y > 0 {
                let up = idx - width;
                if mask[up] {
                    neighbors[n] = labels[up];
                    n += 1;
                }
                if x > 0 && mask[up - 1] {
                    neighbors[n] = labels[up - 1];
                    n += 1;
                }
                if x + 1 < width && mask[up + 1] {
                    neighbors[n] = labels[up + 1];
                    n += 1;
                }
            }

            if n == 0 {
                labels[idx] = next_label;
                next_label += 1;
            } else {
                let min = *neighbors[..n].iter().min().unwrap_or(&0);
                labels[idx] = min;
                for &l in &neighbors[..n] {
                    if l != min {
                        uf.union(min, l);
                    }
                }
            }
        }
    }

    // second pass: bounding box per root label
    let mut boxes: std::collections::HashMap<u32, (i32, i32, i32, i32)> =
        std::collections::HashMap::new();
    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            if labels[idx] == 0 {
                continue;
            }
            let root = uf.find(labels[idx]);
            let entry = boxes
                .entry(root)
                .or_insert((x as i32, y as i32, x as i32, y as i32));
            entry.0 = entry.0.min(x as i32);
            entry.1 = entry.1.min(y as i32);
            entry.2 = entry.2.max(x as i32);
            entry.3 = entry.3.max(y as i32);
        }
    }

    let (min_side, max_side) = params.side_range();
    let mut out: Vec<PatchRect> = boxes
        .into_values()
        .filter_map(|(x0, y0, x1, y1)| {
            let w = x1 - x0 + 1;
            let h = y1 - y0 + 1;
            let side_ok = |s: i32| s >= min_side && s <= max_side;
            (side_ok(w) && side_ok(h)).then_some(PatchRect { x: x0, y: y0, w, h })
        })
        .collect();

    out.sort_by_key(|r| (r.y, r.x));
    out
}

/// Cut a patch (with margin) out of the page raster.
pub fn crop_patch(gray: &GrayImage, rect: &PatchRect, margin: i32) -> (GrayImage, i32, i32) {
    let x0 = (rect.x - margin).max(0);
    let y0 = (rect.y - margin).max(0);
    let x1 = (rect.x + rect.w + margin).min(gray.width() as i32);
    let y1 = (rect.y + rect.h + margin).min(gray.height() as i32);

    let crop = image::imageops::crop_imm(gray, x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)
        .to_image();
    (crop, x0, y0)
}
