//! Decoder adapter for scanned exam pages.
//!
//! Symbol decoding itself is external: any number of [`SymbolReader`]
//! backends can be plugged in, each returning raw `(payload, bounding box)`
//! candidates. This crate is the robustness layer around them — a grayscale
//! threshold sweep, patch-based recovery of markers missed by whole-image
//! passes, and deterministic pooling of the candidates from all passes into
//! one set of parsed [`qrgrade_core::Code`]s per page.

mod adapter;
mod backend;
mod patches;
mod threshold;

pub use adapter::{DecodeParams, PageDecoder, PageScan};
pub use backend::{RawSymbol, SymbolReader};
pub use patches::{find_patch_candidates, PatchParams, PatchRect};
pub use threshold::{binarize, threshold_level};
