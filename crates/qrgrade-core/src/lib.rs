//! Core types and utilities for QR-coded exam sheets.
//!
//! This crate is intentionally small and purely geometric/textual. It does
//! *not* depend on any concrete symbol decoder or image type: a [`Code`] is
//! whatever a decoder reported, plus the operations needed to normalize its
//! page (orientation), reconcile it against the generation-time layout
//! (alignment) and persist it (repository codec).

mod alignment;
mod calibration;
mod code;
mod logger;
mod orientation;
mod repository;

pub use alignment::{AnchorPair, PageAlignment};
pub use calibration::{
    generator_units_to_mm, CodeGeometry, GENERATOR_FULL_SCALE, GENERATOR_UNIT_MM, PAGE_HEIGHT_MM,
};
pub use code::{Code, CodeKind, Payload, PayloadDetail, PayloadError};
pub use orientation::{resolve_rotation, rotated_page_size, Quadrant, Rotation};
pub use repository::{CodeFilter, CodeRepository, RepositoryError};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, set_phase};
