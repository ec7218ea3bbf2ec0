//! Seams toward the external PDF tooling.
//!
//! Rendering scanned PDFs to rasters and assembling reconstructed pages back
//! into per-exam documents both happen outside this crate. The pipeline only
//! sees these two traits; tests and the simulation mode provide in-memory
//! implementations.

use std::path::PathBuf;

use image::GrayImage;

use crate::error::PipelineError;

/// A paginated raster source (normally a rendered scan PDF).
pub trait PageSource: Sync {
    /// Total number of pages.
    fn page_count(&self) -> u32;

    /// Render one page (0-based) at the given resolution.
    fn rasterize(&self, page: u32, dpi: f64) -> Result<GrayImage, PipelineError>;
}

/// Consumer of reconstructed exams.
///
/// Receives the ordered, reoriented page images of one exam; a PDF-writing
/// implementation lives in the external tooling.
pub trait ExamAssembler {
    fn assemble(&mut self, exam: &str, pages: &[PathBuf]) -> Result<(), PipelineError>;
}

/// Assembler that only records what it was given. Used when reconstruction
/// runs for its side effects (reoriented page images, rotated registry).
#[derive(Default)]
pub struct NullAssembler {
    pub assembled: Vec<(String, usize)>,
}

impl ExamAssembler for NullAssembler {
    fn assemble(&mut self, exam: &str, pages: &[PathBuf]) -> Result<(), PipelineError> {
        self.assembled.push((exam.to_owned(), pages.len()));
        Ok(())
    }
}
