//! Orchestration of the paper-exam grading pipeline.
//!
//! The flow mirrors the life of a session: scanned PDFs are rasterized and
//! decoded page by page under a bounded worker pool (`scan`), pages are
//! reoriented and regrouped into per-exam documents (`reconstruct`), the
//! detected registry is reconciled against the generation-time layout
//! (`native` + `qrgrade_core::alignment`) and reduced to the grading tables
//! (`tables`), and finally the review overlay geometry is computed
//! (`annotate`). `simulate` feeds the same pipeline with synthetic input.
//!
//! PDF rendering and writing stay outside this crate, behind the
//! [`PageSource`] and [`ExamAssembler`] seams.

mod annotate;
mod config;
mod error;
mod native;
mod reconstruct;
mod scan;
mod semaphore;
mod simulate;
mod source;
mod tables;
mod workspace;

pub use annotate::{load_solutions, plan_annotations, Annotation, AnnotationPlan, MarkClass};
pub use config::{load_json, write_json, ExamFormat, GradingConfig};
pub use error::PipelineError;
pub use native::load_native_registry;
pub use reconstruct::{reconstruct_exams, ReconstructOptions};
pub use scan::{scan_pages, ScanOptions, ScanSummary};
pub use semaphore::{Semaphore, SemaphorePermit};
pub use simulate::{mark_random_answers, SimulatedSource};
pub use source::{ExamAssembler, NullAssembler, PageSource};
pub use tables::{
    feedback_csv_path, nia_csv_path, nia_digits, raw_csv_path, raw_fix_path, validate_format,
    write_feedback_csv, write_nia_csv, write_tables, RawTable,
};
pub use workspace::GradingWorkspace;
