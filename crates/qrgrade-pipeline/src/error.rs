//! Pipeline error type.

use std::path::PathBuf;

/// Errors surfaced by the orchestration layer.
///
/// Per-page decoding problems are not errors (a page with no codes simply
/// contributes nothing); this enum covers the conditions that must stop a
/// phase: unusable workspace, unreadable inputs, broken registries.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Repository(#[from] qrgrade_core::RepositoryError),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("{path:?} is not a grading workspace: {reason}")]
    NotAWorkspace { path: PathBuf, reason: String },

    #[error("required input missing: {0:?}")]
    MissingInput(PathBuf),

    #[error("page source failed on page {page}: {reason}")]
    PageSource { page: u32, reason: String },

    #[error("exam {exam} exceeds the configured format: {detail}")]
    FormatExceeded { exam: String, detail: String },

    #[error("malformed table {path:?} at line {line}: {raw:?}")]
    BadTable {
        path: PathBuf,
        line: usize,
        raw: String,
    },
}
