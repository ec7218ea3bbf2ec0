//! Grading workspace directory layout.
//!
//! Every session lives in a directory named `qrgrading-DDDDDD`:
//!
//! ```text
//! qrgrading-210826/
//!   scanned/            input scan PDFs (required)
//!   scanned/pool/       per-page PNGs from the scan phase
//!   scanned/detected/   reoriented per-page JPEGs
//!   generated/qr/       generated.txt native registry (required to reconcile)
//!   results/            detected.txt and the grading tables
//!   results/xls/        raw / nia / feedback CSVs
//!   results/publish/    reconstructed per-exam output
//! ```
//!
//! Missing required inputs are fatal before any worker starts.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

const ROOT_PREFIX: &str = "qrgrading-";

#[derive(Clone, Debug)]
pub struct GradingWorkspace {
    root: PathBuf,
    date: String,
}

impl GradingWorkspace {
    /// Open an existing workspace, validating the root name and the required
    /// input directories, and creating the output directories.
    pub fn open(root: impl AsRef<Path>) -> Result<GradingWorkspace, PipelineError> {
        let root = root.as_ref().to_path_buf();
        let date = Self::date_from_root(&root)?;

        let ws = GradingWorkspace { root, date };
        for required in [ws.scanned_dir(), ws.generated_qr_dir()] {
            if !required.is_dir() {
                return Err(PipelineError::MissingInput(required));
            }
        }
        for out in [ws.pool_dir(), ws.detected_dir(), ws.xls_dir(), ws.publish_dir()] {
            fs::create_dir_all(out)?;
        }
        Ok(ws)
    }

    /// Create a fresh workspace skeleton (used by tests and simulation).
    pub fn create(root: impl AsRef<Path>) -> Result<GradingWorkspace, PipelineError> {
        let root = root.as_ref().to_path_buf();
        let date = Self::date_from_root(&root)?;
        let ws = GradingWorkspace { root, date };
        for dir in [
            ws.scanned_dir(),
            ws.pool_dir(),
            ws.detected_dir(),
            ws.generated_qr_dir(),
            ws.xls_dir(),
            ws.publish_dir(),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(ws)
    }

    fn date_from_root(root: &Path) -> Result<String, PipelineError> {
        let name = root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let date = name.strip_prefix(ROOT_PREFIX).ok_or_else(|| {
            PipelineError::NotAWorkspace {
                path: root.to_path_buf(),
                reason: format!("directory name must start with {ROOT_PREFIX:?}"),
            }
        })?;
        if date.len() != 6 || !date.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PipelineError::NotAWorkspace {
                path: root.to_path_buf(),
                reason: "expected a 6-digit session date after the prefix".to_owned(),
            });
        }
        Ok(date.to_owned())
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Session date encoded in the workspace name.
    #[inline]
    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn scanned_dir(&self) -> PathBuf {
        self.root.join("scanned")
    }

    pub fn pool_dir(&self) -> PathBuf {
        self.root.join("scanned").join("pool")
    }

    pub fn detected_dir(&self) -> PathBuf {
        self.root.join("scanned").join("detected")
    }

    pub fn generated_qr_dir(&self) -> PathBuf {
        self.root.join("generated").join("qr")
    }

    /// Pre-rendered native page rasters, used by the simulation mode.
    pub fn generated_pages_dir(&self) -> PathBuf {
        self.root.join("generated").join("pages")
    }

    /// Solution key produced by the exam generator.
    pub fn solutions_path(&self) -> PathBuf {
        self.root.join("generated").join("solutions.csv")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join("results")
    }

    pub fn xls_dir(&self) -> PathBuf {
        self.root.join("results").join("xls")
    }

    pub fn publish_dir(&self) -> PathBuf {
        self.root.join("results").join("publish")
    }

    /// The detected-code registry written after scanning/reconstruction.
    pub fn detected_txt(&self) -> PathBuf {
        self.results_dir().join("detected.txt")
    }

    /// The generation-time registry produced by the exam generator.
    pub fn generated_txt(&self) -> PathBuf {
        self.generated_qr_dir().join("generated.txt")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("qrgrade.json")
    }
}
