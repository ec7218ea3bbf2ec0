//! Pipeline configuration and JSON helpers.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use qrgrade_core::CodeGeometry;
use qrgrade_decode::DecodeParams;

use crate::error::PipelineError;

/// Answer-sheet format bounds derived from the `DDDDDDEEEQQA` template.
///
/// The template fixes the payload field widths (the parser enforces those);
/// this struct carries the content bounds a session is allowed to use.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExamFormat {
    /// 6-digit session date every payload must carry.
    pub date: String,
    /// Highest valid question number.
    #[serde(default = "default_questions")]
    pub questions: u8,
    /// Highest valid answer option.
    #[serde(default = "default_answers")]
    pub answers: u8,
}

fn default_questions() -> u8 {
    50
}

fn default_answers() -> u8 {
    4
}

impl ExamFormat {
    pub fn new(date: &str) -> ExamFormat {
        ExamFormat {
            date: date.to_owned(),
            questions: default_questions(),
            answers: default_answers(),
        }
    }
}

/// Full pipeline configuration, stored as `qrgrade.json` in the workspace.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GradingConfig {
    pub format: ExamFormat,
    #[serde(default)]
    pub geometry: CodeGeometry,
    #[serde(default)]
    pub decode: DecodeParams,
    /// Worker thread budget for the scan phase.
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Output scale for reconstructed pages (1.0 = keep raster size).
    #[serde(default = "default_resize")]
    pub resize: f64,
}

fn default_threads() -> usize {
    4
}

fn default_resize() -> f64 {
    1.0
}

impl GradingConfig {
    pub fn new(date: &str) -> GradingConfig {
        GradingConfig {
            format: ExamFormat::new(date),
            geometry: CodeGeometry::default(),
            decode: DecodeParams::default(),
            threads: default_threads(),
            resize: default_resize(),
        }
    }
}

/// Read a JSON value from disk.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, PipelineError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Write a JSON value to disk, pretty-printed.
pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<(), PipelineError> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qrgrade.json");

        let config = GradingConfig::new("210826");
        write_json(&path, &config).unwrap();
        let loaded: GradingConfig = load_json(&path).unwrap();

        assert_eq!(loaded.format, config.format);
        assert_eq!(loaded.threads, config.threads);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let json = r#"{ "format": { "date": "210826" } }"#;
        let config: GradingConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.format.questions, 50);
        assert_eq!(config.format.answers, 4);
        assert_eq!(config.threads, 4);
    }
}
