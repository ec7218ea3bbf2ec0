//! In-memory collection of decoded codes with the flat-text codec.
//!
//! The wire format is one code per line:
//! `payload,x,y,w,h,pdf_page,page`. A `0,0` size pair marks a native
//! (generation-time) entry whose position is still in generator units and
//! whose pixel footprint must be expanded from the physical code size at
//! load time; see [`CodeRepository::expand_native_units`].

use std::fs;
use std::io::Write;
use std::path::Path;

use log::warn;

use crate::calibration::CodeGeometry;
use crate::code::{Code, CodeKind, Payload};

/// Errors produced by the repository codec.
#[derive(thiserror::Error, Debug)]
pub enum RepositoryError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("line {line} of {path:?} has {got} fields, expected 7: {raw:?}")]
    BadFieldCount {
        path: String,
        line: usize,
        got: usize,
        raw: String,
    },
    #[error("line {line} of {path:?} has a non-numeric field: {raw:?}")]
    BadNumber {
        path: String,
        line: usize,
        raw: String,
    },
}

/// Wildcard filter over the repository.
///
/// Unset fields match everything. `kind` matching uses the parsed payload
/// kind, never the raw string.
#[derive(Clone, Debug, Default)]
pub struct CodeFilter<'a> {
    pub date: Option<&'a str>,
    pub exam: Option<&'a str>,
    pub page: Option<u32>,
    pub kind: Option<CodeKind>,
}

impl<'a> CodeFilter<'a> {
    pub fn exam(exam: &'a str) -> Self {
        CodeFilter {
            exam: Some(exam),
            ..CodeFilter::default()
        }
    }

    fn matches(&self, code: &Code) -> bool {
        if let Some(date) = self.date {
            if code.payload.date() != date {
                return false;
            }
        }
        if let Some(exam) = self.exam {
            if code.payload.exam() != exam {
                return false;
            }
        }
        if let Some(page) = self.page {
            if code.page != page {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if code.kind() != kind {
                return false;
            }
        }
        true
    }
}

/// Ordered sequence of [`Code`] values.
///
/// Scan tasks append in scheduling order, so the sequence order is not
/// meaningful; consumers must group explicitly by date/exam/page/kind.
#[derive(Clone, Debug, Default)]
pub struct CodeRepository {
    codes: Vec<Code>,
}

impl CodeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_codes(codes: Vec<Code>) -> Self {
        CodeRepository { codes }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn push(&mut self, code: Code) {
        self.codes.push(code);
    }

    pub fn extend(&mut self, codes: impl IntoIterator<Item = Code>) {
        self.codes.extend(codes);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Code> {
        self.codes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Code> {
        self.codes.iter_mut()
    }

    pub fn codes(&self) -> &[Code] {
        &self.codes
    }

    /// Subsequence matching all set filter fields.
    pub fn filter(&self, filter: &CodeFilter<'_>) -> CodeRepository {
        CodeRepository {
            codes: self
                .codes
                .iter()
                .filter(|c| filter.matches(c))
                .cloned()
                .collect(),
        }
    }

    /// First code matching the filter, if any.
    pub fn find_first(&self, filter: &CodeFilter<'_>) -> Option<&Code> {
        self.codes.iter().find(|c| filter.matches(c))
    }

    /// Sorted deduplicated projection of a per-code value.
    pub fn distinct_by<T, F>(&self, f: F) -> Vec<T>
    where
        T: Ord,
        F: Fn(&Code) -> Option<T>,
    {
        let mut values: Vec<T> = self.codes.iter().filter_map(f).collect();
        values.sort();
        values.dedup();
        values
    }

    /// Sorted distinct session dates.
    pub fn dates(&self) -> Vec<String> {
        self.distinct_by(|c| Some(c.payload.date().to_owned()))
    }

    /// Sorted distinct exam numbers.
    pub fn exams(&self) -> Vec<String> {
        self.distinct_by(|c| Some(c.payload.exam().to_owned()))
    }

    /// Sorted distinct logical pages.
    pub fn pages(&self) -> Vec<u32> {
        self.distinct_by(|c| Some(c.page))
    }

    /// Sorted distinct raw payload strings (the "seen" set).
    pub fn payload_texts(&self) -> Vec<String> {
        self.distinct_by(|c| Some(c.payload.raw().to_owned()))
    }

    /// Serialize as one `payload,x,y,w,h,pdf_page,page` line per code.
    pub fn write_to(&self, mut out: impl Write) -> std::io::Result<()> {
        for c in &self.codes {
            writeln!(
                out,
                "{},{},{},{},{},{},{}",
                c.payload.raw(),
                c.x,
                c.y,
                c.w,
                c.h,
                c.pdf_page,
                c.page
            )?;
        }
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RepositoryError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        fs::write(path, buf)?;
        Ok(())
    }

    /// Parse the flat-text format.
    ///
    /// Lines whose payload fails structural validation are discarded with a
    /// warning; a malformed numeric field or field count is an error carrying
    /// the offending raw line.
    pub fn load(path: impl AsRef<Path>) -> Result<CodeRepository, RepositoryError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Self::parse(&text, &path.to_string_lossy())
    }

    pub fn parse(text: &str, origin: &str) -> Result<CodeRepository, RepositoryError> {
        let mut codes = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != 7 {
                return Err(RepositoryError::BadFieldCount {
                    path: origin.to_owned(),
                    line: idx + 1,
                    got: fields.len(),
                    raw: line.to_owned(),
                });
            }

            let payload = match Payload::parse(fields[0]) {
                Ok(p) => p,
                Err(err) => {
                    warn!("discarding line {} of {}: {}", idx + 1, origin, err);
                    continue;
                }
            };

            let mut nums = [0i64; 6];
            for (slot, field) in nums.iter_mut().zip(&fields[1..]) {
                *slot = field
                    .trim()
                    .parse()
                    .map_err(|_| RepositoryError::BadNumber {
                        path: origin.to_owned(),
                        line: idx + 1,
                        raw: line.to_owned(),
                    })?;
            }

            codes.push(Code::new(
                payload,
                nums[0] as i32,
                nums[1] as i32,
                nums[2] as i32,
                nums[3] as i32,
                nums[4] as u32,
                nums[5] as u32,
            ));
        }

        Ok(CodeRepository { codes })
    }

    /// Expand native entries (`w == h == 0`) from generator units to pixels.
    ///
    /// Positions convert through the generator calibration constants; the
    /// footprint comes from the configured physical code size. Entries that
    /// already carry a pixel footprint are left untouched, which makes the
    /// expansion idempotent.
    pub fn expand_native_units(&mut self, geom: &CodeGeometry) {
        for c in &mut self.codes {
            if c.w == 0 && c.h == 0 {
                c.x = geom.native_x_to_px(c.x as f64);
                c.y = geom.native_y_to_px(c.y as f64);
                c.w = geom.code_size_px();
                c.h = geom.code_size_px();
            }
        }
    }
}

impl IntoIterator for CodeRepository {
    type Item = Code;
    type IntoIter = std::vec::IntoIter<Code>;

    fn into_iter(self) -> Self::IntoIter {
        self.codes.into_iter()
    }
}
