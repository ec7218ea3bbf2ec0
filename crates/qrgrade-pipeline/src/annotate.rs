//! Annotation geometry for the reviewed answer sheets.
//!
//! The external PDF writer draws one colored rectangle per marked answer on
//! the original generated document. This module computes those rectangles:
//! the native (generation-time) box is rescaled by the page ratio, shifted by
//! the interpolated anchor delta onto the scanned position, and converted
//! from raster pixels to PDF points. The color class comes from comparing
//! the as-scanned grid with the reviewed (`.fix`) grid and the solution key.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use qrgrade_core::{
    set_phase, AnchorPair, CodeFilter, CodeGeometry, CodeKind, CodeRepository, PageAlignment,
    PayloadDetail,
};

use crate::config::ExamFormat;
use crate::error::PipelineError;
use crate::tables::RawTable;

/// Review outcome of one marked cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkClass {
    /// Marked and matching the solution key.
    Correct,
    /// Marked but not the keyed answer.
    Incorrect,
    /// Marked only in the reviewed grid (manual addition).
    Fixed,
    /// Marked in the scan but cleared by review: the marker was likely lost
    /// to print damage rather than a pen.
    Undetected,
}

/// One rectangle for the external writer, on the canonical page.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Annotation {
    pub page: u32,
    pub question: u8,
    pub answer: u8,
    /// `[x, y, w, h]` in PDF points.
    pub rect_pt: [f64; 4],
    pub class: MarkClass,
}

/// All annotations of one exam.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnnotationPlan {
    pub exam: String,
    pub annotations: Vec<Annotation>,
}

/// A4 width in PDF points over A4 width in millimetres.
const PT_PER_MM: f64 = 595.0 / 210.0;

/// Plan the annotations of one exam.
///
/// `shrink` is the print scale of the session (`1.0` for full-size sheets):
/// it seeds the page ratio on pages where the scan did not fix both anchors.
/// Pages with both anchors measure their own ratio and ignore it.
///
/// An exam whose native registry carries questions or answers beyond the
/// session format aborts planning for that exam only (the caller moves on to
/// the next exam).
#[allow(clippy::too_many_arguments)]
pub fn plan_annotations(
    detected: &CodeRepository,
    native: &CodeRepository,
    raw: &RawTable,
    reviewed: &RawTable,
    format: &ExamFormat,
    geometry: &CodeGeometry,
    exam: &str,
    solution: &[u8],
    shrink: f64,
) -> Result<AnnotationPlan, PipelineError> {
    set_phase("annotate");
    let native_exam = native.filter(&CodeFilter::exam(exam));
    check_format(&native_exam, format, exam)?;

    let px_to_pt = PT_PER_MM / geometry.pixels_per_mm();
    let mut annotations = Vec::new();

    for page in native_exam.pages() {
        let mut page_codes: Vec<_> = native_exam
            .iter()
            .filter(|c| c.page == page)
            .cloned()
            .collect();

        let alignment = page_alignment(detected, &mut page_codes, exam, page, shrink);

        for code in &mut page_codes {
            let PayloadDetail::Answer { question, answer } = code.payload.detail() else {
                continue;
            };
            let Some(class) = classify(raw, reviewed, exam, question, answer, solution) else {
                continue;
            };

            alignment.apply_to_code(code);
            annotations.push(Annotation {
                page,
                question,
                answer,
                rect_pt: [
                    code.x as f64 * px_to_pt,
                    code.y as f64 * px_to_pt,
                    code.w as f64 * px_to_pt,
                    code.h as f64 * px_to_pt,
                ],
                class,
            });
        }
    }

    info!("exam {exam}: {} annotation(s) planned", annotations.len());
    Ok(AnnotationPlan {
        exam: exam.to_owned(),
        annotations,
    })
}

fn check_format(
    native_exam: &CodeRepository,
    format: &ExamFormat,
    exam: &str,
) -> Result<(), PipelineError> {
    for code in native_exam.iter() {
        if let PayloadDetail::Answer { question, answer } = code.payload.detail() {
            if question > format.questions || answer > format.answers {
                return Err(PipelineError::FormatExceeded {
                    exam: exam.to_owned(),
                    detail: format!(
                        "question {question} answer {answer} beyond {}x{}",
                        format.questions, format.answers
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Alignment of one native page onto the scan, rescaling `page_codes` by the
/// page ratio first. Both anchors present: the ratio is measured from their
/// spans. Otherwise `fallback_ratio` stands in for it.
fn page_alignment(
    detected: &CodeRepository,
    page_codes: &mut [qrgrade_core::Code],
    exam: &str,
    page: u32,
    fallback_ratio: f64,
) -> PageAlignment {
    let pair = |kind| {
        let filter = CodeFilter {
            exam: Some(exam),
            page: Some(page),
            kind: Some(kind),
            ..CodeFilter::default()
        };
        let observed = detected.find_first(&filter)?;
        let native = page_codes.iter().find(|c| c.kind() == kind)?;
        Some((observed.clone(), native.clone()))
    };

    let upper = pair(CodeKind::PageAnchorPrimary);
    let lower = pair(CodeKind::PageAnchorSecondary);

    let make = |pairs: &Option<(qrgrade_core::Code, qrgrade_core::Code)>| {
        pairs
            .as_ref()
            .map(|(observed, native)| AnchorPair::from_codes(observed, native))
    };

    let ratio = PageAlignment::new(make(&upper), make(&lower))
        .page_ratio()
        .unwrap_or(fallback_ratio);
    if (ratio - 1.0).abs() > f64::EPSILON {
        for code in page_codes.iter_mut() {
            code.rescale(ratio);
        }
        // pairs must reflect the rescaled native geometry
        let upper = pair_after_rescale(&upper, page_codes, CodeKind::PageAnchorPrimary);
        let lower = pair_after_rescale(&lower, page_codes, CodeKind::PageAnchorSecondary);
        return PageAlignment::new(upper, lower);
    }
    PageAlignment::new(make(&upper), make(&lower))
}

fn pair_after_rescale(
    pair: &Option<(qrgrade_core::Code, qrgrade_core::Code)>,
    page_codes: &[qrgrade_core::Code],
    kind: CodeKind,
) -> Option<AnchorPair> {
    let (observed, _) = pair.as_ref()?;
    let native = page_codes.iter().find(|c| c.kind() == kind)?;
    Some(AnchorPair::from_codes(observed, native))
}

/// Review class of one cell, `None` when the cell needs no annotation.
fn classify(
    raw: &RawTable,
    reviewed: &RawTable,
    exam: &str,
    question: u8,
    answer: u8,
    solution: &[u8],
) -> Option<MarkClass> {
    let raw_bit = raw.bit(exam, question, answer)?;
    let reviewed_bit = reviewed.bit(exam, question, answer)?;

    match (raw_bit, reviewed_bit) {
        (0, 0) => None,
        (0, 1) => Some(MarkClass::Fixed),
        (1, 0) => Some(MarkClass::Undetected),
        _ => {
            let keyed = solution.get(question as usize - 1).copied();
            if keyed == Some(answer) {
                Some(MarkClass::Correct)
            } else {
                Some(MarkClass::Incorrect)
            }
        }
    }
}

/// Load the solution key: `date,exam,digits` with one answer digit per
/// question. Exams map to their per-question answers.
pub fn load_solutions(path: impl AsRef<Path>) -> Result<HashMap<String, Vec<u8>>, PipelineError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;

    let mut solutions = HashMap::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        let ok = fields.len() == 3 && fields[2].bytes().all(|b| b.is_ascii_digit());
        if !ok {
            return Err(PipelineError::BadTable {
                path: path.to_path_buf(),
                line: idx + 1,
                raw: line.to_owned(),
            });
        }
        let answers = fields[2].bytes().map(|b| b - b'0').collect();
        solutions.insert(fields[1].to_owned(), answers);
    }
    Ok(solutions)
}
