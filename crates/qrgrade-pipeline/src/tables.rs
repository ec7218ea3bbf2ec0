//! Grading tables derived from the detected-code registry.
//!
//! The central artifact is the raw grid: one row per exam, one bit per
//! (question, answer) cell. A marker that survived scanning means the bubble
//! was left blank, so bit `1` (marker absent) is the "answer marked" state.
//! Manual review edits live in a `.fix` sibling that takes precedence when
//! present.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use qrgrade_core::{set_phase, CodeKind, CodeRepository, PayloadDetail};

use crate::config::ExamFormat;
use crate::error::PipelineError;

/// Drop codes that fall outside the session format.
///
/// Date mismatches (any kind) and answer codes whose question or answer
/// exceeds the configured bounds are discarded with a warning carrying the
/// offending payload. Returns the surviving repository and the discard count.
pub fn validate_format(
    repository: CodeRepository,
    format: &ExamFormat,
) -> (CodeRepository, usize) {
    let mut kept = CodeRepository::new();
    let mut dropped = 0usize;

    for code in repository {
        if code.payload.date() != format.date {
            warn!(
                "payload {} has date {}, session is {}",
                code.payload.raw(),
                code.payload.date(),
                format.date
            );
            dropped += 1;
            continue;
        }
        if let PayloadDetail::Answer { question, answer } = code.payload.detail() {
            if question == 0 || question > format.questions {
                warn!(
                    "payload {} question {} outside 1..={}",
                    code.payload.raw(),
                    question,
                    format.questions
                );
                dropped += 1;
                continue;
            }
            if answer == 0 || answer > format.answers {
                warn!(
                    "payload {} answer {} outside 1..={}",
                    code.payload.raw(),
                    answer,
                    format.answers
                );
                dropped += 1;
                continue;
            }
        }
        kept.push(code);
    }
    (kept, dropped)
}

/// The per-exam answer bit grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawTable {
    date: String,
    questions: u8,
    answers: u8,
    rows: BTreeMap<String, Vec<u8>>,
}

impl RawTable {
    /// Build the grid from detected codes: bit 1 = marker absent = marked.
    pub fn from_repository(repository: &CodeRepository, format: &ExamFormat) -> RawTable {
        let seen: HashSet<&str> = repository.iter().map(|c| c.payload.raw()).collect();

        let mut rows = BTreeMap::new();
        for exam in repository.exams() {
            let mut bits = Vec::with_capacity(format.questions as usize * format.answers as usize);
            for question in 1..=format.questions {
                for answer in 1..=format.answers {
                    let payload = format!("{}{}{:02}{}", format.date, exam, question, answer);
                    bits.push(if seen.contains(payload.as_str()) { 0 } else { 1 });
                }
            }
            rows.insert(exam, bits);
        }

        RawTable {
            date: format.date.clone(),
            questions: format.questions,
            answers: format.answers,
            rows,
        }
    }

    #[inline]
    pub fn exams(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Bit for one cell; `None` for unknown exams or out-of-range cells.
    pub fn bit(&self, exam: &str, question: u8, answer: u8) -> Option<u8> {
        if question == 0 || question > self.questions || answer == 0 || answer > self.answers {
            return None;
        }
        let idx = (question as usize - 1) * self.answers as usize + (answer as usize - 1);
        self.rows.get(exam).map(|bits| bits[idx])
    }

    /// Questions with two or more marked answers, per exam.
    pub fn multiple_answers(&self) -> Vec<(String, u8)> {
        let mut flagged = Vec::new();
        for (exam, bits) in &self.rows {
            for question in 1..=self.questions {
                let start = (question as usize - 1) * self.answers as usize;
                let marked = bits[start..start + self.answers as usize]
                    .iter()
                    .filter(|&&b| b == 1)
                    .count();
                if marked >= 2 {
                    flagged.push((exam.clone(), question));
                }
            }
        }
        flagged
    }

    /// Serialize as `date,exam,bit,...` lines.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let mut out = String::new();
        for (exam, bits) in &self.rows {
            out.push_str(&self.date);
            out.push(',');
            out.push_str(exam);
            for bit in bits {
                out.push(',');
                out.push(if *bit == 1 { '1' } else { '0' });
            }
            out.push('\n');
        }
        fs::write(path, out)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>, format: &ExamFormat) -> Result<RawTable, PipelineError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let expected = format.questions as usize * format.answers as usize;

        let mut rows = BTreeMap::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let bad = || PipelineError::BadTable {
                path: path.to_path_buf(),
                line: idx + 1,
                raw: line.to_owned(),
            };

            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != expected + 2 {
                return Err(bad());
            }
            let exam = fields[1].to_owned();
            let bits = fields[2..]
                .iter()
                .map(|f| match f.trim() {
                    "0" => Ok(0),
                    "1" => Ok(1),
                    _ => Err(bad()),
                })
                .collect::<Result<Vec<u8>, _>>()?;
            rows.insert(exam, bits);
        }

        Ok(RawTable {
            date: format.date.clone(),
            questions: format.questions,
            answers: format.answers,
            rows,
        })
    }

    /// Load the grid for `date` from `dir`, preferring the `.fix` edit.
    pub fn load_reviewed(dir: &Path, format: &ExamFormat) -> Result<RawTable, PipelineError> {
        let fix = raw_fix_path(dir, &format.date);
        if fix.is_file() {
            info!("using reviewed grid {fix:?}");
            return Self::load(fix, format);
        }
        Self::load(raw_csv_path(dir, &format.date), format)
    }
}

pub fn raw_csv_path(dir: &Path, date: &str) -> PathBuf {
    dir.join(format!("{date}_raw.csv"))
}

pub fn raw_fix_path(dir: &Path, date: &str) -> PathBuf {
    dir.join(format!("{date}_raw.fix"))
}

pub fn nia_csv_path(dir: &Path, date: &str) -> PathBuf {
    dir.join(format!("{date}_nia.csv"))
}

pub fn feedback_csv_path(dir: &Path, date: &str) -> PathBuf {
    dir.join(format!("{date}_feedback.csv"))
}

/// Student-id digits for one exam, from the id marker grid.
///
/// The grid has six rows of figure markers (the first row prints figures
/// 5-9, the rest 0-9). Covering a figure removes its marker, so a row with
/// exactly one absent figure yields that digit; anything else is `X`.
pub fn nia_digits(repository: &CodeRepository, format: &ExamFormat, exam: &str) -> String {
    let seen: HashSet<&str> = repository
        .iter()
        .filter(|c| c.kind() == CodeKind::StudentIdDigit && c.payload.exam() == exam)
        .map(|c| c.payload.raw())
        .collect();

    let mut digits = String::with_capacity(6);
    for row in 0u8..6 {
        let figures: Vec<u8> = if row == 0 { (5..=9).collect() } else { (0..=9).collect() };
        let absent: Vec<u8> = figures
            .into_iter()
            .filter(|figure| {
                let payload = format!("@{}{}{}{}", format.date, exam, row, figure);
                !seen.contains(payload.as_str())
            })
            .collect();
        match absent.as_slice() {
            [figure] => digits.push((b'0' + figure) as char),
            _ => digits.push('X'),
        }
    }
    digits
}

/// Write the `<date>_nia.csv` table: one `date,exam,digits` row per exam.
pub fn write_nia_csv(
    repository: &CodeRepository,
    format: &ExamFormat,
    path: impl AsRef<Path>,
) -> Result<(), PipelineError> {
    let mut out = String::new();
    for exam in repository.exams() {
        let digits = nia_digits(repository, format, &exam);
        out.push_str(&format!("{},{},{}\n", format.date, exam, digits));
    }
    fs::write(path, out)?;
    Ok(())
}

/// Write the `<date>_feedback.csv` table.
///
/// Per exam, the flat marker index `(question - 1) * answers + answer` of
/// every marked cell, ascending. This is the index scheme the answer-sheet
/// generator uses for its feedback overlay.
pub fn write_feedback_csv(table: &RawTable, path: impl AsRef<Path>) -> Result<(), PipelineError> {
    let mut out = String::new();
    for (exam, bits) in &table.rows {
        out.push_str(&table.date);
        out.push(',');
        out.push_str(exam);
        for (idx, bit) in bits.iter().enumerate() {
            if *bit == 1 {
                let question = idx / table.answers as usize + 1;
                let answer = idx % table.answers as usize + 1;
                let id = (question - 1) * table.answers as usize + answer;
                out.push_str(&format!(",{id}"));
            }
        }
        out.push('\n');
    }
    fs::write(path, out)?;
    Ok(())
}

/// Produce all three tables in `dir` and log review flags.
pub fn write_tables(
    repository: &CodeRepository,
    format: &ExamFormat,
    dir: &Path,
) -> Result<RawTable, PipelineError> {
    set_phase("tables");
    let table = RawTable::from_repository(repository, format);
    table.save(raw_csv_path(dir, &format.date))?;
    write_nia_csv(repository, format, nia_csv_path(dir, &format.date))?;
    write_feedback_csv(&table, feedback_csv_path(dir, &format.date))?;

    for (exam, question) in table.multiple_answers() {
        warn!("exam {exam} question {question}: multiple answers marked");
    }
    info!(
        "tables for session {} written to {:?} ({} exam(s))",
        format.date,
        dir,
        table.rows.len()
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qrgrade_core::{Code, Payload};

    fn fmt() -> ExamFormat {
        ExamFormat {
            date: "210826".to_owned(),
            questions: 3,
            answers: 4,
        }
    }

    fn code(raw: &str) -> Code {
        Code::new(Payload::parse(raw).unwrap(), 0, 0, 30, 30, 1, 1)
    }

    /// Exam 001 with every answer marker present except the given cells.
    fn repo_with_marked(marked: &[(u8, u8)]) -> CodeRepository {
        let format = fmt();
        let mut repo = CodeRepository::new();
        for question in 1..=format.questions {
            for answer in 1..=format.answers {
                if marked.contains(&(question, answer)) {
                    continue;
                }
                repo.push(code(&format!("210826001{question:02}{answer}")));
            }
        }
        repo
    }

    #[test]
    fn absent_markers_become_set_bits() {
        let repo = repo_with_marked(&[(2, 3)]);
        let table = RawTable::from_repository(&repo, &fmt());

        assert_eq!(table.bit("001", 2, 3), Some(1));
        assert_eq!(table.bit("001", 2, 2), Some(0));
        assert_eq!(table.bit("001", 1, 1), Some(0));
        assert_eq!(table.bit("002", 1, 1), None);
    }

    #[test]
    fn two_marked_answers_flag_the_question() {
        let repo = repo_with_marked(&[(1, 1), (1, 4), (3, 2)]);
        let table = RawTable::from_repository(&repo, &fmt());

        assert_eq!(table.multiple_answers(), vec![("001".to_owned(), 1)]);
    }

    #[test]
    fn raw_table_round_trips_through_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("210826_raw.csv");

        let table = RawTable::from_repository(&repo_with_marked(&[(2, 1)]), &fmt());
        table.save(&path).unwrap();
        let loaded = RawTable::load(&path, &fmt()).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn fix_file_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let format = fmt();

        let table = RawTable::from_repository(&repo_with_marked(&[(2, 1)]), &format);
        table.save(raw_csv_path(dir.path(), &format.date)).unwrap();

        // reviewer cleared the mark
        let cleared = RawTable::from_repository(&repo_with_marked(&[]), &format);
        cleared.save(raw_fix_path(dir.path(), &format.date)).unwrap();

        let reviewed = RawTable::load_reviewed(dir.path(), &format).unwrap();
        assert_eq!(reviewed.bit("001", 2, 1), Some(0));
    }

    #[test]
    fn bad_cell_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("210826_raw.csv");
        fs::write(&path, "210826,001,0,1,2,0,0,0,0,0,0,0,0,0\n").unwrap();

        let err = RawTable::load(&path, &fmt()).unwrap_err();
        assert!(matches!(err, PipelineError::BadTable { line: 1, .. }));
    }

    #[test]
    fn nia_row_with_one_absent_figure_yields_the_digit() {
        let format = fmt();
        let mut repo = CodeRepository::new();
        // row 0 prints figures 5-9; cover figure 7
        for figure in [5u8, 6, 8, 9] {
            repo.push(code(&format!("@2108260010{figure}")));
        }
        // rows 1-5: row 1 covers figure 0 (all others present); rows 2-5
        // left fully present -> no single absent figure -> X
        for figure in 1u8..=9 {
            repo.push(code(&format!("@2108260011{figure}")));
        }
        for row in 2u8..=5 {
            for figure in 0u8..=9 {
                repo.push(code(&format!("@210826001{row}{figure}")));
            }
        }

        let digits = nia_digits(&repo, &format, "001");
        assert_eq!(&digits[..2], "70");
    }

    #[test]
    fn feedback_ids_follow_the_generator_indexing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("210826_feedback.csv");

        // question 2 answer 3 marked: id = (2-1)*4 + 3 = 7
        let table = RawTable::from_repository(&repo_with_marked(&[(2, 3)]), &fmt());
        write_feedback_csv(&table, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim(), "210826,001,7");
    }

    #[test]
    fn out_of_format_codes_are_discarded() {
        let format = fmt();
        let mut repo = repo_with_marked(&[]);
        let before = repo.len();
        repo.push(code("210826001091")); // question 9 > 3
        repo.push(code("220101001011")); // wrong date

        let (kept, dropped) = validate_format(repo, &format);
        assert_eq!(dropped, 2);
        assert_eq!(kept.len(), before);
    }
}
