//! Decoded optical markers and their fixed-width payload format.
//!
//! Every marker printed on an exam sheet carries a fixed-width numeric
//! payload. The leading character classifies the marker:
//!
//! - digit — answer bubble, `DDDDDDEEEQQA` (6-digit date, 3-digit exam,
//!   2-digit question, 1-digit answer);
//! - `P` — page anchor, `PDDDDDDEEEPPC` (2-digit logical page, corner digit
//!   `1` = primary / `5` = secondary);
//! - `@` — student-id digit, `@DDDDDDEEERF` (1-digit grid row, 1-digit
//!   figure). A leading `N` is an alias for `@` emitted by newer exam
//!   generators and is normalized away at parse time.
//!
//! Payloads are parsed exactly once, at the decode boundary. Downstream code
//! matches on [`CodeKind`] / [`PayloadDetail`] and never re-slices strings.

use serde::{Deserialize, Serialize};

/// Role of a decoded marker.
///
/// Anchors (`PageAnchor*`) carry no answer content; they exist purely as
/// geometric references for orientation and alignment. The two anchor kinds
/// are printed in opposite page corners by design.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeKind {
    AnswerBubble,
    PageAnchorPrimary,
    PageAnchorSecondary,
    StudentIdDigit,
}

impl CodeKind {
    /// Legacy integer tag used by older tooling that consumed the flat files.
    pub fn wire_value(self) -> u8 {
        match self {
            CodeKind::AnswerBubble => 0,
            CodeKind::PageAnchorPrimary => 1,
            CodeKind::StudentIdDigit => 2,
            CodeKind::PageAnchorSecondary => 5,
        }
    }

    /// Whether this marker is a geometric reference rather than content.
    pub fn is_anchor(self) -> bool {
        matches!(
            self,
            CodeKind::PageAnchorPrimary | CodeKind::PageAnchorSecondary
        )
    }
}

/// Errors produced when parsing a raw decoded payload.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PayloadError {
    #[error("empty payload")]
    Empty,
    #[error("payload {raw:?} has length {got}, expected {expected}")]
    BadLength {
        raw: String,
        got: usize,
        expected: usize,
    },
    #[error("payload {raw:?} contains a non-digit where a digit was expected")]
    NonDigit { raw: String },
    #[error("payload {raw:?} starts with unrecognized prefix {prefix:?}")]
    UnknownPrefix { raw: String, prefix: char },
    #[error("page anchor {raw:?} has corner digit {corner:?}, expected 1 or 5")]
    BadCorner { raw: String, corner: char },
}

/// Kind-specific payload fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadDetail {
    Answer { question: u8, answer: u8 },
    PageAnchor { page: u8 },
    StudentIdDigit { row: u8, figure: u8 },
}

/// A parsed marker payload.
///
/// The normalized wire string is retained verbatim for serialization; the
/// structured fields are derived from it exactly once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    raw: String,
    kind: CodeKind,
    date: String,
    exam: String,
    detail: PayloadDetail,
}

const DATE_LEN: usize = 6;
const EXAM_LEN: usize = 3;

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn digits2(s: &str) -> u8 {
    // callers guarantee `s` is 1-2 ascii digits
    s.parse().unwrap_or(0)
}

impl Payload {
    /// Parse a raw decoded string.
    ///
    /// A leading `N` (newer student-id variant) is normalized to `@` so that
    /// the wire format stays stable across generator versions.
    pub fn parse(raw: &str) -> Result<Payload, PayloadError> {
        let first = raw.chars().next().ok_or(PayloadError::Empty)?;

        match first {
            '0'..='9' => Self::parse_answer(raw),
            'P' => Self::parse_page_anchor(raw),
            '@' => Self::parse_student_id(raw.to_owned()),
            'N' => {
                let mut normalized = raw.to_owned();
                normalized.replace_range(0..1, "@");
                Self::parse_student_id(normalized)
            }
            other => Err(PayloadError::UnknownPrefix {
                raw: raw.to_owned(),
                prefix: other,
            }),
        }
    }

    fn parse_answer(raw: &str) -> Result<Payload, PayloadError> {
        let expected = DATE_LEN + EXAM_LEN + 3;
        if raw.len() != expected {
            return Err(PayloadError::BadLength {
                raw: raw.to_owned(),
                got: raw.len(),
                expected,
            });
        }
        if !all_digits(raw) {
            return Err(PayloadError::NonDigit {
                raw: raw.to_owned(),
            });
        }

        let date = raw[..DATE_LEN].to_owned();
        let exam = raw[DATE_LEN..DATE_LEN + EXAM_LEN].to_owned();
        let question = digits2(&raw[9..11]);
        let answer = digits2(&raw[11..12]);

        Ok(Payload {
            raw: raw.to_owned(),
            kind: CodeKind::AnswerBubble,
            date,
            exam,
            detail: PayloadDetail::Answer { question, answer },
        })
    }

    fn parse_page_anchor(raw: &str) -> Result<Payload, PayloadError> {
        let expected = 1 + DATE_LEN + EXAM_LEN + 2 + 1;
        if raw.len() != expected {
            return Err(PayloadError::BadLength {
                raw: raw.to_owned(),
                got: raw.len(),
                expected,
            });
        }
        let body = &raw[1..];
        if !all_digits(body) {
            return Err(PayloadError::NonDigit {
                raw: raw.to_owned(),
            });
        }

        let date = body[..DATE_LEN].to_owned();
        let exam = body[DATE_LEN..DATE_LEN + EXAM_LEN].to_owned();
        let page = digits2(&body[9..11]);
        let corner = body.as_bytes()[11] as char;

        let kind = match corner {
            '1' => CodeKind::PageAnchorPrimary,
            '5' => CodeKind::PageAnchorSecondary,
            other => {
                return Err(PayloadError::BadCorner {
                    raw: raw.to_owned(),
                    corner: other,
                })
            }
        };

        Ok(Payload {
            raw: raw.to_owned(),
            kind,
            date,
            exam,
            detail: PayloadDetail::PageAnchor { page },
        })
    }

    fn parse_student_id(raw: String) -> Result<Payload, PayloadError> {
        let expected = 1 + DATE_LEN + EXAM_LEN + 2;
        if raw.len() != expected {
            return Err(PayloadError::BadLength {
                got: raw.len(),
                expected,
                raw,
            });
        }
        let body = &raw[1..];
        if !all_digits(body) {
            return Err(PayloadError::NonDigit { raw });
        }

        let date = body[..DATE_LEN].to_owned();
        let exam = body[DATE_LEN..DATE_LEN + EXAM_LEN].to_owned();
        let row = digits2(&body[9..10]);
        let figure = digits2(&body[10..11]);

        Ok(Payload {
            raw,
            kind: CodeKind::StudentIdDigit,
            date,
            exam,
            detail: PayloadDetail::StudentIdDigit { row, figure },
        })
    }

    /// The normalized wire string.
    #[inline]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    #[inline]
    pub fn kind(&self) -> CodeKind {
        self.kind
    }

    /// 6-digit exam session date.
    #[inline]
    pub fn date(&self) -> &str {
        &self.date
    }

    /// 3-digit exam instance number.
    #[inline]
    pub fn exam(&self) -> &str {
        &self.exam
    }

    #[inline]
    pub fn detail(&self) -> PayloadDetail {
        self.detail
    }

    /// Question number for answer bubbles, `None` otherwise.
    pub fn question(&self) -> Option<u8> {
        match self.detail {
            PayloadDetail::Answer { question, .. } => Some(question),
            _ => None,
        }
    }

    /// Answer option for answer bubbles, `None` otherwise.
    pub fn answer(&self) -> Option<u8> {
        match self.detail {
            PayloadDetail::Answer { answer, .. } => Some(answer),
            _ => None,
        }
    }

    /// Logical page number for page anchors, `None` otherwise.
    pub fn anchor_page(&self) -> Option<u8> {
        match self.detail {
            PayloadDetail::PageAnchor { page } => Some(page),
            _ => None,
        }
    }
}

/// One decoded optical marker with its pixel-space footprint.
///
/// Position/size are top-left based pixel coordinates in the raster the
/// marker was decoded from (or, for native codes, in the pixel space derived
/// from the configured DPI). Coordinates are mutated in place only by the
/// explicit rotation / rescale / translation operations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Code {
    pub payload: Payload,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    /// Logical page within the exam (0 when no anchor fixed it yet).
    pub page: u32,
    /// Absolute page index within the source PDF.
    pub pdf_page: u32,
}

impl Code {
    pub fn new(payload: Payload, x: i32, y: i32, w: i32, h: i32, pdf_page: u32, page: u32) -> Code {
        Code {
            payload,
            x,
            y,
            w,
            h,
            page,
            pdf_page,
        }
    }

    #[inline]
    pub fn kind(&self) -> CodeKind {
        self.payload.kind()
    }

    /// Marker center, used for quadrant tests and alignment interpolation.
    #[inline]
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.w as f64 / 2.0,
            self.y as f64 + self.h as f64 / 2.0,
        )
    }

    /// Shift the marker box by whole pixels.
    #[inline]
    pub fn translate(&mut self, dx: i32, dy: i32) {
        self.x += dx;
        self.y += dy;
    }

    /// Scale the whole box (position and size) by `ratio`.
    ///
    /// Used for the page-ratio correction; rounds to the nearest pixel.
    pub fn rescale(&mut self, ratio: f64) {
        self.x = (self.x as f64 * ratio).round() as i32;
        self.y = (self.y as f64 * ratio).round() as i32;
        self.w = (self.w as f64 * ratio).round() as i32;
        self.h = (self.h as f64 * ratio).round() as i32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_payload_parses_fields() {
        let p = Payload::parse("210826003071").expect("answer payload");
        assert_eq!(p.kind(), CodeKind::AnswerBubble);
        assert_eq!(p.date(), "210826");
        assert_eq!(p.exam(), "003");
        assert_eq!(p.question(), Some(7));
        assert_eq!(p.answer(), Some(1));
    }

    #[test]
    fn page_anchor_corner_digit_selects_kind() {
        let up = Payload::parse("P210826003021").expect("primary anchor");
        assert_eq!(up.kind(), CodeKind::PageAnchorPrimary);
        assert_eq!(up.anchor_page(), Some(2));
        assert!(up.kind().is_anchor());

        let dw = Payload::parse("P210826003025").expect("secondary anchor");
        assert_eq!(dw.kind(), CodeKind::PageAnchorSecondary);

        let err = Payload::parse("P210826003023").unwrap_err();
        assert!(matches!(err, PayloadError::BadCorner { corner: '3', .. }));
    }

    #[test]
    fn student_id_normalizes_n_prefix() {
        let a = Payload::parse("@21082600314").expect("nia payload");
        let b = Payload::parse("N21082600314").expect("nia payload with N prefix");
        assert_eq!(a, b);
        assert_eq!(a.raw(), "@21082600314");
        assert_eq!(
            a.detail(),
            PayloadDetail::StudentIdDigit { row: 1, figure: 4 }
        );
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert_eq!(Payload::parse("").unwrap_err(), PayloadError::Empty);
        assert!(matches!(
            Payload::parse("21082600307").unwrap_err(),
            PayloadError::BadLength { .. }
        ));
        assert!(matches!(
            Payload::parse("2108260030ab").unwrap_err(),
            PayloadError::NonDigit { .. }
        ));
        assert!(matches!(
            Payload::parse("X10826003071").unwrap_err(),
            PayloadError::UnknownPrefix { prefix: 'X', .. }
        ));
    }

    #[test]
    fn rescale_rounds_to_nearest_pixel() {
        let payload = Payload::parse("210826003071").unwrap();
        let mut code = Code::new(payload, 100, 201, 50, 50, 0, 1);
        code.rescale(0.5);
        assert_eq!((code.x, code.y, code.w, code.h), (50, 101, 25, 25));
    }
}
