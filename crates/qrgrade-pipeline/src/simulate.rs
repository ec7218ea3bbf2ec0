//! Synthetic scan input for end-to-end dry runs.
//!
//! Instead of real scans, take the generated pages and "answer" them: for
//! every question, pick one answer at random and paint its marker black, the
//! way a pen stroke would make that code undecodable. The normal scan
//! pipeline then runs against the result, and the raw grid must reproduce
//! exactly the injected choices.

use image::{GrayImage, Luma};
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use qrgrade_core::{Code, CodeKind, CodeRepository};

use crate::error::PipelineError;
use crate::source::PageSource;

/// Blacken one randomly chosen answer marker per question.
///
/// `codes` are the native codes of a single page, already in pixel space.
/// Returns the injected `(question, answer)` choices.
pub fn mark_random_answers(
    raster: &mut GrayImage,
    codes: &[Code],
    rng: &mut impl Rng,
) -> Vec<(u8, u8)> {
    let mut questions: Vec<u8> = codes.iter().filter_map(|c| c.payload.question()).collect();
    questions.sort_unstable();
    questions.dedup();

    let mut chosen = Vec::with_capacity(questions.len());
    for question in questions {
        let options: Vec<&Code> = codes
            .iter()
            .filter(|c| c.payload.question() == Some(question))
            .collect();
        let pick = options[rng.gen_range(0..options.len())];
        blacken(raster, pick);
        // answer is always present on answer codes
        if let Some(answer) = pick.payload.answer() {
            chosen.push((question, answer));
        }
    }
    chosen
}

fn blacken(raster: &mut GrayImage, code: &Code) {
    let x0 = code.x.max(0) as u32;
    let y0 = code.y.max(0) as u32;
    let x1 = (code.x + code.w).clamp(0, raster.width() as i32) as u32;
    let y1 = (code.y + code.h).clamp(0, raster.height() as i32) as u32;
    for y in y0..y1 {
        for x in x0..x1 {
            raster.put_pixel(x, y, Luma([0]));
        }
    }
}

/// Page source decorator that answers the pages it serves.
///
/// Marking is keyed on a fixed seed plus the page index, so the same source
/// always produces the same synthetic exam.
pub struct SimulatedSource<'a, S: PageSource> {
    inner: &'a S,
    native: &'a CodeRepository,
    seed: u64,
}

impl<'a, S: PageSource> SimulatedSource<'a, S> {
    pub fn new(inner: &'a S, native: &'a CodeRepository, seed: u64) -> Self {
        Self {
            inner,
            native,
            seed,
        }
    }
}

impl<S: PageSource> PageSource for SimulatedSource<'_, S> {
    fn page_count(&self) -> u32 {
        self.inner.page_count()
    }

    fn rasterize(&self, page: u32, dpi: f64) -> Result<GrayImage, PipelineError> {
        let mut raster = self.inner.rasterize(page, dpi)?;
        let codes: Vec<Code> = self
            .native
            .iter()
            .filter(|c| c.pdf_page == page && c.kind() == CodeKind::AnswerBubble)
            .cloned()
            .collect();

        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(page as u64));
        let chosen = mark_random_answers(&mut raster, &codes, &mut rng);
        debug!("simulated page {}: {} answer(s) marked", page + 1, chosen.len());
        Ok(raster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qrgrade_core::Payload;

    fn code(raw: &str, x: i32, y: i32) -> Code {
        Code::new(Payload::parse(raw).unwrap(), x, y, 20, 20, 0, 1)
    }

    #[test]
    fn exactly_one_marker_per_question_is_blackened() {
        let codes: Vec<Code> = (1u8..=4)
            .flat_map(|answer| {
                [
                    code(&format!("21082600101{answer}"), 30 * answer as i32, 40),
                    code(&format!("21082600102{answer}"), 30 * answer as i32, 100),
                ]
            })
            .collect();

        let mut raster = GrayImage::from_pixel(200, 200, Luma([255]));
        let mut rng = StdRng::seed_from_u64(7);
        let chosen = mark_random_answers(&mut raster, &codes, &mut rng);

        assert_eq!(chosen.len(), 2);
        assert_eq!(chosen[0].0, 1);
        assert_eq!(chosen[1].0, 2);

        // exactly the two chosen boxes are black
        let black = raster.pixels().filter(|p| p.0[0] == 0).count();
        assert_eq!(black, 2 * 20 * 20);
    }

    #[test]
    fn marking_is_deterministic_for_a_seed() {
        let codes: Vec<Code> = (1u8..=4)
            .map(|answer| code(&format!("21082600101{answer}"), 30 * answer as i32, 40))
            .collect();

        let mut a = GrayImage::from_pixel(200, 200, Luma([255]));
        let mut b = GrayImage::from_pixel(200, 200, Luma([255]));
        let picked_a = mark_random_answers(&mut a, &codes, &mut StdRng::seed_from_u64(42));
        let picked_b = mark_random_answers(&mut b, &codes, &mut StdRng::seed_from_u64(42));

        assert_eq!(picked_a, picked_b);
        assert_eq!(a.as_raw(), b.as_raw());
    }
}
