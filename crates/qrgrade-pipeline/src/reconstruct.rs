//! Exam reconstruction: reorient and regroup scanned pages by exam.
//!
//! Scanned stacks arrive in arbitrary page order and orientation. The codes
//! already tell us everything needed to undo that: each code carries its exam
//! and logical page, and the page anchors fix the rotation. Reconstruction
//! walks the repository exam by exam, rotates each pooled page raster (and
//! its codes) to canonical orientation, writes the per-page JPEGs and hands
//! the ordered page list to the [`ExamAssembler`]. The rotated registry is
//! then re-serialized to `detected.txt`.

use std::path::PathBuf;

use image::imageops::{self, FilterType};
use log::{info, warn};

use qrgrade_core::{
    resolve_rotation, rotated_page_size, set_phase, CodeFilter, CodeKind, CodeRepository, Rotation,
};

use crate::error::PipelineError;
use crate::source::ExamAssembler;
use crate::workspace::GradingWorkspace;

#[derive(Clone, Copy, Debug)]
pub struct ReconstructOptions {
    /// Output scale for the reconstructed pages (1.0 keeps the raster size).
    pub resize: f64,
}

impl Default for ReconstructOptions {
    fn default() -> Self {
        Self { resize: 1.0 }
    }
}

/// Reconstruct every exam present in `repository`.
///
/// Pages whose pooled raster is missing are skipped with a warning; the
/// remaining pages of the exam are still assembled in logical order.
pub fn reconstruct_exams(
    repository: &mut CodeRepository,
    workspace: &GradingWorkspace,
    options: &ReconstructOptions,
    assembler: &mut dyn ExamAssembler,
) -> Result<(), PipelineError> {
    set_phase("reconstruct");
    let exams = repository.exams();
    info!("reconstructing {} exam(s)", exams.len());

    for exam in &exams {
        let mut page_files: Vec<PathBuf> = Vec::new();

        let exam_codes = repository.filter(&CodeFilter::exam(exam));
        let date = match exam_codes.codes().first() {
            Some(code) => code.payload.date().to_owned(),
            None => continue,
        };

        for page in exam_codes.pages() {
            if page == 0 {
                // codes that never got a logical page cannot be placed
                continue;
            }
            let pooled = workspace
                .pool_dir()
                .join(format!("page-{date}-{exam}-{page:02}.png"));
            if !pooled.is_file() {
                warn!("exam {exam}: pooled raster {pooled:?} missing, page skipped");
                continue;
            }

            let raster = image::open(&pooled)?.into_luma8();
            let (pw, ph) = (raster.width(), raster.height());

            let rotation = page_rotation(repository, exam, page, pw, ph);
            let mut raster = match rotation {
                Rotation::None => raster,
                Rotation::Clockwise90 => imageops::rotate90(&raster),
                Rotation::CounterClockwise90 => imageops::rotate270(&raster),
                Rotation::Half => imageops::rotate180(&raster),
            };
            for code in repository
                .iter_mut()
                .filter(|c| c.payload.exam() == *exam && c.page == page)
            {
                rotation.apply_to_code(code, pw, ph);
            }

            if (options.resize - 1.0).abs() > f64::EPSILON {
                let (rw, rh) = rotated_page_size(rotation, pw, ph);
                let nw = ((rw as f64 * options.resize).round() as u32).max(1);
                let nh = ((rh as f64 * options.resize).round() as u32).max(1);
                raster = imageops::resize(&raster, nw, nh, FilterType::Triangle);
                for code in repository
                    .iter_mut()
                    .filter(|c| c.payload.exam() == *exam && c.page == page)
                {
                    code.rescale(options.resize);
                }
            }

            let out = workspace
                .detected_dir()
                .join(format!("{exam}-{page:02}.jpg"));
            raster.save(&out)?;
            page_files.push(out);
        }

        assembler.assemble(exam, &page_files)?;
    }

    repository.save(workspace.detected_txt())?;
    info!("detected registry written to {:?}", workspace.detected_txt());
    Ok(())
}

/// Rotation for one (exam, page), preferring the primary anchor.
fn page_rotation(
    repository: &CodeRepository,
    exam: &str,
    page: u32,
    page_width: u32,
    page_height: u32,
) -> Rotation {
    let filter = |kind| CodeFilter {
        exam: Some(exam),
        page: Some(page),
        kind: Some(kind),
        ..CodeFilter::default()
    };
    let anchor = repository
        .find_first(&filter(CodeKind::PageAnchorPrimary))
        .or_else(|| repository.find_first(&filter(CodeKind::PageAnchorSecondary)));

    match anchor {
        Some(anchor) => resolve_rotation(anchor, page_width, page_height),
        None => {
            info!("exam {exam} page {page}: no anchor, keeping orientation");
            Rotation::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use qrgrade_core::{Code, Payload};

    use crate::source::NullAssembler;

    fn code(raw: &str, x: i32, y: i32, page: u32) -> Code {
        Code::new(Payload::parse(raw).unwrap(), x, y, 40, 40, page, page)
    }

    #[test]
    fn upside_down_page_is_normalized_and_assembled() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = GradingWorkspace::create(dir.path().join("qrgrading-210826")).unwrap();

        // primary anchor in the south-west corner: the page is upside down
        let raster = GrayImage::from_pixel(400, 600, Luma([255]));
        raster
            .save(workspace.pool_dir().join("page-210826-001-01.png"))
            .unwrap();

        let mut repo = CodeRepository::from_codes(vec![
            code("P210826001011", 20, 540, 1),
            code("210826001051", 200, 300, 1),
        ]);

        let mut assembler = NullAssembler::default();
        reconstruct_exams(
            &mut repo,
            &workspace,
            &ReconstructOptions::default(),
            &mut assembler,
        )
        .unwrap();

        assert_eq!(assembler.assembled, vec![("001".to_owned(), 1)]);
        assert!(workspace.detected_dir().join("001-01.jpg").is_file());
        assert!(workspace.detected_txt().is_file());

        // the anchor ended up in the north-east quadrant after the half turn
        let anchor = &repo.codes()[0];
        assert!(anchor.x > 200 && anchor.y < 300);
    }

    #[test]
    fn missing_pooled_raster_skips_the_page_only() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = GradingWorkspace::create(dir.path().join("qrgrading-210826")).unwrap();

        let raster = GrayImage::from_pixel(400, 600, Luma([255]));
        raster
            .save(workspace.pool_dir().join("page-210826-001-02.png"))
            .unwrap();

        let mut repo = CodeRepository::from_codes(vec![
            code("210826001011", 100, 100, 1), // page 1 raster missing
            code("210826001021", 100, 100, 2),
        ]);

        let mut assembler = NullAssembler::default();
        reconstruct_exams(
            &mut repo,
            &workspace,
            &ReconstructOptions::default(),
            &mut assembler,
        )
        .unwrap();
        assert_eq!(assembler.assembled, vec![("001".to_owned(), 1)]);
    }
}
