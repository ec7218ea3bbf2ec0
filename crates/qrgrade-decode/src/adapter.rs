//! The page decoder: threshold sweep × backends × patch recovery.
//!
//! One raster is decoded many times — once per configured threshold, once
//! without thresholding, and (optionally) once per patch candidate. All
//! passes are pooled; duplicates collapse deterministically, with the pass
//! at the smallest threshold value supplying the surviving candidate (the
//! no-threshold pass and patch passes rank after every sweep pass).

use image::GrayImage;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use qrgrade_core::{Code, CodeFilter, CodeGeometry, CodeKind, CodeRepository, Payload};

use crate::backend::{RawSymbol, SymbolReader};
use crate::patches::{crop_patch, find_patch_candidates, PatchParams};
use crate::threshold::{binarize, threshold_level};

/// Tunable decoding parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecodeParams {
    pub geometry: CodeGeometry,
    /// Patch footprint tolerance, relative (e.g. `0.25`).
    pub tolerance: f64,
    /// Threshold sweep values, percent of full scale. A no-threshold pass
    /// always runs in addition.
    pub thresholds: Vec<u8>,
    /// Enable patch-based recovery.
    pub use_patches: bool,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            geometry: CodeGeometry::default(),
            tolerance: 0.25,
            thresholds: vec![50, 55, 60, 65, 70, 75, 80],
            use_patches: true,
        }
    }
}

impl DecodeParams {
    fn patch_params(&self) -> PatchParams {
        PatchParams {
            code_size_px: self.geometry.code_size_px(),
            tolerance: self.tolerance,
        }
    }
}

/// Result of decoding one page.
#[derive(Clone, Debug, Default)]
pub struct PageScan {
    /// Pooled, de-duplicated codes with `page`/`pdf_page` assigned.
    pub codes: Vec<Code>,
    /// Session date / exam number, when any code identified them.
    pub date: Option<String>,
    pub exam: Option<String>,
    /// Logical page, from a page anchor (0 when no anchor was found).
    pub page: u32,
    /// Candidates dropped because their payload failed to parse.
    pub discarded: usize,
}

/// Multi-pass decoder over a set of backends.
pub struct PageDecoder<'a> {
    readers: Vec<&'a dyn SymbolReader>,
    params: DecodeParams,
}

impl<'a> PageDecoder<'a> {
    pub fn new(readers: Vec<&'a dyn SymbolReader>, params: DecodeParams) -> PageDecoder<'a> {
        PageDecoder { readers, params }
    }

    #[inline]
    pub fn params(&self) -> &DecodeParams {
        &self.params
    }

    /// Decode one rasterized page.
    ///
    /// Zero codes is not an error: the page is reported and contributes an
    /// empty result.
    pub fn decode_page(&self, gray: &GrayImage, pdf_page: u32) -> PageScan {
        let mut pool = CandidatePool::new(self.params.geometry.code_size_px());
        let mut discarded = 0usize;

        let mut sweep = self.params.thresholds.clone();
        sweep.sort_unstable();
        sweep.dedup();

        for &percent in &sweep {
            let pass = binarize(gray, threshold_level(percent));
            self.run_readers(&pass, 0, 0, &mut pool, &mut discarded);
        }

        // no-threshold pass, ranked after the sweep
        self.run_readers(gray, 0, 0, &mut pool, &mut discarded);

        if self.params.use_patches {
            self.run_patches(gray, &sweep, &mut pool, &mut discarded);
        }

        let mut scan = assemble_page(pool.into_codes(), pdf_page);
        scan.discarded = discarded;

        if scan.codes.is_empty() {
            info!("pdf page {}: no codes found", pdf_page + 1);
        }
        scan
    }

    fn run_readers(
        &self,
        image: &GrayImage,
        dx: i32,
        dy: i32,
        pool: &mut CandidatePool,
        discarded: &mut usize,
    ) {
        for reader in &self.readers {
            for symbol in reader.read(image) {
                let symbol = symbol.offset(dx, dy);
                match Payload::parse(&symbol.text) {
                    Ok(payload) => pool.offer(payload, symbol),
                    Err(err) => {
                        warn!("{}: discarding symbol: {}", reader.name(), err);
                        *discarded += 1;
                    }
                }
            }
        }
    }

    fn run_patches(
        &self,
        gray: &GrayImage,
        sweep: &[u8],
        pool: &mut CandidatePool,
        discarded: &mut usize,
    ) {
        // patches are extracted at the lowest sweep threshold (or mid-gray
        // when the sweep is empty) so their set is deterministic
        let level = sweep
            .first()
            .map(|&p| threshold_level(p))
            .unwrap_or_else(|| threshold_level(50));
        let patch_params = self.params.patch_params();
        let margin = (patch_params.code_size_px / 4).max(4);

        for rect in find_patch_candidates(gray, level, &patch_params) {
            let (crop, ox, oy) = crop_patch(gray, &rect, margin);
            self.run_readers(&crop, ox, oy, pool, discarded);
        }
    }
}

/// Pooled candidates with first-wins de-duplication.
///
/// Two candidates are duplicates when they carry the same payload within
/// half a code footprint of each other. Offers arrive in pass order, so the
/// smallest-threshold detection survives.
struct CandidatePool {
    codes: Vec<Code>,
    position_slack: i32,
}

impl CandidatePool {
    fn new(code_size_px: i32) -> CandidatePool {
        CandidatePool {
            codes: Vec::new(),
            position_slack: (code_size_px / 2).max(1),
        }
    }

    fn offer(&mut self, payload: Payload, symbol: RawSymbol) {
        let duplicate = self.codes.iter().any(|c| {
            c.payload.raw() == payload.raw()
                && (c.x - symbol.x).abs() <= self.position_slack
                && (c.y - symbol.y).abs() <= self.position_slack
        });
        if !duplicate {
            self.codes.push(Code::new(
                payload, symbol.x, symbol.y, symbol.w, symbol.h, 0, 0,
            ));
        }
    }

    fn into_codes(self) -> Vec<Code> {
        self.codes
    }
}

/// Fix `pdf_page` on every code and derive the page identity from anchors.
fn assemble_page(mut codes: Vec<Code>, pdf_page: u32) -> PageScan {
    for c in &mut codes {
        c.pdf_page = pdf_page;
    }

    let repo = CodeRepository::from_codes(codes);
    let anchor = repo
        .find_first(&CodeFilter {
            kind: Some(CodeKind::PageAnchorPrimary),
            ..CodeFilter::default()
        })
        .or_else(|| {
            repo.find_first(&CodeFilter {
                kind: Some(CodeKind::PageAnchorSecondary),
                ..CodeFilter::default()
            })
        });

    let page = anchor
        .and_then(|a| a.payload.anchor_page())
        .map(u32::from)
        .unwrap_or(0);
    let (date, exam) = match anchor {
        Some(a) => (
            Some(a.payload.date().to_owned()),
            Some(a.payload.exam().to_owned()),
        ),
        None => {
            let first = repo.codes().first();
            (
                first.map(|c| c.payload.date().to_owned()),
                first.map(|c| c.payload.exam().to_owned()),
            )
        }
    };

    let mut codes: Vec<Code> = repo.into_iter().collect();
    for c in &mut codes {
        c.page = page;
    }

    PageScan {
        codes,
        date,
        exam,
        page,
        discarded: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use std::collections::HashMap;

    /// Fixture backend reporting a fixed set of symbols.
    struct FixtureReader {
        name: String,
        symbols: Vec<RawSymbol>,
    }

    impl FixtureReader {
        fn new(name: &str, symbols: Vec<RawSymbol>) -> Self {
            Self {
                name: name.to_owned(),
                symbols,
            }
        }
    }

    impl SymbolReader for FixtureReader {
        fn name(&self) -> &str {
            &self.name
        }

        fn read(&self, image: &GrayImage) -> Vec<RawSymbol> {
            // only report symbols whose box fits the given image, so patch
            // crops do not re-report far-away whole-page symbols
            self.symbols
                .iter()
                .filter(|s| {
                    s.x + s.w <= image.width() as i32 && s.y + s.h <= image.height() as i32
                })
                .cloned()
                .collect()
        }
    }

    fn symbol(text: &str, x: i32, y: i32) -> RawSymbol {
        RawSymbol {
            text: text.to_owned(),
            x,
            y,
            w: 30,
            h: 30,
        }
    }

    fn gray_page() -> GrayImage {
        GrayImage::from_pixel(400, 400, Luma([255]))
    }

    fn no_patch_params() -> DecodeParams {
        DecodeParams {
            use_patches: false,
            ..DecodeParams::default()
        }
    }

    #[test]
    fn multi_pass_detections_collapse_to_one_code() {
        let reader = FixtureReader::new("fixture", vec![symbol("210826001011", 100, 100)]);
        let decoder = PageDecoder::new(vec![&reader], no_patch_params());

        let scan = decoder.decode_page(&gray_page(), 3);
        // 7 sweep passes + 1 plain pass all reported it; one code survives
        assert_eq!(scan.codes.len(), 1);
        assert_eq!(scan.codes[0].pdf_page, 3);
    }

    #[test]
    fn nearby_same_payload_candidates_are_duplicates_distant_are_not() {
        let reader = FixtureReader::new(
            "fixture",
            vec![
                symbol("210826001011", 100, 100),
                symbol("210826001011", 104, 97), // jitter within half a code
                symbol("210826001011", 300, 300), // genuinely elsewhere
            ],
        );
        let decoder = PageDecoder::new(vec![&reader], no_patch_params());

        let scan = decoder.decode_page(&gray_page(), 0);
        assert_eq!(scan.codes.len(), 2);
    }

    #[test]
    fn page_identity_comes_from_the_anchor() {
        let reader = FixtureReader::new(
            "fixture",
            vec![
                symbol("210826001011", 100, 100),
                symbol("P210826001021", 350, 10),
            ],
        );
        let decoder = PageDecoder::new(vec![&reader], no_patch_params());

        let scan = decoder.decode_page(&gray_page(), 0);
        assert_eq!(scan.page, 2);
        assert_eq!(scan.date.as_deref(), Some("210826"));
        assert_eq!(scan.exam.as_deref(), Some("001"));
        assert!(scan.codes.iter().all(|c| c.page == 2));
    }

    #[test]
    fn malformed_symbols_are_counted_not_fatal() {
        let reader = FixtureReader::new(
            "fixture",
            vec![symbol("garbage!", 10, 10), symbol("210826001011", 100, 100)],
        );
        let params = DecodeParams {
            thresholds: vec![50],
            use_patches: false,
            ..DecodeParams::default()
        };
        let decoder = PageDecoder::new(vec![&reader], params);

        let scan = decoder.decode_page(&gray_page(), 0);
        assert_eq!(scan.codes.len(), 1);
        // two passes (threshold + plain), one bad symbol each
        assert_eq!(scan.discarded, 2);
    }

    #[test]
    fn empty_page_reports_no_codes() {
        let reader = FixtureReader::new("fixture", Vec::new());
        let decoder = PageDecoder::new(vec![&reader], no_patch_params());

        let scan = decoder.decode_page(&gray_page(), 0);
        assert!(scan.codes.is_empty());
        assert_eq!(scan.page, 0);
    }

    #[test]
    fn backends_pool_across_readers() {
        let a = FixtureReader::new("a", vec![symbol("210826001011", 100, 100)]);
        let b = FixtureReader::new("b", vec![symbol("210826001021", 200, 200)]);
        let decoder = PageDecoder::new(vec![&a, &b], no_patch_params());

        let scan = decoder.decode_page(&gray_page(), 0);
        let texts: HashMap<&str, ()> = scan
            .codes
            .iter()
            .map(|c| (c.payload.raw(), ()))
            .collect();
        assert_eq!(texts.len(), 2);
    }
}
