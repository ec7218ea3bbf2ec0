//! The scan phase: bounded-concurrency page decoding.
//!
//! One task per PDF page. Workers are plain scoped threads gated by a
//! counting [`Semaphore`] sized to the thread budget; each task rasterizes
//! its page, runs the multi-pass decoder, drops the per-page PNG into the
//! pool and appends its codes to the shared repository under a single mutex.
//! `thread::scope` is the phase barrier: no merging or summary happens until
//! every task has joined.
//!
//! Per-page failures stay inside their task: a page that cannot be
//! rasterized or written is logged, recorded in the summary and contributes
//! zero codes. Only workspace validation, which runs before any worker
//! starts, can abort a run.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use log::{debug, error, info};

use qrgrade_core::{set_phase, CodeRepository};
use qrgrade_decode::{PageDecoder, PageScan};

use crate::error::PipelineError;
use crate::semaphore::Semaphore;
use crate::source::PageSource;

/// Scan-phase options.
#[derive(Clone, Copy, Debug)]
pub struct ScanOptions {
    pub threads: usize,
    /// First PDF page to scan (0-based, inclusive).
    pub first_page: u32,
    /// Last PDF page (exclusive); `None` scans to the end.
    pub last_page: Option<u32>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            threads: 4,
            first_page: 0,
            last_page: None,
        }
    }
}

/// Aggregate counts reported after the phase barrier.
#[derive(Clone, Debug, Default)]
pub struct ScanSummary {
    pub pages: u32,
    pub codes: usize,
    pub unique_payloads: usize,
    pub exams: usize,
    pub discarded: usize,
    /// PDF pages (0-based) where no anchor fixed a logical page.
    pub unidentified_pages: Vec<u32>,
    /// PDF pages (0-based) that failed to rasterize or persist.
    pub failed_pages: Vec<u32>,
}

/// Scan a page range of `source` into a shared repository.
pub fn scan_pages(
    source: &dyn PageSource,
    decoder: &PageDecoder<'_>,
    pool_dir: &Path,
    options: &ScanOptions,
) -> (CodeRepository, ScanSummary) {
    set_phase("scan");

    let total = source.page_count();
    let last = options.last_page.unwrap_or(total).min(total);
    let first = options.first_page.min(last);

    let dpi = decoder.params().geometry.dpi;
    let semaphore = Semaphore::new(options.threads);
    let repository = Mutex::new(CodeRepository::new());
    let discarded = AtomicUsize::new(0);
    let unidentified = Mutex::new(Vec::new());
    let failed = Mutex::new(Vec::new());

    info!(
        "scanning pdf pages {}..{} with {} worker(s)",
        first + 1,
        last,
        options.threads
    );

    std::thread::scope(|scope| {
        for page in first..last {
            let permit = semaphore.acquire();
            let repository = &repository;
            let discarded = &discarded;
            let unidentified = &unidentified;
            let failed = &failed;

            scope.spawn(move || {
                let _permit = permit;
                match scan_one(source, decoder, pool_dir, page, dpi) {
                    Ok(scan) => {
                        debug!(
                            "pdf page {}: {} code(s), logical page {}",
                            page + 1,
                            scan.codes.len(),
                            scan.page
                        );
                        if scan.page == 0 {
                            lock(unidentified).push(page);
                        }
                        discarded.fetch_add(scan.discarded, Ordering::Relaxed);
                        lock(repository).extend(scan.codes);
                    }
                    Err(err) => {
                        // the page contributes nothing; sibling tasks go on
                        error!("pdf page {}: {}", page + 1, err);
                        lock(failed).push(page);
                    }
                }
            });
        }
    });

    let repository = repository.into_inner().unwrap_or_else(|p| p.into_inner());
    let mut unidentified = unidentified.into_inner().unwrap_or_else(|p| p.into_inner());
    unidentified.sort_unstable();
    let mut failed = failed.into_inner().unwrap_or_else(|p| p.into_inner());
    failed.sort_unstable();

    let summary = ScanSummary {
        pages: last - first,
        codes: repository.len(),
        unique_payloads: repository.payload_texts().len(),
        exams: repository.exams().len(),
        discarded: discarded.into_inner(),
        unidentified_pages: unidentified,
        failed_pages: failed,
    };
    info!(
        "scan done: {} page(s), {} code(s) ({} unique), {} exam(s), {} discarded, {} failed",
        summary.pages,
        summary.codes,
        summary.unique_payloads,
        summary.exams,
        summary.discarded,
        summary.failed_pages.len()
    );
    (repository, summary)
}

fn scan_one(
    source: &dyn PageSource,
    decoder: &PageDecoder<'_>,
    pool_dir: &Path,
    page: u32,
    dpi: f64,
) -> Result<PageScan, PipelineError> {
    let gray = source.rasterize(page, dpi)?;
    let scan = decoder.decode_page(&gray, page);

    let name = match (&scan.date, &scan.exam, scan.page) {
        (Some(date), Some(exam), logical) if logical > 0 => {
            format!("page-{date}-{exam}-{logical:02}.png")
        }
        _ => format!("page-unknown-{:03}.png", page + 1),
    };
    gray.save(pool_dir.join(name))?;
    Ok(scan)
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use qrgrade_decode::{DecodeParams, RawSymbol, SymbolReader};

    /// Source whose "pages" are blank rasters; the paired reader reports one
    /// synthetic code per page keyed on the raster's first pixel value.
    struct SyntheticSource {
        pages: u32,
        /// Pages that fail to rasterize.
        broken: Vec<u32>,
    }

    impl PageSource for SyntheticSource {
        fn page_count(&self) -> u32 {
            self.pages
        }

        fn rasterize(&self, page: u32, _dpi: f64) -> Result<GrayImage, PipelineError> {
            if self.broken.contains(&page) {
                return Err(PipelineError::PageSource {
                    page,
                    reason: "corrupt image".to_owned(),
                });
            }
            // encode the page index into the raster so the reader can see it
            let mut img = GrayImage::from_pixel(64, 64, Luma([255]));
            img.put_pixel(0, 0, Luma([page as u8]));
            Ok(img)
        }
    }

    struct PageTagReader;

    impl SymbolReader for PageTagReader {
        fn name(&self) -> &str {
            "tag"
        }

        fn read(&self, image: &GrayImage) -> Vec<RawSymbol> {
            let tag = image.get_pixel(0, 0).0[0];
            if tag == 255 {
                return Vec::new();
            }
            vec![RawSymbol {
                text: format!("2108260010{}1", tag % 10),
                x: 10 * tag as i32,
                y: 10,
                w: 20,
                h: 20,
            }]
        }
    }

    fn single_pass_params() -> DecodeParams {
        DecodeParams {
            thresholds: Vec::new(),
            use_patches: false,
            ..DecodeParams::default()
        }
    }

    #[test]
    fn every_page_contributes_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let source = SyntheticSource {
            pages: 10,
            broken: Vec::new(),
        };
        let reader = PageTagReader;
        let decoder = PageDecoder::new(vec![&reader], single_pass_params());

        let (repo, summary) = scan_pages(&source, &decoder, dir.path(), &ScanOptions::default());
        assert_eq!(summary.pages, 10);
        assert_eq!(repo.len(), 10);
        assert!(summary.failed_pages.is_empty());
    }

    #[test]
    fn page_range_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let source = SyntheticSource {
            pages: 10,
            broken: Vec::new(),
        };
        let reader = PageTagReader;
        let decoder = PageDecoder::new(vec![&reader], single_pass_params());

        let options = ScanOptions {
            first_page: 2,
            last_page: Some(5),
            ..ScanOptions::default()
        };
        let (repo, summary) = scan_pages(&source, &decoder, dir.path(), &options);
        assert_eq!(summary.pages, 3);
        assert_eq!(repo.len(), 3);
    }

    #[test]
    fn failed_page_contributes_nothing_and_siblings_continue() {
        let dir = tempfile::tempdir().unwrap();
        let source = SyntheticSource {
            pages: 10,
            broken: vec![3],
        };
        let reader = PageTagReader;
        let decoder = PageDecoder::new(vec![&reader], single_pass_params());

        let (repo, summary) = scan_pages(&source, &decoder, dir.path(), &ScanOptions::default());
        assert_eq!(summary.pages, 10);
        assert_eq!(repo.len(), 9);
        assert_eq!(summary.failed_pages, vec![3]);
        // the broken page's code is the only one missing
        assert!(repo.iter().all(|c| c.payload.question() != Some(3)));
    }
}
