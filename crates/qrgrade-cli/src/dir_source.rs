//! Page source over a directory of pre-rendered page images.
//!
//! Rendering PDFs to rasters happens outside this tool (`pdftoppm` or
//! similar); the scan phase consumes the resulting image files, sorted by
//! file name so the PDF page order is preserved.

use std::path::{Path, PathBuf};

use image::GrayImage;

use qrgrade_pipeline::{PageSource, PipelineError};

const EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "tif", "tiff"];

#[derive(Debug)]
pub struct DirectorySource {
    pages: Vec<PathBuf>,
}

impl DirectorySource {
    pub fn open(dir: &Path) -> Result<DirectorySource, PipelineError> {
        let mut pages: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| {
                let path = entry.ok()?.path();
                let ext = path.extension()?.to_str()?.to_ascii_lowercase();
                EXTENSIONS.contains(&ext.as_str()).then_some(path)
            })
            .collect();
        pages.sort();

        if pages.is_empty() {
            return Err(PipelineError::MissingInput(dir.to_path_buf()));
        }
        Ok(DirectorySource { pages })
    }
}

impl PageSource for DirectorySource {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn rasterize(&self, page: u32, _dpi: f64) -> Result<GrayImage, PipelineError> {
        let path = self
            .pages
            .get(page as usize)
            .ok_or_else(|| PipelineError::PageSource {
                page,
                reason: "page index out of range".to_owned(),
            })?;
        let img = image::open(path).map_err(|err| PipelineError::PageSource {
            page,
            reason: format!("{path:?}: {err}"),
        })?;
        Ok(img.into_luma8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn pages_are_served_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for (name, level) in [("b.png", 10u8), ("a.png", 20), ("c.png", 30)] {
            GrayImage::from_pixel(4, 4, Luma([level]))
                .save(dir.path().join(name))
                .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = DirectorySource::open(dir.path()).unwrap();
        assert_eq!(source.page_count(), 3);
        assert_eq!(source.rasterize(0, 400.0).unwrap().get_pixel(0, 0).0[0], 20);
        assert_eq!(source.rasterize(2, 400.0).unwrap().get_pixel(0, 0).0[0], 30);
    }

    #[test]
    fn empty_directory_is_a_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirectorySource::open(dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput(_)));
    }
}
