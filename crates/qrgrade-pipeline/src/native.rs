//! Loading the generation-time code registry.

use std::path::Path;

use log::info;

use qrgrade_core::{CodeGeometry, CodeRepository};

use crate::error::PipelineError;

/// Load `generated.txt` and expand its native entries to pixel space.
pub fn load_native_registry(
    path: impl AsRef<Path>,
    geometry: &CodeGeometry,
) -> Result<CodeRepository, PipelineError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(PipelineError::MissingInput(path.to_path_buf()));
    }

    let mut repository = CodeRepository::load(path)?;
    repository.expand_native_units(geometry);

    info!(
        "native registry: {} code(s), {} exam(s), {} page(s)",
        repository.len(),
        repository.exams().len(),
        repository.pages().len()
    );
    Ok(repository)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_entries_expand_to_pixel_footprints() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generated.txt");
        std::fs::write(&path, "210826001011,4000000,8000000,0,0,1,1\n").unwrap();

        let geometry = CodeGeometry::default();
        let repo = load_native_registry(&path, &geometry).unwrap();

        let code = &repo.codes()[0];
        assert_eq!(code.w, geometry.code_size_px());
        assert_eq!(code.h, geometry.code_size_px());
        assert!(code.x > 0 && code.y > 0);
    }

    #[test]
    fn missing_registry_is_reported_as_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_native_registry(dir.path().join("generated.txt"), &CodeGeometry::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput(_)));
    }
}
