//! Project file format.
//!
//! A pretty-printed JSON rendering of [`ProjectData`]: every image, label and
//! shape with geometry, colors and visibility. Loading it rebuilds an
//! identical hierarchy. Undo history is not stored.
//!
//! # Versioning
//!
//! Files carry the [`ProjectData`] version. Unreadable versions are rejected,
//! readable but incompatible ones load with a warning.

use std::path::Path;

use crate::format::error::FormatError;
use crate::format::project::ProjectData;
use crate::format::traits::{
    AnnotationFormat, ExportOptions, ExportResult, FormatWarning, ImportOptions, ImportResult,
};

/// Full-fidelity project JSON.
pub struct ProjectJsonFormat;

impl ProjectJsonFormat {
    /// Serialize to pretty JSON bytes.
    pub fn to_bytes(data: &ProjectData) -> Result<Vec<u8>, FormatError> {
        Ok(serde_json::to_string_pretty(data)?.into_bytes())
    }

    /// Parse and version-check project JSON.
    pub fn parse(json: &str) -> Result<ImportResult, FormatError> {
        let data: ProjectData = serde_json::from_str(json)?;

        if !ProjectData::is_version_readable(&data.version) {
            return Err(FormatError::VersionMismatch {
                expected: ProjectData::CURRENT_VERSION.to_string(),
                found: data.version.clone(),
            });
        }

        let mut result = ImportResult::new(data);
        if !ProjectData::is_version_compatible(&result.data.version) {
            log::warn!(
                "Project version {} may not be fully compatible with current version {}",
                result.data.version,
                ProjectData::CURRENT_VERSION
            );
            result.add_warning(FormatWarning::warning(format!(
                "Project version {} differs from {}",
                result.data.version,
                ProjectData::CURRENT_VERSION
            )));
        }
        Ok(result)
    }
}

impl AnnotationFormat for ProjectJsonFormat {
    fn id(&self) -> &'static str {
        "annoscene"
    }

    fn display_name(&self) -> &'static str {
        "Annoscene Project (JSON)"
    }

    fn extensions(&self) -> &[&'static str] {
        &["annoscene.json", "json"]
    }

    fn supports_polygon(&self) -> bool {
        true
    }

    fn supports_per_image(&self) -> bool {
        false
    }

    fn export(
        &self,
        data: &ProjectData,
        path: &Path,
        _options: &ExportOptions,
    ) -> Result<ExportResult, FormatError> {
        log::info!("Saving project to {:?}", path);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, Self::to_bytes(data)?)?;

        let result = ExportResult {
            images_exported: data.images.len(),
            annotations_exported: data.total_shapes(),
            warnings: Vec::new(),
            files_created: vec![path.to_path_buf()],
        };

        log::info!(
            "Saved {} images with {} shapes",
            result.images_exported,
            result.annotations_exported
        );

        Ok(result)
    }

    fn import(&self, path: &Path, options: &ImportOptions) -> Result<ImportResult, FormatError> {
        log::info!("Loading project from {:?}", path);

        let json = std::fs::read_to_string(path)?;
        let mut result = Self::parse(&json)?;

        if !options.label_filter.is_empty() {
            for image in &mut result.data.images {
                image.labels.retain(|l| options.accepts(&l.name));
            }
        }

        log::info!(
            "Loaded {} images with {} shapes (format version {})",
            result.data.images.len(),
            result.data.total_shapes(),
            result.data.version
        );

        Ok(result)
    }
}
