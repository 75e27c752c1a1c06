//! Trait definitions for annotation format implementations.

use std::path::{Path, PathBuf};

use crate::format::error::FormatError;
use crate::format::project::ProjectData;

/// Trait for annotation format import/export implementations.
///
/// Each format (project JSON, Pascal VOC, YOLO, pixel mask) implements this
/// trait to convert between a [`ProjectData`] snapshot and the external
/// representation.
pub trait AnnotationFormat: Send + Sync {
    /// Unique identifier for this format (e.g., "annoscene", "yolo", "voc").
    fn id(&self) -> &'static str;

    /// Human-readable name for UI display.
    fn display_name(&self) -> &'static str;

    /// File extensions this format uses (e.g., `["txt"]` for YOLO).
    fn extensions(&self) -> &[&'static str];

    /// Whether exact path/polygon geometry survives export (vs. bounding boxes).
    fn supports_polygon(&self) -> bool;

    /// Whether this format writes one file per image (vs single project file).
    fn supports_per_image(&self) -> bool;

    /// Whether [`import`](Self::import) is implemented.
    fn supports_import(&self) -> bool {
        true
    }

    /// Export project data to the specified path.
    ///
    /// For single-file formats, `path` is the output file.
    /// For per-image formats, `path` is the output directory.
    fn export(
        &self,
        data: &ProjectData,
        path: &Path,
        options: &ExportOptions,
    ) -> Result<ExportResult, FormatError>;

    /// Import project data from the specified path.
    ///
    /// For single-file formats, `path` is the input file.
    /// For per-image formats, `path` is the input directory.
    fn import(&self, path: &Path, options: &ImportOptions) -> Result<ImportResult, FormatError>;
}

/// Options for export operations.
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Base path for relative image references.
    pub image_base_path: Option<PathBuf>,

    /// Leave out shapes whose visibility is off.
    pub skip_hidden: bool,
}

impl ExportOptions {
    /// Create new export options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base path for relative image references.
    pub fn image_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_base_path = Some(path.into());
        self
    }

    pub fn skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }

    /// Resolve an image path against the base path, if it is relative.
    pub fn resolve(&self, image: &Path) -> PathBuf {
        match &self.image_base_path {
            Some(base) if image.is_relative() => base.join(image),
            _ => image.to_path_buf(),
        }
    }
}

/// Options for import operations.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Base path to resolve relative image paths.
    pub image_base_path: Option<PathBuf>,

    /// Filter to specific label names (empty = all).
    pub label_filter: Vec<String>,
}

impl ImportOptions {
    /// Create new import options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base path for resolving relative image paths.
    pub fn image_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_base_path = Some(path.into());
        self
    }

    /// Filter to specific label names.
    pub fn label_filter(mut self, labels: Vec<String>) -> Self {
        self.label_filter = labels;
        self
    }

    /// Whether a label named `name` passes the filter.
    pub fn accepts(&self, name: &str) -> bool {
        self.label_filter.is_empty() || self.label_filter.iter().any(|l| l == name)
    }
}

/// Result of an export operation.
#[derive(Debug, Default)]
pub struct ExportResult {
    /// Number of images exported.
    pub images_exported: usize,

    /// Number of annotations exported.
    pub annotations_exported: usize,

    /// Warnings generated during export (e.g., skipped shapes).
    pub warnings: Vec<FormatWarning>,

    /// Files created during export.
    pub files_created: Vec<PathBuf>,
}

impl ExportResult {
    /// Create a new export result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a warning to the result.
    pub fn add_warning(&mut self, warning: FormatWarning) {
        self.warnings.push(warning);
    }

    /// Check if there were any warnings.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Check if there were any errors (severe warnings).
    pub fn has_errors(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w.severity, WarningSeverity::Error))
    }
}

/// Result of an import operation.
#[derive(Debug, Default)]
pub struct ImportResult {
    pub data: ProjectData,

    /// Files or entries that were skipped, with the reason.
    pub warnings: Vec<FormatWarning>,
}

impl ImportResult {
    pub fn new(data: ProjectData) -> Self {
        Self {
            data,
            warnings: Vec::new(),
        }
    }

    pub fn add_warning(&mut self, warning: FormatWarning) {
        self.warnings.push(warning);
    }
}

/// Warning generated during format conversion.
#[derive(Debug, Clone)]
pub struct FormatWarning {
    /// Path of the image this warning relates to (if applicable).
    pub image_path: Option<PathBuf>,

    /// Human-readable warning message.
    pub message: String,

    /// Severity level of the warning.
    pub severity: WarningSeverity,
}

impl FormatWarning {
    /// Create a new warning.
    pub fn new(message: impl Into<String>, severity: WarningSeverity) -> Self {
        Self {
            image_path: None,
            message: message.into(),
            severity,
        }
    }

    /// Create an info-level warning.
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, WarningSeverity::Info)
    }

    /// Create a warning-level warning.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(message, WarningSeverity::Warning)
    }

    /// Create an error-level warning.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, WarningSeverity::Error)
    }

    /// Set the image path this warning relates to.
    pub fn with_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_path = Some(path.into());
        self
    }
}

/// Severity level for format warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    /// Informational message, not a problem.
    Info,
    /// Warning that something was skipped or modified.
    Warning,
    /// Error that may affect data integrity.
    Error,
}
