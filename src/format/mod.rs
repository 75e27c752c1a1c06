//! Annotation format import/export.
//!
//! Converters work on a [`ProjectData`] snapshot of the Annotation Node
//! hierarchy, never on the live scene. New formats are added by implementing
//! [`AnnotationFormat`] and registering them in the [`FormatRegistry`].
//!
//! ## Supported Formats
//!
//! - **Project JSON** (`annoscene`): full fidelity, used for project files
//! - **Pascal VOC XML** (`voc`): one XML file per image, bounding boxes
//! - **YOLO TXT** (`yolo`): one text file per image plus `classes.txt`
//! - **Pixel mask PNG** (`mask`): one grayscale raster per image, export only
//!
//! ## Usage
//!
//! ```rust,ignore
//! use annoscene::format::{ExportOptions, FormatRegistry};
//!
//! let registry = FormatRegistry::new();
//! let voc = registry.get("voc").unwrap();
//! let result = voc.export(&project_data, out_dir, &ExportOptions::default())?;
//! ```

mod auto_save;
mod error;
pub mod formats;
mod project;
mod registry;
mod traits;

pub use auto_save::AutoSaveManager;
pub use error::FormatError;
pub use project::{ImageEntry, LabelEntry, ProjectData, ProjectMetadata, ShapeEntry};
pub use registry::FormatRegistry;
pub use traits::{
    AnnotationFormat, ExportOptions, ExportResult, FormatWarning, ImportOptions, ImportResult,
    WarningSeverity,
};
