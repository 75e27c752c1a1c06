//! Errors raised by the converters.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// A failed import or export.
///
/// Only problems that abort the whole operation become a `FormatError`.
/// Per-image trouble is rendered into a [`FormatWarning`](super::FormatWarning)
/// and the converter moves on.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Structurally broken input: bad numbers, unbalanced tags
    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// Element or tag this format does not know
    #[error("Unknown element <{element}> in {path:?}")]
    UnknownElement { element: String, path: PathBuf },

    /// An image the annotations point at does not exist
    #[error("Image not found: {path:?}")]
    ImageNotFound { path: PathBuf },

    /// Project file written by an incompatible version
    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },

    /// Normalized or raster output needs the image size
    #[error("{format} needs the size of '{image}', which is unknown")]
    MissingDimensions { format: &'static str, image: String },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

impl FormatError {
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn unknown_element(element: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::UnknownElement {
            element: element.into(),
            path: path.into(),
        }
    }

    pub fn image_not_found(path: &Path) -> Self {
        Self::ImageNotFound {
            path: path.to_path_buf(),
        }
    }

    pub fn missing_dimensions(format: &'static str, image: impl Into<String>) -> Self {
        Self::MissingDimensions {
            format,
            image: image.into(),
        }
    }
}
