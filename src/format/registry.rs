//! Format registry for discovering and accessing annotation formats.

use std::collections::HashMap;

use crate::format::formats::{MaskFormat, PascalVocFormat, ProjectJsonFormat, YoloFormat};
use crate::format::traits::AnnotationFormat;

/// Registry of available annotation formats.
///
/// All built-in formats are registered on creation.
pub struct FormatRegistry {
    formats: HashMap<&'static str, Box<dyn AnnotationFormat>>,
}

impl std::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("formats", &self.ids())
            .finish()
    }
}

impl FormatRegistry {
    /// Id of the full-fidelity project format.
    pub const NATIVE_ID: &'static str = "annoscene";

    /// Create a new registry with all built-in formats registered.
    pub fn new() -> Self {
        let mut registry = Self {
            formats: HashMap::new(),
        };

        registry.register(Box::new(ProjectJsonFormat));
        registry.register(Box::new(PascalVocFormat));
        registry.register(Box::new(YoloFormat));
        registry.register(Box::new(MaskFormat));

        registry
    }

    /// Register a format implementation, replacing any with the same id.
    pub fn register(&mut self, format: Box<dyn AnnotationFormat>) {
        self.formats.insert(format.id(), format);
    }

    /// Get a format by its ID.
    pub fn get(&self, id: &str) -> Option<&dyn AnnotationFormat> {
        self.formats.get(id).map(|f| f.as_ref())
    }

    /// Find formats by file extension.
    pub fn by_extension(&self, ext: &str) -> Vec<&dyn AnnotationFormat> {
        self.formats
            .values()
            .filter(|f| f.extensions().iter().any(|e| e.ends_with(ext)))
            .map(|f| f.as_ref())
            .collect()
    }

    /// All registered formats, sorted by id.
    pub fn all(&self) -> Vec<&dyn AnnotationFormat> {
        let mut formats: Vec<_> = self.formats.values().map(|f| f.as_ref()).collect();
        formats.sort_by_key(|f| f.id());
        formats
    }

    /// All format ids, sorted.
    pub fn ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.formats.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// The project JSON format, unless it was unregistered.
    pub fn native(&self) -> Option<&dyn AnnotationFormat> {
        self.get(Self::NATIVE_ID)
    }

    pub fn per_image_formats(&self) -> Vec<&dyn AnnotationFormat> {
        self.all()
            .into_iter()
            .filter(|f| f.supports_per_image())
            .collect()
    }

    /// Formats that can read data back in.
    pub fn import_formats(&self) -> Vec<&dyn AnnotationFormat> {
        self.all()
            .into_iter()
            .filter(|f| f.supports_import())
            .collect()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_formats() {
        let registry = FormatRegistry::new();

        assert_eq!(registry.ids(), vec!["annoscene", "mask", "voc", "yolo"]);
        assert!(registry.get("coco").is_none());
    }

    #[test]
    fn test_native_format() {
        let registry = FormatRegistry::new();
        let native = registry.native().unwrap();

        assert_eq!(native.id(), "annoscene");
        assert!(native.supports_polygon());
        assert!(!native.supports_per_image());
    }

    #[test]
    fn test_per_image_formats() {
        let registry = FormatRegistry::new();
        let ids: Vec<_> = registry.per_image_formats().iter().map(|f| f.id()).collect();

        assert_eq!(ids, vec!["mask", "voc", "yolo"]);
    }

    #[test]
    fn test_mask_is_export_only() {
        let registry = FormatRegistry::new();
        let ids: Vec<_> = registry.import_formats().iter().map(|f| f.id()).collect();

        assert_eq!(ids, vec!["annoscene", "voc", "yolo"]);
    }

    #[test]
    fn test_by_extension() {
        let registry = FormatRegistry::new();
        let xml = registry.by_extension("xml");

        assert_eq!(xml.len(), 1);
        assert_eq!(xml[0].id(), "voc");
    }
}
