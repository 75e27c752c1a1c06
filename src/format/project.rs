//! Project data structures for persistence and import/export.
//!
//! `ProjectData` is a plain snapshot of the Annotation Node hierarchy: images,
//! their labels and the shapes under each label, with geometry, colors and
//! visibility. It is the common representation every converter reads from
//! and writes to. Undo history is never part of it.
//!
//! # Versioning
//!
//! The project format uses semantic versioning (MAJOR.MINOR.PATCH). Version
//! 0.x.x is unstable: only files with the same minor version are fully
//! compatible, other 0.x files are read with a warning.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::color_utils::Color;
use crate::model::{CheckState, Geometry, Rect, ShapeGeometry};

/// Snapshot of a whole annotation project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectData {
    /// Format version for compatibility checking.
    pub version: String,

    /// Image folder (may be empty for imported data).
    #[serde(default)]
    pub folder: PathBuf,

    /// Images with their labels and shapes, in catalog order.
    pub images: Vec<ImageEntry>,

    #[serde(default)]
    pub metadata: ProjectMetadata,
}

impl ProjectData {
    /// Current version of the project data format.
    pub const CURRENT_VERSION: &'static str = "0.1.0";

    /// Major version number for compatibility checking.
    pub const VERSION_MAJOR: u32 = 0;

    /// Minor version number.
    pub const VERSION_MINOR: u32 = 1;

    /// Create a new empty project data structure.
    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION.to_string(),
            folder: PathBuf::new(),
            images: Vec::new(),
            metadata: ProjectMetadata::default(),
        }
    }

    /// Parse a version string into (major, minor, patch) components.
    pub fn parse_version(version: &str) -> Option<(u32, u32, u32)> {
        let mut parts = version.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some((major, minor, patch))
    }

    /// Check if a version is compatible with the current version.
    ///
    /// For version 0.x.x (unstable), only exact minor version matches are compatible.
    /// For version 1.x.x+, any file with the same major version is compatible.
    pub fn is_version_compatible(file_version: &str) -> bool {
        let Some((file_major, file_minor, _)) = Self::parse_version(file_version) else {
            return false;
        };

        if Self::VERSION_MAJOR == 0 {
            file_major == 0 && file_minor == Self::VERSION_MINOR
        } else {
            file_major == Self::VERSION_MAJOR
        }
    }

    /// Whether a file can be read at all (possibly with warnings).
    pub fn is_version_readable(file_version: &str) -> bool {
        let Some((file_major, _, _)) = Self::parse_version(file_version) else {
            return false;
        };
        file_major == 0 || file_major == Self::VERSION_MAJOR
    }

    /// Total shape count across all images.
    pub fn total_shapes(&self) -> usize {
        self.images.iter().map(ImageEntry::shape_count).sum()
    }

    pub fn total_labels(&self) -> usize {
        self.images.iter().map(|i| i.labels.len()).sum()
    }

    /// Distinct label names in order of first appearance.
    pub fn label_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for label in self.images.iter().flat_map(|i| &i.labels) {
            if !names.contains(&label.name) {
                names.push(label.name.clone());
            }
        }
        names
    }

    pub fn image(&self, path: &Path) -> Option<&ImageEntry> {
        self.images.iter().find(|i| i.path == path)
    }

    /// Image entry for `path`, appended if missing.
    pub fn image_mut_or_insert(&mut self, path: &Path) -> &mut ImageEntry {
        let index = match self.images.iter().position(|i| i.path == path) {
            Some(index) => index,
            None => {
                self.images.push(ImageEntry::new(path.to_path_buf()));
                self.images.len() - 1
            }
        };
        &mut self.images[index]
    }
}

impl Default for ProjectData {
    fn default() -> Self {
        Self::new()
    }
}

/// An image with its labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEntry {
    /// Path to the image file (can be relative or absolute).
    pub path: PathBuf,

    /// Original filename (for display and per-image output names).
    pub filename: String,

    /// Image dimensions (width, height) if known.
    #[serde(default)]
    pub dimensions: Option<(u32, u32)>,

    /// Labels in row order; a label's row is its class index on export.
    #[serde(default)]
    pub labels: Vec<LabelEntry>,
}

impl ImageEntry {
    /// Create a new image entry.
    pub fn new(path: PathBuf) -> Self {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        Self {
            path,
            filename,
            dimensions: None,
            labels: Vec::new(),
        }
    }

    /// Set the image dimensions.
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.dimensions = Some((width, height));
        self
    }

    /// File stem used to name per-image output files.
    pub fn stem(&self) -> &str {
        Path::new(&self.filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
    }

    /// Full image rectangle, when dimensions are known.
    pub fn bounds(&self) -> Option<Rect> {
        self.dimensions
            .filter(|(w, h)| *w > 0 && *h > 0)
            .map(|(w, h)| Rect::new(0.0, 0.0, w as f32, h as f32))
    }

    pub fn shape_count(&self) -> usize {
        self.labels.iter().map(|l| l.shapes.len()).sum()
    }

    /// Label named `name`, appended (with `color`) if missing.
    pub fn label_mut_or_insert(&mut self, name: &str, color: Option<Color>) -> &mut LabelEntry {
        let index = match self.labels.iter().position(|l| l.name == name) {
            Some(index) => index,
            None => {
                let mut label = LabelEntry::new(name);
                label.color = color;
                self.labels.push(label);
                self.labels.len() - 1
            }
        };
        &mut self.labels[index]
    }
}

/// A label row and its shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEntry {
    pub name: String,

    /// Label color; `None` for imported labels that have not been assigned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,

    #[serde(default)]
    pub check: CheckState,

    #[serde(default)]
    pub shapes: Vec<ShapeEntry>,
}

impl LabelEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: None,
            check: CheckState::Checked,
            shapes: Vec::new(),
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }
}

fn default_visible() -> bool {
    true
}

/// A shape under a label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeEntry {
    pub name: String,

    /// Color override; `None` inherits the label's color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,

    #[serde(default = "default_visible")]
    pub visible: bool,

    pub geometry: Geometry,
}

impl ShapeEntry {
    pub fn new(name: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            name: name.into(),
            color: None,
            visible: true,
            geometry,
        }
    }

    /// Axis-aligned rectangle used by the bounding-box exporters.
    ///
    /// Boxes use their own rectangle. Paths and polygons use their (stroked)
    /// bounds intersected with the image rectangle when it is known.
    /// `None` for degenerate shapes or shapes entirely outside the image.
    pub fn export_rect(&self, image_bounds: Option<Rect>) -> Option<Rect> {
        if self.geometry.is_degenerate() {
            return None;
        }
        let rect = self.geometry.bounding_rect()?;
        match (&self.geometry, image_bounds) {
            (Geometry::Box(_), _) | (_, None) => Some(rect),
            (_, Some(bounds)) => rect.intersection(&bounds),
        }
    }
}

/// Project metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    /// Tool that created this file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    /// Creation timestamp (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    /// Last modified timestamp (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,

    /// Format-specific extra data.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ProjectMetadata {
    /// Create new metadata with the current timestamp.
    pub fn new() -> Self {
        Self {
            created_by: Some(format!("annoscene {}", env!("CARGO_PKG_VERSION"))),
            created_at: Some(Self::current_timestamp()),
            modified_at: Some(Self::current_timestamp()),
            extra: HashMap::new(),
        }
    }

    /// Update the modified timestamp.
    pub fn touch(&mut self) {
        self.modified_at = Some(Self::current_timestamp());
    }

    /// Current UTC time as `YYYY-MM-DDTHH:MM:SSZ`.
    fn current_timestamp() -> String {
        let secs = web_time::SystemTime::now()
            .duration_since(web_time::SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        format_timestamp(secs)
    }
}

fn format_timestamp(secs: u64) -> String {
    let secs_today = secs % 86400;
    let (year, month, day) = days_to_ymd(secs / 86400);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        month,
        day,
        secs_today / 3600,
        (secs_today % 3600) / 60,
        secs_today % 60
    )
}

/// Convert days since Unix epoch to year/month/day.
fn days_to_ymd(days: u64) -> (u32, u32, u32) {
    let mut remaining = days;
    let mut year = 1970u32;
    loop {
        let in_year = if is_leap_year(year) { 366 } else { 365 };
        if remaining < in_year {
            break;
        }
        remaining -= in_year;
        year += 1;
    }

    let february = if is_leap_year(year) { 29 } else { 28 };
    let months = [31, february, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    let mut month = 1u32;
    for days_in_month in months {
        if remaining < days_in_month {
            break;
        }
        remaining -= days_in_month;
        month += 1;
    }
    (year, month, remaining as u32 + 1)
}

fn is_leap_year(year: u32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoxGeometry, PathGeometry, Point, PolygonGeometry};

    #[test]
    fn test_version_checks() {
        assert_eq!(ProjectData::parse_version("0.1.7"), Some((0, 1, 7)));
        assert_eq!(ProjectData::parse_version("1.2"), None);
        assert!(ProjectData::is_version_compatible("0.1.3"));
        assert!(!ProjectData::is_version_compatible("0.2.0"));
        assert!(ProjectData::is_version_readable("0.2.0"));
        assert!(!ProjectData::is_version_readable("3.0.0"));
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00Z");
        // 2024-02-29T12:34:56Z
        assert_eq!(format_timestamp(1_709_210_096), "2024-02-29T12:34:56Z");
    }

    #[test]
    fn test_label_names_first_appearance() {
        let mut data = ProjectData::new();
        let a = data.image_mut_or_insert(Path::new("a.png"));
        a.label_mut_or_insert("car", None);
        a.label_mut_or_insert("dog", None);
        let b = data.image_mut_or_insert(Path::new("b.png"));
        b.label_mut_or_insert("cat", None);
        b.label_mut_or_insert("car", None);

        assert_eq!(data.label_names(), vec!["car", "dog", "cat"]);
        assert_eq!(data.images.len(), 2);
    }

    #[test]
    fn test_export_rect_clips_paths_not_boxes() {
        let bounds = Some(Rect::new(0.0, 0.0, 100.0, 100.0));

        let mut path = PathGeometry::new(Point::new(90.0, 50.0), 5.0);
        path.apply_point(Point::new(120.0, 60.0));
        let path = ShapeEntry::new("p", Geometry::Path(path));
        assert_eq!(path.export_rect(bounds), Some(Rect::new(85.0, 45.0, 15.0, 20.0)));

        let boxed = ShapeEntry::new(
            "b",
            Geometry::Box(BoxGeometry::from_rect(Rect::new(90.0, 90.0, 20.0, 20.0))),
        );
        assert_eq!(boxed.export_rect(bounds), Some(Rect::new(90.0, 90.0, 20.0, 20.0)));
    }

    #[test]
    fn test_export_rect_skips_degenerate_and_outside() {
        let bounds = Some(Rect::new(0.0, 0.0, 100.0, 100.0));
        let flat = ShapeEntry::new(
            "b",
            Geometry::Box(BoxGeometry::from_rect(Rect::new(10.0, 10.0, 0.0, 30.0))),
        );
        assert_eq!(flat.export_rect(bounds), None);

        let mut poly = PolygonGeometry::new(Point::new(200.0, 200.0));
        poly.apply_point(Point::new(300.0, 200.0));
        poly.apply_point(Point::new(300.0, 300.0));
        let outside = ShapeEntry::new("o", Geometry::Polygon(poly));
        assert_eq!(outside.export_rect(bounds), None);
    }
}
