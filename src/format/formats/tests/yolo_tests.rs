//! Tests for the YOLO TXT format.

use std::path::PathBuf;

use image::GrayImage;
use tempfile::TempDir;

use super::{boxed, sample_project};
use crate::format::FormatError;
use crate::format::formats::YoloFormat;
use crate::format::project::{ImageEntry, LabelEntry, ProjectData};
use crate::format::traits::{AnnotationFormat, ExportOptions, ImportOptions, WarningSeverity};
use crate::model::ShapeGeometry;

#[test]
fn test_yolo_format_metadata() {
    let format = YoloFormat;

    assert_eq!(format.id(), "yolo");
    assert_eq!(format.display_name(), "YOLO (TXT)");
    assert!(format.extensions().contains(&"txt"));
    assert!(!format.supports_polygon(), "YOLO only stores boxes");
    assert!(format.supports_per_image());
}

#[test]
fn test_yolo_export_lines() {
    let dir = TempDir::new().unwrap();
    let result = YoloFormat
        .export(&sample_project(), dir.path(), &ExportOptions::default())
        .unwrap();

    assert_eq!(result.images_exported, 1);
    assert_eq!(result.annotations_exported, 3);

    let classes = std::fs::read_to_string(dir.path().join("classes.txt")).unwrap();
    assert_eq!(classes, "car\nperson");

    let txt = std::fs::read_to_string(dir.path().join("frame_001.txt")).unwrap();
    let lines: Vec<_> = txt.lines().collect();
    assert_eq!(
        lines,
        vec![
            "0 0.300000 0.450000 0.400000 0.700000",
            "0 0.750000 0.750000 0.300000 0.300000",
            "1 0.250000 0.200000 0.140000 0.040000",
        ]
    );
}

#[test]
fn test_yolo_export_skips_images_without_dimensions() {
    let dir = TempDir::new().unwrap();
    let result = YoloFormat
        .export(&sample_project(), dir.path(), &ExportOptions::default())
        .unwrap();

    assert!(!dir.path().join("frame_002.txt").exists());
    assert!(result.has_errors());
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w.severity == WarningSeverity::Error && w.message.contains("frame_002"))
    );
}

#[test]
fn test_yolo_export_clips_paths_to_image() {
    let mut data = ProjectData::new();
    let mut image = ImageEntry::new(PathBuf::from("edge.png")).with_dimensions(100, 50);
    let mut label = LabelEntry::new("crack");
    label.shapes.push(super::stroke(&[(80.0, 25.0), (120.0, 25.0)], 5.0));
    image.labels.push(label);
    data.images.push(image);

    let dir = TempDir::new().unwrap();
    YoloFormat
        .export(&data, dir.path(), &ExportOptions::default())
        .unwrap();

    // Stroke bounds 75..125 x 20..30, clipped to 75..100.
    let txt = std::fs::read_to_string(dir.path().join("edge.txt")).unwrap();
    assert_eq!(txt, "0 0.875000 0.500000 0.250000 0.200000");
}

#[test]
fn test_yolo_export_warns_on_row_mismatch() {
    let mut data = sample_project();
    let mut third = ImageEntry::new(PathBuf::from("frame_003.png")).with_dimensions(10, 10);
    let mut person = LabelEntry::new("person");
    person.shapes.push(boxed(1.0, 1.0, 2.0, 2.0));
    third.labels = vec![person, LabelEntry::new("car")];
    data.images.push(third);

    let dir = TempDir::new().unwrap();
    let result = YoloFormat
        .export(&data, dir.path(), &ExportOptions::default())
        .unwrap();

    // The class index is still the row within the image.
    let txt = std::fs::read_to_string(dir.path().join("frame_003.txt")).unwrap();
    assert!(txt.starts_with("0 "));
    assert!(result.warnings.iter().any(|w| w.message.contains("'person' is row 0")));
}

#[test]
fn test_yolo_import_exported_files() {
    let dir = TempDir::new().unwrap();
    YoloFormat
        .export(&sample_project(), dir.path(), &ExportOptions::default())
        .unwrap();
    GrayImage::new(100, 100)
        .save(dir.path().join("frame_001.png"))
        .unwrap();

    let imported = YoloFormat
        .import(dir.path(), &ImportOptions::default())
        .unwrap();
    assert!(imported.warnings.is_empty());

    let data = imported.data;
    assert_eq!(data.images.len(), 1);
    let image = &data.images[0];
    assert_eq!(image.dimensions, Some((100, 100)));
    assert_eq!(image.labels[0].name, "car");
    assert_eq!(image.labels[1].name, "person");
    assert_eq!(image.labels[0].shapes.len(), 2);
    assert_eq!(image.labels[1].shapes.len(), 1);

    let car = image.labels[0].shapes[0].geometry.bounding_rect().unwrap();
    assert!((car.x - 10.0).abs() < 0.01);
    assert!((car.bottom() - 80.0).abs() < 0.01);
}

#[test]
fn test_yolo_import_keeps_class_rows_for_unused_classes() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("classes.txt"), "car\nperson\nbike\n").unwrap();
    std::fs::write(dir.path().join("a.txt"), "2 0.5 0.5 0.5 0.5\n").unwrap();
    GrayImage::new(40, 20).save(dir.path().join("a.png")).unwrap();

    let imported = YoloFormat
        .import(dir.path(), &ImportOptions::default())
        .unwrap();

    let image = &imported.data.images[0];
    let names: Vec<_> = image.labels.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["car", "person", "bike"]);
    let bike = image.labels[2].shapes[0].geometry.bounding_rect().unwrap();
    assert_eq!((bike.x, bike.y, bike.width, bike.height), (10.0, 5.0, 20.0, 10.0));
}

#[test]
fn test_yolo_import_reports_bad_lines_and_missing_images() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("classes.txt"), "car").unwrap();
    std::fs::write(dir.path().join("a.txt"), "0 0.5 0.5\n5 0.5 0.5 0.1 0.1\n0 0.5 0.5 0.1 0.1").unwrap();
    std::fs::write(dir.path().join("orphan.txt"), "0 0.5 0.5 0.1 0.1").unwrap();
    GrayImage::new(10, 10).save(dir.path().join("a.png")).unwrap();

    let imported = YoloFormat
        .import(dir.path(), &ImportOptions::default())
        .unwrap();

    assert_eq!(imported.data.images.len(), 1);
    assert_eq!(imported.data.images[0].shape_count(), 1);
    assert_eq!(imported.warnings.len(), 3);
    assert!(
        imported
            .warnings
            .iter()
            .any(|w| w.message.contains("Image not found") && w.message.contains("orphan"))
    );
}

#[test]
fn test_yolo_import_requires_classes() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), "0 0.5 0.5 0.1 0.1").unwrap();

    let err = YoloFormat
        .import(dir.path(), &ImportOptions::default())
        .unwrap_err();
    assert!(matches!(err, FormatError::MissingField { .. }));
}
