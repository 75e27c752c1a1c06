//! Tests for the project JSON format.

use tempfile::TempDir;

use super::sample_project;
use crate::format::FormatError;
use crate::format::formats::ProjectJsonFormat;
use crate::format::project::ProjectData;
use crate::format::traits::{AnnotationFormat, ExportOptions, ImportOptions};
use crate::model::{CheckState, Geometry};

#[test]
fn test_project_format_metadata() {
    let format = ProjectJsonFormat;

    assert_eq!(format.id(), "annoscene");
    assert!(format.supports_polygon());
    assert!(!format.supports_per_image());
    assert!(format.supports_import());
}

#[test]
fn test_project_save_and_load_is_identical() {
    let mut data = sample_project();
    data.images[0].labels[1].check = CheckState::Unchecked;
    data.images[0].labels[1].shapes[0].visible = false;
    data.images[0].labels[0].shapes[1].color = Some(crate::color_utils::Color::rgb(1, 2, 3));

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("street.annoscene.json");
    let result = ProjectJsonFormat
        .export(&data, &path, &ExportOptions::default())
        .unwrap();
    assert_eq!(result.files_created, vec![path.clone()]);
    assert_eq!(result.annotations_exported, 4);

    let loaded = ProjectJsonFormat
        .import(&path, &ImportOptions::default())
        .unwrap();
    assert!(loaded.warnings.is_empty());
    assert_eq!(loaded.data, data);
}

#[test]
fn test_project_json_shape_tags() {
    let json = String::from_utf8(ProjectJsonFormat::to_bytes(&sample_project()).unwrap()).unwrap();

    assert!(json.contains("\"type\": \"box\""));
    assert!(json.contains("\"type\": \"polygon\""));
    assert!(json.contains("\"type\": \"path\""));
    assert!(json.contains("\"version\": \"0.1.0\""));
}

#[test]
fn test_project_minimal_document_uses_defaults() {
    let json = r#"{
        "version": "0.1.0",
        "images": [{
            "path": "a.png",
            "filename": "a.png",
            "labels": [{
                "name": "car",
                "shapes": [{
                    "name": "Box at (1, 2)",
                    "geometry": {"type": "box", "corners": [{"x": 1.0, "y": 2.0}, {"x": 5.0, "y": 6.0}], "closed": true}
                }]
            }]
        }]
    }"#;

    let data = ProjectJsonFormat::parse(json).unwrap().data;
    let label = &data.images[0].labels[0];
    assert_eq!(label.color, None);
    assert_eq!(label.check, CheckState::Checked);
    assert!(label.shapes[0].visible);
    assert!(matches!(label.shapes[0].geometry, Geometry::Box(_)));
}

#[test]
fn test_project_version_checks() {
    let mut data = ProjectData::new();
    data.version = "0.2.0".into();
    let json = String::from_utf8(ProjectJsonFormat::to_bytes(&data).unwrap()).unwrap();
    let loaded = ProjectJsonFormat::parse(&json).unwrap();
    assert_eq!(loaded.warnings.len(), 1);

    data.version = "7.0.0".into();
    let json = String::from_utf8(ProjectJsonFormat::to_bytes(&data).unwrap()).unwrap();
    assert!(matches!(
        ProjectJsonFormat::parse(&json),
        Err(FormatError::VersionMismatch { .. })
    ));
}

#[test]
fn test_project_import_label_filter() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("p.json");
    ProjectJsonFormat
        .export(&sample_project(), &path, &ExportOptions::default())
        .unwrap();

    let loaded = ProjectJsonFormat
        .import(&path, &ImportOptions::new().label_filter(vec!["car".into()]))
        .unwrap();
    assert!(loaded.data.images.iter().all(|i| i.labels.len() == 1));
}

#[test]
fn test_project_import_rejects_garbage() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("p.json");
    std::fs::write(&path, "{not json").unwrap();

    assert!(matches!(
        ProjectJsonFormat.import(&path, &ImportOptions::default()),
        Err(FormatError::Json(_))
    ));
}
