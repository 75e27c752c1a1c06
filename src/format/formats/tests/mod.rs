//! Unit tests for annotation format implementations.
//!
//! These tests write into temporary directories and check the files each
//! converter produces, plus import of what was exported.

mod project_json_tests;
mod yolo_tests;

use std::path::PathBuf;

use crate::color_utils::Color;
use crate::format::project::{ImageEntry, LabelEntry, ProjectData, ShapeEntry};
use crate::model::{BoxGeometry, Geometry, PathGeometry, Point, PolygonGeometry, Rect, ShapeGeometry};

pub(super) fn boxed(x: f32, y: f32, w: f32, h: f32) -> ShapeEntry {
    ShapeEntry::new(
        format!("Box at ({}, {})", x, y),
        Geometry::Box(BoxGeometry::from_rect(Rect::new(x, y, w, h))),
    )
}

pub(super) fn polygon(points: &[(f32, f32)]) -> ShapeEntry {
    let mut poly = PolygonGeometry::new(Point::new(points[0].0, points[0].1));
    for (x, y) in &points[1..] {
        poly.apply_point(Point::new(*x, *y));
    }
    poly.closed = true;
    ShapeEntry::new("Polygon", Geometry::Polygon(poly))
}

pub(super) fn stroke(points: &[(f32, f32)], radius: f32) -> ShapeEntry {
    let mut path = PathGeometry::new(Point::new(points[0].0, points[0].1), radius);
    for (x, y) in &points[1..] {
        path.apply_point(Point::new(*x, *y));
    }
    ShapeEntry::new("Path", Geometry::Path(path))
}

/// Two images, two labels each; the second image has no dimensions.
pub(super) fn sample_project() -> ProjectData {
    let mut data = ProjectData::new();
    data.folder = PathBuf::from("/data/street");

    let mut first = ImageEntry::new(PathBuf::from("/data/street/frame_001.png")).with_dimensions(100, 100);
    let mut car = LabelEntry::new("car").with_color(Color::rgb(230, 25, 75));
    car.shapes.push(boxed(10.0, 10.0, 40.0, 70.0));
    car.shapes.push(polygon(&[(60.0, 60.0), (90.0, 60.0), (90.0, 90.0)]));
    let mut person = LabelEntry::new("person").with_color(Color::rgb(60, 180, 75));
    person.shapes.push(stroke(&[(20.0, 20.0), (30.0, 20.0)], 2.0));
    first.labels = vec![car, person];

    let mut second = ImageEntry::new(PathBuf::from("/data/street/frame_002.png"));
    let mut car = LabelEntry::new("car").with_color(Color::rgb(230, 25, 75));
    car.shapes.push(boxed(5.0, 5.0, 10.0, 10.0));
    second.labels = vec![car, LabelEntry::new("person")];

    data.images = vec![first, second];
    data
}
