//! YOLO TXT format implementation.
//!
//! One text file per image, one line per shape:
//! `<class> <center_x> <center_y> <width> <height>` normalized to the image
//! size with six decimals. The class is the label's row within its image;
//! `classes.txt` lists label names.

use std::path::Path;

use crate::format::error::FormatError;
use crate::format::formats::{
    boxed_shapes, files_with_extension, find_image_for_stem, mirrored_dir, output_path,
};
use crate::format::project::{ImageEntry, ProjectData, ProjectMetadata, ShapeEntry};
use crate::format::traits::{
    AnnotationFormat, ExportOptions, ExportResult, FormatWarning, ImportOptions, ImportResult,
};
use crate::model::{BoxGeometry, Geometry, Point, Rect, ShapeKind, display_name};

pub const CLASSES_FILE: &str = "classes.txt";

/// YOLO TXT format.
pub struct YoloFormat;

/// A parsed annotation line, still normalized.
#[derive(Debug, Clone, Copy, PartialEq)]
struct YoloLine {
    class: usize,
    cx: f32,
    cy: f32,
    w: f32,
    h: f32,
}

impl YoloLine {
    fn to_rect(self, width: f32, height: f32) -> Rect {
        let (w, h) = (self.w * width, self.h * height);
        Rect::new(self.cx * width - w / 2.0, self.cy * height - h / 2.0, w, h)
    }
}

impl AnnotationFormat for YoloFormat {
    fn id(&self) -> &'static str {
        "yolo"
    }

    fn display_name(&self) -> &'static str {
        "YOLO (TXT)"
    }

    fn extensions(&self) -> &[&'static str] {
        &["txt"]
    }

    fn supports_polygon(&self) -> bool {
        false
    }

    fn supports_per_image(&self) -> bool {
        true
    }

    fn export(
        &self,
        data: &ProjectData,
        path: &Path,
        options: &ExportOptions,
    ) -> Result<ExportResult, FormatError> {
        log::info!("Exporting YOLO annotations to {:?}", path);

        std::fs::create_dir_all(path)?;
        let mut result = ExportResult::new();

        let classes = data.label_names();
        let classes_path = path.join(CLASSES_FILE);
        std::fs::write(&classes_path, classes.join("\n"))?;
        result.files_created.push(classes_path);

        for image in &data.images {
            let Some(bounds) = image.bounds() else {
                result.add_warning(
                    FormatWarning::error(
                        FormatError::missing_dimensions("YOLO", image.filename.as_str()).to_string(),
                    )
                    .with_image(&image.path),
                );
                continue;
            };

            for (row, label) in image.labels.iter().enumerate() {
                if classes.get(row) != Some(&label.name) {
                    result.add_warning(
                        FormatWarning::warning(format!(
                            "Label '{}' is row {} here but not in {}",
                            label.name, row, CLASSES_FILE
                        ))
                        .with_image(&image.path),
                    );
                }
            }

            let lines: Vec<String> = boxed_shapes(image, options, &mut result.warnings)
                .into_iter()
                .map(|shape| format_line(shape.class_index, shape.rect, bounds))
                .collect();
            result.annotations_exported += lines.len();

            let txt_path = output_path(path, &data.folder, image, ".txt")?;
            std::fs::write(&txt_path, lines.join("\n"))?;
            result.files_created.push(txt_path);
            result.images_exported += 1;
        }

        log::info!(
            "Exported {} images with {} annotations ({} warnings)",
            result.images_exported,
            result.annotations_exported,
            result.warnings.len()
        );

        Ok(result)
    }

    fn import(&self, path: &Path, options: &ImportOptions) -> Result<ImportResult, FormatError> {
        log::info!("Importing YOLO annotations from {:?}", path);

        if !path.is_dir() {
            return Err(FormatError::invalid_format(
                "YOLO import requires a directory path",
            ));
        }

        let classes_path = path.join(CLASSES_FILE);
        if !classes_path.exists() {
            return Err(FormatError::missing_field(CLASSES_FILE));
        }
        let classes: Vec<String> = std::fs::read_to_string(&classes_path)?
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();

        let image_dir = options
            .image_base_path
            .clone()
            .unwrap_or_else(|| path.to_path_buf());

        let mut data = ProjectData::new();
        data.folder = image_dir.clone();
        let mut result = ImportResult::default();

        let txt_files = files_with_extension(path, "txt")?
            .into_iter()
            .filter(|p| p.file_name().is_some_and(|n| n != CLASSES_FILE));

        for txt_path in txt_files {
            let stem = txt_path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
            let image_path = find_image_for_stem(&mirrored_dir(path, &txt_path, &image_dir), stem);

            let (width, height) = match image::image_dimensions(&image_path) {
                Ok(dims) => dims,
                Err(e) => {
                    let reason = if image_path.is_file() {
                        FormatError::from(e)
                    } else {
                        FormatError::image_not_found(&image_path)
                    };
                    result.add_warning(
                        FormatWarning::error(format!("Skipping {:?}: {}", txt_path, reason))
                            .with_image(&image_path),
                    );
                    continue;
                }
            };

            let mut entry = ImageEntry::new(image_path).with_dimensions(width, height);
            // Every class gets a row so class index and row stay aligned.
            for name in classes.iter().filter(|n| options.accepts(n)) {
                entry.label_mut_or_insert(name, None);
            }

            let content = std::fs::read_to_string(&txt_path)?;
            for (number, line) in content.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let Some(parsed) = parse_yolo_line(line) else {
                    result.add_warning(
                        FormatWarning::warning(format!(
                            "{:?}:{}: malformed line skipped",
                            txt_path,
                            number + 1
                        ))
                        .with_image(&entry.path),
                    );
                    continue;
                };
                let Some(name) = classes.get(parsed.class) else {
                    result.add_warning(
                        FormatWarning::warning(format!(
                            "{:?}:{}: class {} not in {}",
                            txt_path,
                            number + 1,
                            parsed.class,
                            CLASSES_FILE
                        ))
                        .with_image(&entry.path),
                    );
                    continue;
                };
                if !options.accepts(name) {
                    continue;
                }

                let rect = parsed.to_rect(width as f32, height as f32);
                let shape = ShapeEntry::new(
                    display_name(ShapeKind::Box, rect.top_left()),
                    Geometry::Box(BoxGeometry::from_rect(rect)),
                );
                entry.label_mut_or_insert(name, None).shapes.push(shape);
            }

            data.images.push(entry);
        }

        data.metadata = ProjectMetadata::new();
        data.metadata.extra.insert(
            "imported_from".into(),
            serde_json::Value::String("yolo".into()),
        );

        log::info!(
            "Imported {} images with {} shapes ({} warnings)",
            data.images.len(),
            data.total_shapes(),
            result.warnings.len()
        );

        result.data = data;
        Ok(result)
    }
}

/// Normalized center/size line for a pixel rectangle.
fn format_line(class: usize, rect: Rect, bounds: Rect) -> String {
    let center = rect.center();
    format!(
        "{} {:.6} {:.6} {:.6} {:.6}",
        class,
        center.x / bounds.width,
        center.y / bounds.height,
        rect.width / bounds.width,
        rect.height / bounds.height
    )
}

fn parse_yolo_line(line: &str) -> Option<YoloLine> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 5 {
        return None;
    }

    Some(YoloLine {
        class: parts[0].parse().ok()?,
        cx: parts[1].parse().ok()?,
        cy: parts[2].parse().ok()?,
        w: parts[3].parse().ok()?,
        h: parts[4].parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yolo_line() {
        let parsed = parse_yolo_line("0 0.5 0.5 0.2 0.3").unwrap();
        assert_eq!(parsed.class, 0);

        let rect = parsed.to_rect(100.0, 200.0);
        assert!((rect.x - 40.0).abs() < 0.001);
        assert!((rect.y - 70.0).abs() < 0.001);
        assert!((rect.width - 20.0).abs() < 0.001);
        assert!((rect.height - 60.0).abs() < 0.001);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_yolo_line("0 0.5 0.5 0.2").is_none());
        assert!(parse_yolo_line("a 0.5 0.5 0.2 0.3").is_none());
        assert!(parse_yolo_line("-1 0.5 0.5 0.2 0.3").is_none());
    }

    #[test]
    fn test_format_line() {
        let bounds = Rect::new(0.0, 0.0, 100.0, 100.0);
        let rect = Rect::from_corners(Point::new(10.0, 10.0), Point::new(50.0, 80.0));
        assert_eq!(
            format_line(0, rect, bounds),
            "0 0.300000 0.450000 0.400000 0.700000"
        );
    }

    #[test]
    fn test_format_metadata() {
        let format = YoloFormat;
        assert_eq!(format.id(), "yolo");
        assert!(!format.supports_polygon());
        assert!(format.supports_per_image());
    }
}
