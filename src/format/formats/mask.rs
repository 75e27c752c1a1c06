//! Pixel mask export.
//!
//! Each image is rendered to an 8-bit grayscale PNG `<stem>_mask.png`:
//! background is 0 and every shape is filled with its label's row + 1.
//! Rendering works on the snapshot, so the live scene's colors and
//! visibility are never touched.

use std::path::Path;

use image::{GrayImage, Luma};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_polygon_mut};
use imageproc::point::Point as PixelPoint;
use imageproc::rect::Rect as PixelRect;

use crate::format::error::FormatError;
use crate::format::formats::output_path;
use crate::format::project::{ImageEntry, ProjectData};
use crate::format::traits::{
    AnnotationFormat, ExportOptions, ExportResult, FormatWarning, ImportOptions, ImportResult,
};
use crate::model::{Geometry, PathGeometry, Point};

/// Highest label row that still fits in an 8-bit mask value.
const MAX_LABEL_ROWS: usize = u8::MAX as usize;

/// Grayscale index mask format.
pub struct MaskFormat;

impl AnnotationFormat for MaskFormat {
    fn id(&self) -> &'static str {
        "mask"
    }

    fn display_name(&self) -> &'static str {
        "Pixel Mask (PNG)"
    }

    fn extensions(&self) -> &[&'static str] {
        &["png"]
    }

    fn supports_polygon(&self) -> bool {
        true
    }

    fn supports_per_image(&self) -> bool {
        true
    }

    fn supports_import(&self) -> bool {
        false
    }

    fn export(
        &self,
        data: &ProjectData,
        path: &Path,
        _options: &ExportOptions,
    ) -> Result<ExportResult, FormatError> {
        log::info!("Exporting pixel masks to {:?}", path);

        std::fs::create_dir_all(path)?;
        let mut result = ExportResult::new();

        for image in &data.images {
            if image.labels.len() > MAX_LABEL_ROWS {
                result.add_warning(
                    FormatWarning::warning(format!(
                        "Only the first {} labels of '{}' fit in an 8-bit mask",
                        MAX_LABEL_ROWS, image.filename
                    ))
                    .with_image(&image.path),
                );
            }
            let Some(mask) = render_mask(image) else {
                result.add_warning(
                    FormatWarning::error(
                        FormatError::missing_dimensions("Pixel mask", image.filename.as_str())
                            .to_string(),
                    )
                    .with_image(&image.path),
                );
                continue;
            };

            let mask_path = output_path(path, &data.folder, image, "_mask.png")?;
            mask.save(&mask_path)?;
            result.files_created.push(mask_path);
            result.annotations_exported += image
                .labels
                .iter()
                .take(MAX_LABEL_ROWS)
                .map(|l| l.shapes.len())
                .sum::<usize>();
            result.images_exported += 1;
        }

        log::info!(
            "Exported {} masks with {} shapes ({} warnings)",
            result.images_exported,
            result.annotations_exported,
            result.warnings.len()
        );

        Ok(result)
    }

    fn import(&self, _path: &Path, _options: &ImportOptions) -> Result<ImportResult, FormatError> {
        Err(FormatError::UnsupportedOperation(
            "pixel masks cannot be imported".into(),
        ))
    }
}

/// Render the label index mask of one image.
///
/// Labels are drawn in row order, so later rows paint over earlier ones.
/// Visibility is ignored: a mask always contains every shape.
/// `None` when the image dimensions are unknown.
pub fn render_mask(image: &ImageEntry) -> Option<GrayImage> {
    let (width, height) = image.dimensions.filter(|(w, h)| *w > 0 && *h > 0)?;
    let mut mask = GrayImage::new(width, height);

    for (row, label) in image.labels.iter().take(MAX_LABEL_ROWS).enumerate() {
        let value = Luma([(row + 1) as u8]);
        for shape in &label.shapes {
            draw_geometry(&mut mask, &shape.geometry, value);
        }
    }
    Some(mask)
}

fn draw_geometry(mask: &mut GrayImage, geometry: &Geometry, value: Luma<u8>) {
    match geometry {
        Geometry::Box(b) => {
            if b.is_degenerate() {
                return;
            }
            let rect = b.rect();
            let (x0, y0) = (rect.x.round() as i32, rect.y.round() as i32);
            let (x1, y1) = (rect.right().round() as i32, rect.bottom().round() as i32);
            if x1 > x0 && y1 > y0 {
                let pixels = PixelRect::at(x0, y0).of_size((x1 - x0) as u32, (y1 - y0) as u32);
                draw_filled_rect_mut(mask, pixels, value);
            }
        }
        Geometry::Polygon(p) => fill_polygon(mask, &p.vertices, value),
        Geometry::Path(p) => stroke_path(mask, p, value),
    }
}

/// Fill a polygon given its vertices, ignoring ones that round together.
fn fill_polygon(mask: &mut GrayImage, vertices: &[Point], value: Luma<u8>) {
    let mut pixels: Vec<PixelPoint<i32>> = Vec::with_capacity(vertices.len());
    for v in vertices {
        let p = PixelPoint::new(v.x.round() as i32, v.y.round() as i32);
        if pixels.last() != Some(&p) {
            pixels.push(p);
        }
    }
    // The closing edge is implied; a repeated first vertex is rejected.
    while pixels.len() > 1 && pixels.first() == pixels.last() {
        pixels.pop();
    }
    if pixels.len() >= 3 {
        draw_polygon_mut(mask, &pixels, value);
    }
}

/// Fill the outline a round brush of the path's radius leaves behind.
fn stroke_path(mask: &mut GrayImage, path: &PathGeometry, value: Luma<u8>) {
    let radius = path.radius.max(0.5);
    for (a, b) in path.segments() {
        let (dx, dy) = (b.x - a.x, b.y - a.y);
        let len = (dx * dx + dy * dy).sqrt();
        if len == 0.0 {
            continue;
        }
        let (nx, ny) = (-dy / len * radius, dx / len * radius);
        let quad = [
            Point::new(a.x + nx, a.y + ny),
            Point::new(b.x + nx, b.y + ny),
            Point::new(b.x - nx, b.y - ny),
            Point::new(a.x - nx, a.y - ny),
        ];
        fill_polygon(mask, &quad, value);
    }

    let pixel_radius = radius.round().max(1.0) as i32;
    for op in &path.ops {
        let p = op.point();
        draw_filled_circle_mut(mask, (p.x.round() as i32, p.y.round() as i32), pixel_radius, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::project::{LabelEntry, ShapeEntry};
    use crate::model::{BoxGeometry, PolygonGeometry, Rect};

    #[test]
    fn test_fill_polygon_ignores_repeated_first_vertex() {
        let mut mask = GrayImage::new(20, 20);
        let square = [
            Point::new(2.0, 2.0),
            Point::new(10.0, 2.0),
            Point::new(10.0, 10.0),
            Point::new(2.0, 10.0),
            Point::new(2.0, 2.0),
        ];
        fill_polygon(&mut mask, &square, Luma([7]));
        assert_eq!(mask.get_pixel(5, 5)[0], 7);
        assert_eq!(mask.get_pixel(15, 15)[0], 0);
    }

    #[test]
    fn test_fill_polygon_skips_collapsed() {
        let mut mask = GrayImage::new(10, 10);
        let sliver = [Point::new(1.0, 1.0), Point::new(1.2, 1.1), Point::new(5.0, 5.0)];
        fill_polygon(&mut mask, &sliver, Luma([3]));
        assert!(mask.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_render_without_dimensions() {
        let image = ImageEntry::new("a.png".into());
        assert!(render_mask(&image).is_none());
    }

    #[test]
    fn test_later_rows_paint_over_earlier() {
        let mut image = ImageEntry::new("a.png".into()).with_dimensions(30, 30);
        let mut first = LabelEntry::new("under");
        first.shapes.push(ShapeEntry::new(
            "b",
            Geometry::Box(BoxGeometry::from_rect(Rect::new(0.0, 0.0, 20.0, 20.0))),
        ));
        let mut second = LabelEntry::new("over");
        let mut poly = PolygonGeometry::new(Point::new(10.0, 10.0));
        poly.vertices.extend([Point::new(25.0, 10.0), Point::new(25.0, 25.0), Point::new(10.0, 25.0)]);
        poly.closed = true;
        second.shapes.push(ShapeEntry::new("p", Geometry::Polygon(poly)));
        image.labels = vec![first, second];

        let mask = render_mask(&image).unwrap();
        assert_eq!(mask.get_pixel(5, 5)[0], 1);
        assert_eq!(mask.get_pixel(15, 15)[0], 2);
        assert_eq!(mask.get_pixel(28, 2)[0], 0);
    }
}
