//! Pascal VOC XML format implementation.
//!
//! One XML file per image. Every shape is written as an `object` with the
//! label name and an integer `bndbox`; paths and polygons are reduced to
//! their bounds clipped to the image.

use std::io::Write;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::format::error::FormatError;
use crate::format::formats::{
    boxed_shapes, files_with_extension, find_image_for_stem, mirrored_dir, output_path,
};
use crate::format::project::{ImageEntry, ProjectData, ProjectMetadata, ShapeEntry};
use crate::format::traits::{
    AnnotationFormat, ExportOptions, ExportResult, FormatWarning, ImportOptions, ImportResult,
};
use crate::model::{BoxGeometry, Geometry, Point, Rect, ShapeKind, display_name};

/// Pascal VOC XML format.
pub struct PascalVocFormat;

/// Elements whose contents are read but not interpreted.
const OPAQUE_ELEMENTS: &[&str] = &["source", "owner", "part"];

fn xml_error<E>(e: E) -> FormatError
where
    E: Into<quick_xml::Error>,
{
    FormatError::Xml(e.into())
}

/// Whether `child` may appear directly inside `parent`.
fn is_known_element(parent: Option<&str>, child: &str) -> bool {
    match parent {
        None => child == "annotation",
        Some("annotation") => matches!(
            child,
            "folder" | "filename" | "path" | "source" | "owner" | "size" | "segmented" | "object"
        ),
        Some("size") => matches!(child, "width" | "height" | "depth"),
        Some("object") => matches!(
            child,
            "name" | "pose" | "truncated" | "difficult" | "occluded" | "bndbox" | "part"
        ),
        Some("bndbox") => matches!(child, "xmin" | "ymin" | "xmax" | "ymax"),
        Some(_) => false,
    }
}

impl AnnotationFormat for PascalVocFormat {
    fn id(&self) -> &'static str {
        "voc"
    }

    fn display_name(&self) -> &'static str {
        "Pascal VOC (XML)"
    }

    fn extensions(&self) -> &[&'static str] {
        &["xml"]
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
        log::info!("Exporting Pascal VOC annotations to {:?}", path);

        std::fs::create_dir_all(path)?;

        let mut result = ExportResult::new();
        let folder = data
            .folder
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("");

        for image in &data.images {
            if image.dimensions.is_none() {
                result.add_warning(
                    FormatWarning::warning(format!(
                        "Image '{}' has no dimensions, using 0x0",
                        image.filename
                    ))
                    .with_image(&image.path),
                );
            }

            let xml = self.build_xml(folder, image, options, &mut result)?;
            let xml_path = output_path(path, &data.folder, image, ".xml")?;
            std::fs::write(&xml_path, xml)?;
            result.files_created.push(xml_path);
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
        log::info!("Importing Pascal VOC annotations from {:?}", path);

        if !path.is_dir() {
            return Err(FormatError::invalid_format(
                "Pascal VOC import requires a directory path",
            ));
        }

        let mut data = ProjectData::new();
        data.folder = options
            .image_base_path
            .clone()
            .unwrap_or_else(|| path.to_path_buf());
        let mut result = ImportResult::default();

        for xml_path in files_with_extension(path, "xml")? {
            let image_dir = match &options.image_base_path {
                Some(base) => mirrored_dir(path, &xml_path, base),
                None => xml_path.parent().map(Path::to_path_buf).unwrap_or_default(),
            };
            match self.parse_xml(&xml_path, &image_dir, options) {
                Ok(entry) => data.images.push(entry),
                Err(e) => {
                    log::warn!("Skipping {:?}: {}", xml_path, e);
                    result.add_warning(
                        FormatWarning::error(format!("{:?}: {}", xml_path, e)).with_image(&xml_path),
                    );
                }
            }
        }

        data.metadata = ProjectMetadata::new();
        data.metadata.extra.insert(
            "imported_from".into(),
            serde_json::Value::String("pascal_voc".into()),
        );

        log::info!(
            "Imported {} images with {} shapes ({} files skipped)",
            data.images.len(),
            data.total_shapes(),
            result.warnings.len()
        );

        result.data = data;
        Ok(result)
    }
}

impl PascalVocFormat {
    /// Build the XML document for one image.
    fn build_xml(
        &self,
        folder: &str,
        image: &ImageEntry,
        options: &ExportOptions,
        result: &mut ExportResult,
    ) -> Result<String, FormatError> {
        let (width, height) = image.dimensions.unwrap_or((0, 0));
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", None, None)))
            .map_err(xml_error)?;
        self.start(&mut writer, "annotation")?;

        self.write_text_element(&mut writer, "folder", folder)?;
        self.write_text_element(&mut writer, "filename", &image.filename)?;
        let full_path = options.resolve(&image.path);
        self.write_text_element(&mut writer, "path", &full_path.to_string_lossy())?;

        self.start(&mut writer, "source")?;
        self.write_text_element(&mut writer, "database", "Unknown")?;
        self.end(&mut writer, "source")?;

        self.start(&mut writer, "size")?;
        self.write_text_element(&mut writer, "width", &width.to_string())?;
        self.write_text_element(&mut writer, "height", &height.to_string())?;
        self.write_text_element(&mut writer, "depth", "3")?;
        self.end(&mut writer, "size")?;

        self.write_text_element(&mut writer, "segmented", "0")?;

        for shape in boxed_shapes(image, options, &mut result.warnings) {
            let rect = shape.rect;
            self.start(&mut writer, "object")?;
            self.write_text_element(&mut writer, "name", shape.label)?;
            self.write_text_element(&mut writer, "pose", "Unspecified")?;
            self.write_text_element(&mut writer, "truncated", "0")?;
            self.write_text_element(&mut writer, "difficult", "0")?;

            self.start(&mut writer, "bndbox")?;
            self.write_coordinate(&mut writer, "xmin", rect.x)?;
            self.write_coordinate(&mut writer, "ymin", rect.y)?;
            self.write_coordinate(&mut writer, "xmax", rect.right())?;
            self.write_coordinate(&mut writer, "ymax", rect.bottom())?;
            self.end(&mut writer, "bndbox")?;

            self.end(&mut writer, "object")?;
            result.annotations_exported += 1;
        }

        self.end(&mut writer, "annotation")?;

        String::from_utf8(writer.into_inner())
            .map_err(|_| FormatError::invalid_format("Invalid UTF-8 in XML"))
    }

    fn start<W: Write>(&self, writer: &mut Writer<W>, name: &str) -> Result<(), FormatError> {
        writer
            .write_event(Event::Start(BytesStart::new(name)))
            .map_err(xml_error)
    }

    fn end<W: Write>(&self, writer: &mut Writer<W>, name: &str) -> Result<(), FormatError> {
        writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_error)
    }

    /// Write a simple text element.
    fn write_text_element<W: Write>(
        &self,
        writer: &mut Writer<W>,
        name: &str,
        value: &str,
    ) -> Result<(), FormatError> {
        self.start(writer, name)?;
        writer
            .write_event(Event::Text(BytesText::new(value)))
            .map_err(xml_error)?;
        self.end(writer, name)
    }

    /// Pixel coordinates are written as rounded integers.
    fn write_coordinate<W: Write>(
        &self,
        writer: &mut Writer<W>,
        name: &str,
        value: f32,
    ) -> Result<(), FormatError> {
        self.write_text_element(writer, name, &(value.round() as i64).to_string())
    }

    /// Parse one Pascal VOC XML file into an image entry.
    ///
    /// Unknown elements abort this file only.
    fn parse_xml(
        &self,
        path: &Path,
        folder: &Path,
        options: &ImportOptions,
    ) -> Result<ImageEntry, FormatError> {
        let content = std::fs::read_to_string(path)?;
        let mut reader = Reader::from_str(&content);
        reader.trim_text(true);

        let mut filename = String::new();
        let mut width = 0u32;
        let mut height = 0u32;
        let mut objects: Vec<(String, Rect)> = Vec::new();

        let mut stack: Vec<String> = Vec::new();
        let mut obj_name = String::new();
        let mut corners: [Option<f32>; 4] = [None; 4];

        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(ref e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    self.check_element(&stack, &name, path)?;
                    if name == "object" && stack.len() == 1 {
                        obj_name.clear();
                        corners = [None; 4];
                    }
                    stack.push(name);
                }
                Event::Empty(ref e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    self.check_element(&stack, &name, path)?;
                }
                Event::End(_) => {
                    let Some(name) = stack.pop() else {
                        return Err(FormatError::invalid_format("Unbalanced closing tag"));
                    };
                    if name == "object" && stack.len() == 1 {
                        objects.push(self.finish_object(&obj_name, &corners)?);
                    }
                }
                Event::Text(ref e) => {
                    let text = e.unescape().map_err(xml_error)?.to_string();
                    let parent = stack.len().checked_sub(2).map(|i| stack[i].as_str());
                    match (parent, stack.last().map(String::as_str)) {
                        (Some("annotation"), Some("filename")) => filename = text,
                        (Some("size"), Some("width")) => width = parse_number(&text, "width")? as u32,
                        (Some("size"), Some("height")) => {
                            height = parse_number(&text, "height")? as u32
                        }
                        (Some("object"), Some("name")) => obj_name = text,
                        (Some("bndbox"), Some(field)) if stack.len() == 4 => {
                            let index = match field {
                                "xmin" => 0,
                                "ymin" => 1,
                                "xmax" => 2,
                                _ => 3,
                            };
                            corners[index] = Some(parse_number(&text, field)?);
                        }
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let image_path = if filename.is_empty() {
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
            find_image_for_stem(folder, stem)
        } else {
            folder.join(&filename)
        };

        let mut entry = ImageEntry::new(image_path);
        if width > 0 && height > 0 {
            entry = entry.with_dimensions(width, height);
        }
        for (name, rect) in objects {
            if !options.accepts(&name) {
                continue;
            }
            let shape = ShapeEntry::new(
                display_name(ShapeKind::Box, rect.top_left()),
                Geometry::Box(BoxGeometry::from_rect(rect)),
            );
            entry.label_mut_or_insert(&name, None).shapes.push(shape);
        }

        Ok(entry)
    }

    fn check_element(&self, stack: &[String], name: &str, path: &Path) -> Result<(), FormatError> {
        if stack.iter().any(|s| OPAQUE_ELEMENTS.contains(&s.as_str())) {
            return Ok(());
        }
        if is_known_element(stack.last().map(String::as_str), name) {
            Ok(())
        } else {
            Err(FormatError::unknown_element(name, path))
        }
    }

    fn finish_object(
        &self,
        name: &str,
        corners: &[Option<f32>; 4],
    ) -> Result<(String, Rect), FormatError> {
        if name.is_empty() {
            return Err(FormatError::missing_field("object/name"));
        }
        let field = |i: usize, label: &str| corners[i].ok_or_else(|| FormatError::missing_field(label));
        let rect = Rect::from_corners(
            Point::new(field(0, "bndbox/xmin")?, field(1, "bndbox/ymin")?),
            Point::new(field(2, "bndbox/xmax")?, field(3, "bndbox/ymax")?),
        );
        Ok((name.to_string(), rect))
    }
}

fn parse_number(text: &str, field: &str) -> Result<f32, FormatError> {
    text.trim()
        .parse::<f32>()
        .map_err(|_| FormatError::invalid_format(format!("'{}' is not a number in <{}>", text, field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_metadata() {
        let format = PascalVocFormat;
        assert_eq!(format.id(), "voc");
        assert!(!format.supports_polygon());
        assert!(format.supports_per_image());
        assert!(format.supports_import());
    }

    #[test]
    fn test_known_elements() {
        assert!(is_known_element(None, "annotation"));
        assert!(is_known_element(Some("object"), "bndbox"));
        assert!(is_known_element(Some("bndbox"), "ymax"));
        assert!(!is_known_element(Some("object"), "polygon"));
        assert!(!is_known_element(None, "root"));
    }
}
