//! Annotation format implementations.

mod mask;
mod pascal_voc;
mod project_json;
mod yolo;

#[cfg(test)]
mod tests;

pub use mask::{MaskFormat, render_mask};
pub use pascal_voc::PascalVocFormat;
pub use project_json::ProjectJsonFormat;
pub use yolo::YoloFormat;

use std::path::{Path, PathBuf};

use crate::format::project::ImageEntry;
use crate::format::traits::{ExportOptions, FormatWarning};
use crate::model::Rect;

/// A shape reduced to the rectangle a bounding-box format writes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BoxedShape<'a> {
    /// Row of the owning label within its image.
    pub class_index: usize,
    pub label: &'a str,
    pub rect: Rect,
}

/// Bounding rectangles of every exportable shape of `image`, in row order.
///
/// Degenerate shapes and shapes entirely outside the image are skipped with a
/// warning; hidden shapes are skipped silently when the options ask for it.
pub(crate) fn boxed_shapes<'a>(
    image: &'a ImageEntry,
    options: &ExportOptions,
    warnings: &mut Vec<FormatWarning>,
) -> Vec<BoxedShape<'a>> {
    let bounds = image.bounds();
    let mut out = Vec::new();
    for (class_index, label) in image.labels.iter().enumerate() {
        for shape in &label.shapes {
            if options.skip_hidden && (!shape.visible || !label.check.is_visible()) {
                continue;
            }
            match shape.export_rect(bounds) {
                Some(rect) => out.push(BoxedShape {
                    class_index,
                    label: &label.name,
                    rect,
                }),
                None => warnings.push(
                    FormatWarning::warning(format!(
                        "Skipped '{}' under '{}': degenerate or outside the image",
                        shape.name, label.name
                    ))
                    .with_image(&image.path),
                ),
            }
        }
    }
    out
}

/// Per-image output path `<dir>/<sub>/<stem><suffix>`, where `<sub>` is the
/// image's sub-directory below `folder`. Same-named images in different
/// sub-directories therefore never share an output file. The directory is
/// created as needed.
pub(crate) fn output_path(
    dir: &Path,
    folder: &Path,
    image: &ImageEntry,
    suffix: &str,
) -> std::io::Result<PathBuf> {
    let sub = image
        .path
        .parent()
        .filter(|_| !folder.as_os_str().is_empty())
        .and_then(|p| p.strip_prefix(folder).ok());
    let target = match sub {
        Some(sub) if !sub.as_os_str().is_empty() => {
            let target = dir.join(sub);
            std::fs::create_dir_all(&target)?;
            target
        }
        _ => dir.to_path_buf(),
    };
    Ok(target.join(format!("{}{}", image.stem(), suffix)))
}

/// Where the image for `file` (found below `root`) lives: the same
/// sub-directory, taken below `base`.
pub(crate) fn mirrored_dir(root: &Path, file: &Path, base: &Path) -> PathBuf {
    match file.parent().and_then(|p| p.strip_prefix(root).ok()) {
        Some(sub) if !sub.as_os_str().is_empty() => base.join(sub),
        _ => base.to_path_buf(),
    }
}

/// Files below `dir` with the given extension, sorted by path.
pub(crate) fn files_with_extension(dir: &Path, extension: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for path in std::fs::read_dir(&current)?.filter_map(|e| e.ok()).map(|e| e.path()) {
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == extension) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Find an image file matching the given stem in the directory.
pub(crate) fn find_image_for_stem(dir: &Path, stem: &str) -> PathBuf {
    const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tiff", "tif", "webp"];

    for ext in IMAGE_EXTENSIONS {
        let path = dir.join(format!("{}.{}", stem, ext));
        if path.exists() {
            return path;
        }
    }

    dir.join(format!("{}.png", stem))
}
