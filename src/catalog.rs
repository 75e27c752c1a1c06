//! Image catalog: the ordered list of images a session annotates.

use std::path::{Path, PathBuf};

use crate::config::AppConfig;

/// Images of a project folder with a cursor on the active one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImageCatalog {
    /// Project folder (empty when the catalog was built from loose paths)
    pub folder: PathBuf,
    images: Vec<PathBuf>,
    current: Option<usize>,
}

impl ImageCatalog {
    pub fn new(folder: PathBuf, mut images: Vec<PathBuf>) -> Self {
        images.sort();
        images.dedup();
        Self {
            folder,
            images,
            current: None,
        }
    }

    /// Supported images directly inside `folder`, sorted by name.
    pub fn from_folder(folder: &Path, config: &AppConfig) -> std::io::Result<Self> {
        let images: Vec<PathBuf> = std::fs::read_dir(folder)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && config.is_supported_image(path))
            .collect();

        if images.is_empty() {
            log::warn!("No supported images in {:?}", folder);
        } else {
            log::info!("Scanned {:?}: found {} images", folder, images.len());
        }

        Ok(Self::new(folder.to_path_buf(), images))
    }

    /// Catalog from a mix of files and folders; folders are scanned
    /// recursively.
    pub fn from_paths(paths: &[PathBuf], config: &AppConfig) -> Self {
        let mut images = Vec::new();
        for path in paths {
            if path.is_file() && config.is_supported_image(path) {
                images.push(path.clone());
            } else if path.is_dir() {
                if let Err(e) = scan_recursive(path, config, &mut images) {
                    log::warn!("Failed to scan folder {:?}: {}", path, e);
                }
            }
        }

        let folder = match paths {
            [single] if single.is_dir() => single.clone(),
            _ => images
                .first()
                .and_then(|p| p.parent())
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };
        Self::new(folder, images)
    }

    pub fn images(&self) -> &[PathBuf] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.index_of(path).is_some()
    }

    pub fn index_of(&self, path: &Path) -> Option<usize> {
        self.images.iter().position(|p| p == path)
    }

    pub fn current_image(&self) -> Option<&Path> {
        self.current
            .and_then(|i| self.images.get(i))
            .map(PathBuf::as_path)
    }

    /// Move the cursor to `path`. Returns false if it is not in the catalog.
    pub fn select(&mut self, path: &Path) -> bool {
        match self.index_of(path) {
            Some(index) => {
                self.current = Some(index);
                true
            }
            None => false,
        }
    }

    /// Add an image, keeping the catalog sorted. No-op if already present.
    pub fn insert(&mut self, path: PathBuf) {
        if self.contains(&path) {
            return;
        }
        let current = self.current_image().map(Path::to_path_buf);
        self.images.push(path);
        self.images.sort();
        self.current = current.and_then(|c| self.index_of(&c));
    }

    /// Image after the current one, wrapping around.
    pub fn next_image(&self) -> Option<&Path> {
        if self.images.is_empty() {
            return None;
        }
        let index = self.current.map_or(0, |i| (i + 1) % self.images.len());
        self.images.get(index).map(PathBuf::as_path)
    }

    /// Image before the current one, wrapping around.
    pub fn previous_image(&self) -> Option<&Path> {
        let last = self.images.len().checked_sub(1)?;
        let index = match self.current {
            Some(0) | None => last,
            Some(i) => i - 1,
        };
        self.images.get(index).map(PathBuf::as_path)
    }

    /// Display name of the current image, relative to the folder if possible.
    pub fn current_name(&self) -> String {
        let Some(path) = self.current_image() else {
            return "Unknown".to_string();
        };

        if !self.folder.as_os_str().is_empty() {
            if let Some(relative) = path.strip_prefix(&self.folder).ok().and_then(Path::to_str) {
                return relative.to_string();
            }
        }

        path.file_name()
            .and_then(|n| n.to_str())
            .map(String::from)
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// Progress string like "3/15".
    pub fn progress(&self) -> String {
        format!("{}/{}", self.current.map_or(0, |i| i + 1), self.images.len())
    }
}

fn scan_recursive(folder: &Path, config: &AppConfig, images: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(folder)?.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_file() && config.is_supported_image(&path) {
            images.push(path);
        } else if path.is_dir() {
            if let Err(e) = scan_recursive(&path, config, images) {
                log::warn!("Failed to scan subdirectory {:?}: {}", path, e);
            }
        }
    }
    Ok(())
}
