//! Annotation session: the façade a host application drives.
//!
//! [`AnnotationSession`] ties the pieces together. It owns the image catalog,
//! the [`Synchronizer`], one [`CommandLog`](crate::undo::CommandLog) per image
//! and the tool state machine, and exposes plain methods for everything the
//! UI does: switching images, managing labels, feeding pointer events,
//! undo/redo, direct node edits, import/export and project persistence.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::catalog::ImageCatalog;
use crate::color_utils::Color;
use crate::config::AppConfig;
use crate::format::formats::ProjectJsonFormat;
use crate::format::{
    AnnotationFormat, AutoSaveManager, ExportOptions, ExportResult, FormatError, FormatRegistry,
    FormatWarning, ImageEntry, ImportOptions, LabelEntry, ProjectData, ProjectMetadata, ShapeEntry,
};
use crate::model::{CheckState, Geometry, NodeId, Point, Rect, ShapeKind};
use crate::scene::GraphicId;
use crate::sync::{Removal, SceneChange, SyncEvent, Synchronizer};
use crate::tools::{PointerEvent, Tool, ToolContext, ToolController, ToolResponse};
use crate::undo::{Command, UndoHistories};

/// Errors surfaced to the host.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No image is active")]
    NoActiveImage,

    #[error("No such label on the active image")]
    NoLabel,

    #[error("Unknown node {0}")]
    UnknownNode(NodeId),

    #[error("Image is not part of the catalog: {0:?}")]
    UnknownImage(PathBuf),

    #[error("Unknown format '{0}'")]
    UnknownFormat(String),

    /// The caller has to decide what happens to the edits of this image
    #[error("Unsaved changes in {0:?}")]
    UnsavedChanges(PathBuf),

    #[error("No project file to save to")]
    NoProjectPath,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{path:?}: {source}")]
    Format {
        /// File or directory the conversion failed on
        path: PathBuf,
        #[source]
        source: FormatError,
    },
}

impl SessionError {
    fn format(path: &Path) -> impl FnOnce(FormatError) -> Self + '_ {
        move |source| SessionError::Format {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What to do with unsaved edits when leaving an image or closing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnsavedPolicy {
    /// Refuse with [`SessionError::UnsavedChanges`] and let the user decide
    #[default]
    Ask,
    /// Leave the edits in memory
    Keep,
    /// Write the project file first
    Save,
    /// Revert the image to the last saved project state
    Discard,
}

// ============================================================================
// Editor
// ============================================================================

/// The editing half of the session: everything the tools act upon.
#[derive(Debug)]
struct Editor {
    sync: Synchronizer,
    histories: UndoHistories,
    config: AppConfig,
    /// Label new shapes go under, resolved by name on each image
    current_label: Option<String>,
    /// Distinct label names in order of first use; the index picks the color
    label_names: Vec<String>,
    dirty: HashSet<PathBuf>,
    autosave: AutoSaveManager,
}

impl Editor {
    fn new(config: AppConfig) -> Self {
        Self {
            sync: Synchronizer::new(),
            histories: UndoHistories::new(config.undo_config()),
            autosave: AutoSaveManager::from_preferences(&config.preferences),
            config,
            current_label: None,
            label_names: Vec::new(),
            dirty: HashSet::new(),
        }
    }

    fn active_file(&self) -> Option<PathBuf> {
        self.sync.active_file().map(Path::to_path_buf)
    }

    /// Palette color for `name`. The same name gets the same color on
    /// every image.
    fn label_color(&mut self, name: &str) -> Color {
        let index = match self.label_names.iter().position(|n| n == name) {
            Some(index) => index,
            None => {
                self.label_names.push(name.to_string());
                self.label_names.len() - 1
            }
        };
        self.config.label_color(index)
    }

    fn current_label_node(&self) -> Option<NodeId> {
        let file = self.sync.active_file()?;
        let tree = self.sync.tree();
        self.current_label
            .as_deref()
            .and_then(|name| tree.label_by_name(file, name))
            .or_else(|| tree.labels_for_file(file).next().map(|n| n.id()))
    }

    fn mark_dirty(&mut self, file: &Path) {
        if self.dirty.insert(file.to_path_buf()) {
            log::debug!("Session: {:?} has unsaved changes", file);
        }
        self.autosave.mark_dirty();
    }

    fn mark_node_dirty(&mut self, node: NodeId) {
        if let Some(file) = self.sync.tree().get(node).map(|n| n.file.clone()) {
            self.mark_dirty(&file);
        }
    }

    fn mark_all_saved(&mut self) {
        self.dirty.clear();
        self.autosave.mark_saved();
    }

    /// Mirror command output into the tree.
    fn apply(&mut self, changes: Vec<SceneChange>) {
        if changes.is_empty() {
            return;
        }
        self.sync.apply_scene_changes(&changes);
        if let Some(file) = self.active_file() {
            self.mark_dirty(&file);
        }
    }

    fn execute(&mut self, command: Command) {
        let Some(log) = self.histories.active_mut() else {
            log::debug!("Session: no active command log, {} dropped", command.description());
            return;
        };
        let changes = log.execute(command, self.sync.scene_mut());
        self.apply(changes);
    }

    fn undo(&mut self) -> bool {
        let Some(log) = self.histories.active_mut() else {
            return false;
        };
        if !log.can_undo() {
            return false;
        }
        let changes = log.undo(self.sync.scene_mut());
        self.apply(changes);
        true
    }

    fn redo(&mut self) -> bool {
        let Some(log) = self.histories.active_mut() else {
            return false;
        };
        if !log.can_redo() {
            return false;
        }
        let changes = log.redo(self.sync.scene_mut());
        self.apply(changes);
        true
    }

    /// Remove a node row, dropping its shapes from every command log. Shapes
    /// of a removed label that are currently undone go as well.
    fn remove_node(&mut self, node: NodeId) -> Removal {
        let removal = self.sync.remove_node(node);
        for graphic in &removal.graphics {
            self.histories.forget(*graphic);
            self.histories.forget_under(*graphic);
        }
        removal
    }
}

impl ToolContext for Editor {
    fn begin_shape(&mut self, kind: ShapeKind, at: Point, radius: f32) -> Option<GraphicId> {
        let Some(label) = self.current_label_node() else {
            log::warn!("Session: no label to draw a {} with", kind.name().to_lowercase());
            return None;
        };
        let parent = self.sync.graphic_for(label)?;
        let id = self.sync.scene_mut().allocate_id();
        let seed = Geometry::seed(kind, at, radius, self.config.drawing.polygon_close_threshold);
        self.execute(Command::create(id, parent, seed));
        if !self.sync.scene().contains(id) {
            return None;
        }
        self.sync.select_graphics(&[id]);
        Some(id)
    }

    fn extend_shape(&mut self, graphic: GraphicId, at: Point) {
        self.execute(Command::extend(graphic, at));
    }

    fn move_vertex(&mut self, graphic: GraphicId, vertex: usize, to: Point) {
        self.execute(Command::move_vertex(graphic, vertex, to));
    }

    fn geometry(&self, graphic: GraphicId) -> Option<&Geometry> {
        self.sync.scene().get(graphic).and_then(|g| g.geometry())
    }

    fn begin_group(&mut self) {
        if let Some(log) = self.histories.active_mut() {
            log.begin_group();
        }
    }

    fn end_group(&mut self) {
        if let Some(log) = self.histories.active_mut() {
            log.end_group();
        }
    }

    fn unravel(&mut self, graphic: GraphicId) {
        let Some(log) = self.histories.active_mut() else {
            return;
        };
        let changes = log.unravel(graphic, self.sync.scene_mut());
        self.apply(changes);
    }

    fn select_at(&mut self, at: Point) -> Vec<GraphicId> {
        let hit: Vec<GraphicId> = self.sync.scene().hit_test(&at).into_iter().collect();
        self.sync.select_graphics(&hit);
        hit
    }

    fn select_in_rect(&mut self, rect: Rect) -> Vec<GraphicId> {
        let hits = self.sync.scene().items_in_rect(&rect);
        self.sync.select_graphics(&hits);
        hits
    }
}

// ============================================================================
// Session
// ============================================================================

/// Top-level state of one annotation project.
#[derive(Debug)]
pub struct AnnotationSession {
    editor: Editor,
    tools: ToolController,
    catalog: ImageCatalog,
    /// Images that have been active at least once
    visited: HashSet<PathBuf>,
    dimensions: HashMap<PathBuf, (u32, u32)>,
    project_path: Option<PathBuf>,
    /// Last state written to or read from the project file
    saved: Option<ProjectData>,
    registry: FormatRegistry,
}

impl AnnotationSession {
    pub fn new(config: AppConfig) -> Self {
        Self {
            tools: ToolController::new(config.drawing),
            editor: Editor::new(config),
            catalog: ImageCatalog::default(),
            visited: HashSet::new(),
            dimensions: HashMap::new(),
            project_path: None,
            saved: None,
            registry: FormatRegistry::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.editor.config
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.editor.sync
    }

    pub fn histories(&self) -> &UndoHistories {
        &self.editor.histories
    }

    pub fn catalog(&self) -> &ImageCatalog {
        &self.catalog
    }

    pub fn tools(&self) -> &ToolController {
        &self.tools
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    pub fn project_path(&self) -> Option<&Path> {
        self.project_path.as_deref()
    }

    pub fn active_image(&self) -> Option<&Path> {
        self.editor.sync.active_file()
    }

    /// Take pending observer notifications.
    pub fn drain_events(&mut self) -> Vec<SyncEvent> {
        self.editor.sync.drain_events()
    }

    // ========================================================================
    // Images
    // ========================================================================

    /// Replace the catalog. If the active image is not part of it, the first
    /// image becomes active.
    pub fn set_catalog(&mut self, catalog: ImageCatalog) -> Result<(), SessionError> {
        self.catalog = catalog;
        let active = self.active_image().map(Path::to_path_buf);
        match active {
            Some(active) if self.catalog.select(&active) => Ok(()),
            _ => match self.catalog.images().first().cloned() {
                Some(first) => self.switch_image(&first, UnsavedPolicy::Keep),
                None => Ok(()),
            },
        }
    }

    /// Catalog the supported images of `folder`. Returns how many were found.
    pub fn open_folder(&mut self, folder: &Path) -> Result<usize, SessionError> {
        let catalog = ImageCatalog::from_folder(folder, &self.editor.config)?;
        let count = catalog.len();
        self.set_catalog(catalog)?;
        Ok(count)
    }

    /// Make `path` the active image.
    ///
    /// A gesture in progress is abandoned. On the first visit the image
    /// receives the label vocabulary of the image being left. If the image
    /// being left has unsaved changes, `policy` decides what happens to them.
    pub fn switch_image(&mut self, path: &Path, policy: UnsavedPolicy) -> Result<(), SessionError> {
        if !self.catalog.contains(path) {
            return Err(SessionError::UnknownImage(path.to_path_buf()));
        }
        let outgoing = self.editor.active_file();
        if outgoing.as_deref() == Some(path) {
            return Ok(());
        }

        let dirty = outgoing.clone().filter(|f| self.editor.dirty.contains(f));
        if let Some(file) = &dirty {
            match policy {
                UnsavedPolicy::Ask => return Err(SessionError::UnsavedChanges(file.clone())),
                UnsavedPolicy::Save if self.project_path.is_none() => {
                    return Err(SessionError::NoProjectPath);
                }
                _ => {}
            }
        }

        self.tools.cancel(&mut self.editor);
        if let Some(file) = &dirty {
            match policy {
                UnsavedPolicy::Save => {
                    self.save()?;
                }
                UnsavedPolicy::Discard => self.discard_changes(file),
                UnsavedPolicy::Ask | UnsavedPolicy::Keep => {}
            }
        }

        self.activate(path, outgoing.as_deref());
        Ok(())
    }

    fn activate(&mut self, path: &Path, previous: Option<&Path>) {
        if self.visited.insert(path.to_path_buf()) {
            if let Some(previous) = previous {
                self.editor.sync.copy_labels(previous, path);
            }
        }
        self.editor.sync.filter_visible_for_file(path);
        self.editor.histories.activate(path);
        self.catalog.select(path);
        if !self.dimensions.contains_key(path) {
            match image::image_dimensions(path) {
                Ok(size) => {
                    self.dimensions.insert(path.to_path_buf(), size);
                }
                Err(e) => log::debug!("Session: no dimensions for {:?}: {}", path, e),
            }
        }
        log::info!(
            "Active image: {} ({})",
            self.catalog.current_name(),
            self.catalog.progress()
        );
    }

    /// Switch to the next image, wrapping around.
    pub fn next_image(&mut self, policy: UnsavedPolicy) -> Result<Option<PathBuf>, SessionError> {
        let Some(next) = self.catalog.next_image().map(Path::to_path_buf) else {
            return Ok(None);
        };
        self.switch_image(&next, policy)?;
        Ok(Some(next))
    }

    /// Switch to the previous image, wrapping around.
    pub fn previous_image(&mut self, policy: UnsavedPolicy) -> Result<Option<PathBuf>, SessionError> {
        let Some(previous) = self.catalog.previous_image().map(Path::to_path_buf) else {
            return Ok(None);
        };
        self.switch_image(&previous, policy)?;
        Ok(Some(previous))
    }

    // ========================================================================
    // Labels
    // ========================================================================

    /// Add a label to the active image, or return the existing one with the
    /// same name. The new label becomes current if none is.
    pub fn add_label(&mut self, name: &str) -> Result<NodeId, SessionError> {
        let file = self.editor.active_file().ok_or(SessionError::NoActiveImage)?;
        if let Some(existing) = self.editor.sync.tree().label_by_name(&file, name) {
            return Ok(existing);
        }
        let color = self.editor.label_color(name);
        let id = self.editor.sync.add_label(name, color, file.as_path());
        if self.editor.current_label.is_none() {
            self.editor.current_label = Some(name.to_string());
        }
        self.editor.mark_dirty(&file);
        log::info!("Added label '{}' to {:?}", name, file);
        Ok(id)
    }

    /// Draw subsequent shapes under the label `name`.
    pub fn select_label(&mut self, name: &str) -> Result<NodeId, SessionError> {
        let file = self.editor.active_file().ok_or(SessionError::NoActiveImage)?;
        let id = self
            .editor
            .sync
            .tree()
            .label_by_name(&file, name)
            .ok_or(SessionError::NoLabel)?;
        self.editor.current_label = Some(name.to_string());
        Ok(id)
    }

    /// Label new shapes go under on the active image.
    pub fn current_label(&self) -> Option<NodeId> {
        self.editor.current_label_node()
    }

    // ========================================================================
    // Tools
    // ========================================================================

    pub fn select_tool(&mut self, tool: Tool) -> ToolResponse {
        self.tools.select_tool(tool, &mut self.editor)
    }

    pub fn pointer(&mut self, event: PointerEvent) -> ToolResponse {
        self.tools.handle(event, &mut self.editor)
    }

    /// Abandon the gesture in progress.
    pub fn cancel_gesture(&mut self) -> ToolResponse {
        self.tools.cancel(&mut self.editor)
    }

    // ========================================================================
    // Undo / redo
    // ========================================================================

    /// Undo one step on the active image. Returns false if there was nothing
    /// to undo.
    pub fn undo(&mut self) -> bool {
        let undone = self.editor.undo();
        self.tools.reconcile(&self.editor);
        undone
    }

    pub fn redo(&mut self) -> bool {
        let redone = self.editor.redo();
        self.tools.reconcile(&self.editor);
        redone
    }

    pub fn can_undo(&self) -> bool {
        self.editor.histories.active().is_some_and(|l| l.can_undo())
    }

    pub fn can_redo(&self) -> bool {
        self.editor.histories.active().is_some_and(|l| l.can_redo())
    }

    // ========================================================================
    // Direct node edits
    // ========================================================================

    fn require_node(&self, node: NodeId) -> Result<(), SessionError> {
        if self.editor.sync.tree().contains(node) {
            Ok(())
        } else {
            Err(SessionError::UnknownNode(node))
        }
    }

    pub fn rename(&mut self, node: NodeId, name: &str) -> Result<bool, SessionError> {
        self.require_node(node)?;
        let renamed = self.editor.sync.rename_node(node, name);
        if renamed {
            self.editor.mark_node_dirty(node);
        }
        Ok(renamed)
    }

    /// Recolor a label, or set (`Some`) or clear (`None`) a shape's override.
    pub fn recolor(&mut self, node: NodeId, color: Option<Color>) -> Result<bool, SessionError> {
        self.require_node(node)?;
        let recolored = self.editor.sync.recolor_node(node, color);
        if recolored {
            self.editor.mark_node_dirty(node);
        }
        Ok(recolored)
    }

    /// Toggle visibility. Returns every node whose check state changed.
    pub fn set_visible(&mut self, node: NodeId, visible: bool) -> Result<Vec<NodeId>, SessionError> {
        self.require_node(node)?;
        let affected = self
            .editor
            .sync
            .set_node_check_state(node, CheckState::from_visible(visible));
        if !affected.is_empty() {
            self.editor.mark_node_dirty(node);
        }
        Ok(affected)
    }

    pub fn select_nodes(&mut self, nodes: &[NodeId]) {
        self.editor.sync.select_nodes(nodes);
    }

    /// Delete a node row and its children. The removed shapes disappear from
    /// the undo history as well.
    pub fn delete_node(&mut self, node: NodeId) -> Result<Removal, SessionError> {
        self.require_node(node)?;
        let doomed = self.editor.sync.tree().subtree(node);
        let drawing = self
            .tools
            .in_progress()
            .and_then(|g| self.editor.sync.node_for(g))
            .is_some_and(|n| doomed.contains(&n));
        if drawing {
            self.tools.cancel(&mut self.editor);
        }

        self.editor.mark_node_dirty(node);
        let removal = self.editor.remove_node(node);
        log::info!(
            "Deleted {} nodes ({} graphics)",
            removal.nodes.len(),
            removal.graphics.len()
        );
        Ok(removal)
    }

    /// Shapes flagged for correction: zero-area boxes and zero-length paths.
    pub fn degenerate_shapes(&self) -> Vec<NodeId> {
        self.editor.sync.degenerate_nodes()
    }

    // ========================================================================
    // Dirty state
    // ========================================================================

    pub fn has_unsaved_changes(&self) -> bool {
        !self.editor.dirty.is_empty()
    }

    pub fn is_dirty(&self, file: &Path) -> bool {
        self.editor.dirty.contains(file)
    }

    /// Drop `file`'s unsaved edits: its labels are rebuilt from the last
    /// saved project, and its undo history is discarded.
    fn discard_changes(&mut self, file: &Path) {
        let vocabulary: Vec<(String, Option<Color>)> = self
            .editor
            .sync
            .tree()
            .labels_for_file(file)
            .map(|n| (n.name.clone(), n.color))
            .collect();
        let labels: Vec<NodeId> = self
            .editor
            .sync
            .tree()
            .labels_for_file(file)
            .map(|n| n.id())
            .collect();
        for label in labels {
            self.editor.remove_node(label);
        }
        self.editor.histories.discard(file);

        match self.saved.as_ref().and_then(|s| s.image(file)).cloned() {
            Some(image) => {
                let mut data = ProjectData::new();
                data.images.push(image);
                self.populate(&data, false);
            }
            None => {
                for (name, color) in vocabulary {
                    let fallback = self.editor.label_color(&name);
                    self.editor
                        .sync
                        .add_label(name, color.unwrap_or(fallback), file);
                }
            }
        }
        self.editor.dirty.remove(file);
        log::info!("Discarded unsaved changes in {:?}", file);
    }

    // ========================================================================
    // Snapshot, persistence and conversion
    // ========================================================================

    fn dimensions_of(&self, file: &Path) -> Option<(u32, u32)> {
        self.dimensions
            .get(file)
            .copied()
            .or_else(|| image::image_dimensions(file).ok())
    }

    /// Plain snapshot of the whole hierarchy, as converters consume it.
    pub fn snapshot(&self) -> ProjectData {
        let tree = self.editor.sync.tree();
        let mut data = ProjectData::new();
        data.folder = self.catalog.folder.clone();
        data.metadata = self
            .saved
            .as_ref()
            .map(|s| s.metadata.clone())
            .unwrap_or_else(ProjectMetadata::new);
        data.metadata.touch();

        let mut files: Vec<PathBuf> = self.catalog.images().to_vec();
        for file in tree.files() {
            if !files.contains(&file) {
                files.push(file);
            }
        }

        for file in files {
            let mut image = ImageEntry::new(file.clone());
            image.dimensions = self.dimensions_of(&file);
            for label in tree.labels_for_file(&file) {
                let mut entry = LabelEntry::new(label.name.clone());
                entry.color = label.color;
                entry.check = label.check;
                for shape in label.children().iter().filter_map(|c| tree.get(*c)) {
                    let Some(geometry) = shape.geometry.clone() else {
                        continue;
                    };
                    let mut shape_entry = ShapeEntry::new(shape.name.clone(), geometry);
                    shape_entry.color = shape.color;
                    shape_entry.visible = shape.is_visible();
                    entry.shapes.push(shape_entry);
                }
                image.labels.push(entry);
            }
            data.images.push(image);
        }
        data
    }

    /// Build nodes for `data`. With `merge`, labels are matched by name per
    /// image and shapes are appended; otherwise every label is added anew.
    fn populate(&mut self, data: &ProjectData, merge: bool) {
        for image in &data.images {
            if let Some(size) = image.dimensions {
                self.dimensions.insert(image.path.clone(), size);
            }
            for label in &image.labels {
                let fallback = self.editor.label_color(&label.name);
                let existing = if merge {
                    self.editor.sync.tree().label_by_name(&image.path, &label.name)
                } else {
                    None
                };
                let label_id = match existing {
                    Some(id) => id,
                    None => self.editor.sync.add_label(
                        label.name.clone(),
                        label.color.unwrap_or(fallback),
                        image.path.clone(),
                    ),
                };

                for shape in &label.shapes {
                    let Some(node) =
                        self.editor
                            .sync
                            .add_shape(label_id, shape.name.clone(), shape.geometry.clone())
                    else {
                        continue;
                    };
                    if shape.color.is_some() {
                        self.editor.sync.recolor_node(node, shape.color);
                    }
                    if !shape.visible {
                        self.editor
                            .sync
                            .set_node_check_state(node, CheckState::Unchecked);
                    }
                }
                if label.shapes.is_empty() && label.check == CheckState::Unchecked {
                    self.editor
                        .sync
                        .set_node_check_state(label_id, CheckState::Unchecked);
                }
            }
        }
        self.editor.sync.materialize_all();
    }

    /// Drop all annotations, history and images.
    fn reset(&mut self) {
        self.tools.cancel(&mut self.editor);
        self.editor.sync.clear();
        self.editor.histories.clear();
        self.editor.dirty.clear();
        self.editor.current_label = None;
        self.editor.label_names.clear();
        self.editor.autosave.reset();
        self.catalog = ImageCatalog::default();
        self.visited.clear();
        self.dimensions.clear();
        self.project_path = None;
        self.saved = None;
    }

    /// Write the project file. Undo history is not persisted.
    pub fn save_project(&mut self, path: &Path) -> Result<ExportResult, SessionError> {
        let data = self.snapshot();
        let result = ProjectJsonFormat
            .export(&data, path, &ExportOptions::default())
            .map_err(SessionError::format(path))?;
        self.project_path = Some(path.to_path_buf());
        self.saved = Some(data);
        self.editor.mark_all_saved();
        Ok(result)
    }

    /// Save to the current project file.
    pub fn save(&mut self) -> Result<ExportResult, SessionError> {
        let path = self.project_path.clone().ok_or(SessionError::NoProjectPath)?;
        self.save_project(&path)
    }

    /// Replace the session with the project at `path`.
    ///
    /// Images that no longer exist keep their nodes (and are saved again),
    /// but are left out of the catalog and reported as warnings.
    pub fn load_project(&mut self, path: &Path) -> Result<Vec<FormatWarning>, SessionError> {
        let result = ProjectJsonFormat
            .import(path, &ImportOptions::default())
            .map_err(SessionError::format(path))?;
        let mut warnings = result.warnings;
        let mut data = result.data;

        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        if data.folder.is_relative() {
            data.folder = base.join(&data.folder);
        }
        let mut images = Vec::new();
        for image in &mut data.images {
            if image.path.is_relative() {
                image.path = data.folder.join(&image.path);
            }
            if image.path.is_file() {
                images.push(image.path.clone());
            } else {
                log::warn!("Project image {:?} is missing, its annotations are kept", image.path);
                warnings.push(
                    FormatWarning::warning(format!(
                        "{}, annotations kept",
                        FormatError::image_not_found(&image.path)
                    ))
                    .with_image(image.path.clone()),
                );
            }
        }

        self.reset();
        self.populate(&data, false);
        self.catalog = ImageCatalog::new(data.folder.clone(), images);
        self.project_path = Some(path.to_path_buf());
        log::info!(
            "Loaded project {:?}: {} images, {} labels, {} shapes",
            path,
            data.images.len(),
            data.total_labels(),
            data.total_shapes()
        );
        self.saved = Some(data);

        if let Some(first) = self.catalog.images().first().cloned() {
            self.switch_image(&first, UnsavedPolicy::Keep)?;
        }
        Ok(warnings)
    }

    /// Import annotations with the converter `format_id`.
    ///
    /// The native project format replaces the session; every other format
    /// is merged into it by label name, and the touched images become dirty.
    pub fn import(&mut self, format_id: &str, path: &Path) -> Result<Vec<FormatWarning>, SessionError> {
        if format_id == FormatRegistry::NATIVE_ID {
            return self.load_project(path);
        }
        let mut options = ImportOptions::new();
        if !self.catalog.folder.as_os_str().is_empty() {
            options = options.image_base_path(self.catalog.folder.clone());
        }
        let result = self
            .registry
            .get(format_id)
            .ok_or_else(|| SessionError::UnknownFormat(format_id.to_string()))?
            .import(path, &options)
            .map_err(SessionError::format(path))?;

        self.tools.cancel(&mut self.editor);
        for image in &result.data.images {
            if image.path.is_file() && self.editor.config.is_supported_image(&image.path) {
                self.catalog.insert(image.path.clone());
            }
            if image.shape_count() > 0 {
                self.editor.mark_dirty(&image.path);
            }
        }
        self.populate(&result.data, true);
        log::info!(
            "Imported {} shapes from {:?} ({})",
            result.data.total_shapes(),
            path,
            format_id
        );

        if self.active_image().is_none() {
            if let Some(first) = self.catalog.images().first().cloned() {
                self.switch_image(&first, UnsavedPolicy::Keep)?;
            }
        }
        Ok(result.warnings)
    }

    /// Export the current state with the converter `format_id`.
    pub fn export(&self, format_id: &str, out: &Path) -> Result<ExportResult, SessionError> {
        let format = self
            .registry
            .get(format_id)
            .ok_or_else(|| SessionError::UnknownFormat(format_id.to_string()))?;
        let mut options = ExportOptions::new();
        if !self.catalog.folder.as_os_str().is_empty() {
            options = options.image_base_path(self.catalog.folder.clone());
        }

        let result = format
            .export(&self.snapshot(), out, &options)
            .map_err(SessionError::format(out))?;
        for warning in &result.warnings {
            log::warn!("{}: {:?} {}", format.id(), warning.image_path, warning.message);
        }
        log::info!(
            "Exported {} annotations from {} images as {} to {:?}",
            result.annotations_exported,
            result.images_exported,
            format.display_name(),
            out
        );
        Ok(result)
    }

    /// Close the project.
    pub fn close(&mut self, policy: UnsavedPolicy) -> Result<(), SessionError> {
        if self.has_unsaved_changes() {
            match policy {
                UnsavedPolicy::Ask => {
                    let mut dirty: Vec<&PathBuf> = self.editor.dirty.iter().collect();
                    dirty.sort();
                    let first = dirty.first().map(|p| p.to_path_buf()).unwrap_or_default();
                    return Err(SessionError::UnsavedChanges(first));
                }
                UnsavedPolicy::Save => {
                    self.save()?;
                }
                UnsavedPolicy::Keep | UnsavedPolicy::Discard => {}
            }
        }
        self.reset();
        log::info!("Project closed");
        Ok(())
    }

    /// Save if the auto-save timers say so. Returns whether a save happened.
    pub fn poll_autosave(&mut self) -> Result<bool, SessionError> {
        if self.project_path.is_none() || !self.editor.autosave.should_save() {
            return Ok(false);
        }
        match self.save() {
            Ok(_) => {
                log::debug!("Auto-saved project");
                Ok(true)
            }
            Err(e) => {
                self.editor.autosave.mark_save_failed();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;
    use tempfile::TempDir;

    use crate::model::ShapeGeometry;

    fn folder_with(names: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in names {
            GrayImage::new(100, 100).save(dir.path().join(name)).unwrap();
        }
        dir
    }

    fn session_for(dir: &TempDir) -> AnnotationSession {
        let mut session = AnnotationSession::new(AppConfig::default());
        session.open_folder(dir.path()).unwrap();
        session
    }

    fn drag(session: &mut AnnotationSession, from: (f32, f32), to: (f32, f32)) -> ToolResponse {
        session.pointer(PointerEvent::Press(Point::new(from.0, from.1)));
        session.pointer(PointerEvent::Move(Point::new(
            (from.0 + to.0) / 2.0,
            (from.1 + to.1) / 2.0,
        )));
        session.pointer(PointerEvent::Release(Point::new(to.0, to.1)))
    }

    fn click(session: &mut AnnotationSession, x: f32, y: f32) -> ToolResponse {
        let response = session.pointer(PointerEvent::Press(Point::new(x, y)));
        session.pointer(PointerEvent::Release(Point::new(x, y)));
        response
    }

    fn shape_count(session: &AnnotationSession, file: &Path) -> usize {
        session
            .synchronizer()
            .tree()
            .labels_for_file(file)
            .map(|l| l.children().len())
            .sum()
    }

    #[test]
    fn test_open_folder_activates_first_image() {
        let dir = folder_with(&["b.png", "a.png"]);
        let session = session_for(&dir);

        assert_eq!(session.catalog().len(), 2);
        assert_eq!(session.active_image(), Some(dir.path().join("a.png").as_path()));
        assert_eq!(session.catalog().progress(), "1/2");
    }

    #[test]
    fn test_box_drag_exports_yolo_line() {
        let dir = folder_with(&["a.png"]);
        let mut session = session_for(&dir);
        session.add_label("car").unwrap();
        session.select_tool(Tool::Box);

        let response = drag(&mut session, (10.0, 10.0), (50.0, 80.0));
        assert!(matches!(response, ToolResponse::ShapeFinished(_)));

        let out = TempDir::new().unwrap();
        let result = session.export("yolo", out.path()).unwrap();
        assert_eq!(result.annotations_exported, 1);
        let text = std::fs::read_to_string(out.path().join("a.txt")).unwrap();
        assert_eq!(text.trim(), "0 0.300000 0.450000 0.400000 0.700000");
    }

    #[test]
    fn test_drawing_without_label_does_nothing() {
        let dir = folder_with(&["a.png"]);
        let mut session = session_for(&dir);
        session.select_tool(Tool::Polygon);

        assert_eq!(click(&mut session, 5.0, 5.0), ToolResponse::None);
        assert!(session.synchronizer().tree().is_empty());
        assert!(!session.has_unsaved_changes());
    }

    #[test]
    fn test_switching_images_isolates_history() {
        let dir = folder_with(&["a.png", "b.png"]);
        let (a, b) = (dir.path().join("a.png"), dir.path().join("b.png"));
        let mut session = session_for(&dir);
        session.add_label("car").unwrap();
        session.select_tool(Tool::Box);
        drag(&mut session, (10.0, 10.0), (50.0, 80.0));
        let before = session.snapshot().images[0].clone();

        assert!(matches!(
            session.switch_image(&b, UnsavedPolicy::Ask),
            Err(SessionError::UnsavedChanges(ref f)) if *f == a
        ));
        assert_eq!(session.active_image(), Some(a.as_path()));

        session.switch_image(&b, UnsavedPolicy::Keep).unwrap();
        assert!(session.synchronizer().tree().label_by_name(&b, "car").is_some());
        assert_eq!(shape_count(&session, &b), 0);
        assert!(!session.undo());
        assert_eq!(shape_count(&session, &a), 1);

        session.switch_image(&a, UnsavedPolicy::Keep).unwrap();
        assert_eq!(session.snapshot().images[0], before);
        // Create, Move and the closing Extend undo one at a time
        let mut steps = 0;
        while session.undo() {
            steps += 1;
        }
        assert_eq!(steps, 3);
        assert_eq!(shape_count(&session, &a), 0);
        assert!(session.synchronizer().is_consistent());
    }

    #[test]
    fn test_same_label_gets_same_color_everywhere() {
        let dir = folder_with(&["a.png", "b.png"]);
        let mut session = session_for(&dir);
        let car_a = session.add_label("car").unwrap();
        session.add_label("person").unwrap();
        session
            .switch_image(&dir.path().join("b.png"), UnsavedPolicy::Keep)
            .unwrap();
        let car_b = session.add_label("car").unwrap();

        let tree = session.synchronizer().tree();
        assert_ne!(car_a, car_b);
        assert_eq!(tree.get(car_a).unwrap().color, tree.get(car_b).unwrap().color);
    }

    #[test]
    fn test_undo_of_polygon_start_resets_gesture() {
        let dir = folder_with(&["a.png"]);
        let mut session = session_for(&dir);
        session.add_label("car").unwrap();
        session.select_tool(Tool::Polygon);

        click(&mut session, 0.0, 0.0);
        assert!(session.tools().in_progress().is_some());
        assert!(session.undo());
        assert_eq!(session.tools().in_progress(), None);

        assert!(matches!(click(&mut session, 10.0, 10.0), ToolResponse::ShapeStarted(_)));
        assert!(!session.can_redo());
    }

    #[test]
    fn test_cancel_gesture_discards_open_polygon() {
        let dir = folder_with(&["a.png"]);
        let a = dir.path().join("a.png");
        let mut session = session_for(&dir);
        session.add_label("car").unwrap();
        session.select_tool(Tool::Polygon);
        click(&mut session, 0.0, 0.0);
        click(&mut session, 40.0, 0.0);

        assert!(matches!(session.cancel_gesture(), ToolResponse::ShapeDiscarded(_)));
        assert_eq!(session.tools().in_progress(), None);
        assert_eq!(shape_count(&session, &a), 0);
        assert!(!session.can_undo());
        assert_eq!(session.cancel_gesture(), ToolResponse::None);
    }

    #[test]
    fn test_delete_label_removes_shapes_and_history() {
        let dir = folder_with(&["a.png"]);
        let mut session = session_for(&dir);
        let label = session.add_label("car").unwrap();
        session.select_tool(Tool::Box);
        for offset in [0.0, 20.0, 40.0] {
            drag(&mut session, (offset, offset), (offset + 10.0, offset + 10.0));
        }
        assert_eq!(session.synchronizer().identity().len(), 4);

        let removal = session.delete_node(label).unwrap();
        assert_eq!(removal.nodes.len(), 4);
        assert!(session.synchronizer().identity().is_empty());
        assert!(session.synchronizer().scene().is_empty());
        assert!(!session.can_undo());
        assert!(matches!(
            session.delete_node(label),
            Err(SessionError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_delete_label_drops_undone_shapes() {
        let dir = folder_with(&["a.png"]);
        let mut session = session_for(&dir);
        let label = session.add_label("car").unwrap();
        session.select_tool(Tool::Box);
        drag(&mut session, (10.0, 10.0), (50.0, 80.0));
        while session.undo() {}
        assert!(session.can_redo());

        session.delete_node(label).unwrap();
        assert!(!session.can_redo());
        assert!(!session.redo());
    }

    #[test]
    fn test_stroke_longer_than_history_undoes_whole() {
        let dir = folder_with(&["a.png"]);
        let a = dir.path().join("a.png");
        let mut config = AppConfig::default();
        config.history.max_history = 5;
        let mut session = AnnotationSession::new(config);
        session.open_folder(dir.path()).unwrap();
        session.add_label("car").unwrap();
        session.select_tool(Tool::Path);

        session.pointer(PointerEvent::Press(Point::new(10.0, 10.0)));
        for i in 1..10 {
            session.pointer(PointerEvent::Move(Point::new(10.0 + i as f32 * 5.0, 10.0)));
        }
        session.pointer(PointerEvent::Release(Point::new(60.0, 10.0)));
        assert_eq!(shape_count(&session, &a), 1);

        assert!(session.undo());
        assert_eq!(shape_count(&session, &a), 0);
        assert!(!session.can_undo());
        assert!(!session.synchronizer().scene().iter().any(|g| g.geometry().is_some()));
    }

    #[test]
    fn test_redo_restores_renamed_shape() {
        let dir = folder_with(&["a.png"]);
        let mut session = session_for(&dir);
        let label = session.add_label("car").unwrap();
        session.select_tool(Tool::Box);
        drag(&mut session, (10.0, 10.0), (50.0, 80.0));
        while session.undo() {}
        session.redo();
        let shape = session.synchronizer().tree().get(label).unwrap().children()[0];
        session.rename(shape, "parked car").unwrap();

        session.undo();
        session.redo();
        let tree = session.synchronizer().tree();
        let shape = tree.get(label).unwrap().children()[0];
        assert_eq!(tree.get(shape).unwrap().name, "parked car");
    }

    #[test]
    fn test_direct_edits_reach_graphics() {
        let dir = folder_with(&["a.png"]);
        let mut session = session_for(&dir);
        let label = session.add_label("car").unwrap();
        session.select_tool(Tool::Box);
        let ToolResponse::ShapeFinished(graphic) = drag(&mut session, (10.0, 10.0), (50.0, 80.0)) else {
            panic!("expected a finished box");
        };
        session.save_project(&dir.path().join("p.json")).unwrap();

        assert!(session.rename(label, "vehicle").unwrap());
        let red = Color::rgb(255, 0, 0);
        assert!(session.recolor(label, Some(red)).unwrap());
        let affected = session.set_visible(label, false).unwrap();
        assert_eq!(affected.len(), 2);

        let scene = session.synchronizer().scene();
        let g = scene.get(graphic).unwrap();
        assert_eq!(g.color, red);
        assert!(!g.visible);
        let label_graphic = session.synchronizer().graphic_for(label).unwrap();
        assert_eq!(scene.get(label_graphic).unwrap().name, "vehicle");
        assert!(session.has_unsaved_changes());
    }

    #[test]
    fn test_zero_area_box_is_flagged_and_skipped() {
        let dir = folder_with(&["a.png"]);
        let mut session = session_for(&dir);
        session.add_label("car").unwrap();
        session.select_tool(Tool::Box);
        click(&mut session, 30.0, 30.0);

        assert_eq!(session.degenerate_shapes().len(), 1);
        let out = TempDir::new().unwrap();
        let result = session.export("voc", out.path()).unwrap();
        assert_eq!(result.annotations_exported, 0);
        assert!(result.has_warnings());
    }

    #[test]
    fn test_save_and_load_rebuilds_hierarchy() {
        let dir = folder_with(&["a.png", "b.png"]);
        let mut session = session_for(&dir);
        session.add_label("car").unwrap();
        session.select_tool(Tool::Polygon);
        for (x, y) in [(0.0, 0.0), (60.0, 0.0), (60.0, 60.0), (2.0, 3.0)] {
            click(&mut session, x, y);
        }
        session.add_label("person").unwrap();
        session.select_label("person").unwrap();
        session.select_tool(Tool::Path);
        drag(&mut session, (20.0, 20.0), (40.0, 25.0));
        session
            .switch_image(&dir.path().join("b.png"), UnsavedPolicy::Keep)
            .unwrap();

        let project = dir.path().join("session.annoscene.json");
        session.save_project(&project).unwrap();
        assert!(!session.has_unsaved_changes());

        let mut reloaded = AnnotationSession::new(AppConfig::default());
        let warnings = reloaded.load_project(&project).unwrap();
        assert!(warnings.is_empty());
        assert!(reloaded.synchronizer().is_consistent());
        assert_eq!(reloaded.snapshot().images, session.snapshot().images);
        assert_eq!(reloaded.active_image(), Some(dir.path().join("a.png").as_path()));
        assert!(!reloaded.can_undo());

        let polygon = reloaded
            .synchronizer()
            .scene()
            .iter()
            .find_map(|g| match g.geometry() {
                Some(Geometry::Polygon(p)) => Some(p.clone()),
                _ => None,
            })
            .unwrap();
        assert!(polygon.is_closed());
        assert_eq!(polygon.vertices.len(), 3);
    }

    #[test]
    fn test_missing_image_keeps_annotations() {
        let dir = folder_with(&["a.png"]);
        let mut session = session_for(&dir);
        session.add_label("car").unwrap();
        session.select_tool(Tool::Box);
        drag(&mut session, (10.0, 10.0), (50.0, 80.0));
        let project = dir.path().join("p.json");
        session.save_project(&project).unwrap();
        std::fs::remove_file(dir.path().join("a.png")).unwrap();

        let mut reloaded = AnnotationSession::new(AppConfig::default());
        let warnings = reloaded.load_project(&project).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(reloaded.catalog().is_empty());
        assert_eq!(reloaded.active_image(), None);
        assert_eq!(reloaded.synchronizer().tree().len(), 2);
        assert!(reloaded.synchronizer().scene().items().is_empty());
        assert_eq!(reloaded.snapshot().total_shapes(), 1);
    }

    #[test]
    fn test_discard_restores_saved_state() {
        let dir = folder_with(&["a.png", "b.png"]);
        let a = dir.path().join("a.png");
        let mut session = session_for(&dir);
        session.add_label("car").unwrap();
        session.select_tool(Tool::Box);
        drag(&mut session, (10.0, 10.0), (50.0, 80.0));
        session.save_project(&dir.path().join("p.json")).unwrap();

        drag(&mut session, (60.0, 60.0), (90.0, 90.0));
        assert_eq!(shape_count(&session, &a), 2);
        session
            .switch_image(&dir.path().join("b.png"), UnsavedPolicy::Discard)
            .unwrap();

        assert_eq!(shape_count(&session, &a), 1);
        assert!(!session.is_dirty(&a));
        assert!(session.synchronizer().is_consistent());
        session.switch_image(&a, UnsavedPolicy::Ask).unwrap();
        assert!(!session.can_undo());
    }

    #[test]
    fn test_save_policy_requires_project_path() {
        let dir = folder_with(&["a.png", "b.png"]);
        let mut session = session_for(&dir);
        session.add_label("car").unwrap();

        assert!(matches!(
            session.switch_image(&dir.path().join("b.png"), UnsavedPolicy::Save),
            Err(SessionError::NoProjectPath)
        ));
        assert!(matches!(
            session.switch_image(&dir.path().join("c.png"), UnsavedPolicy::Keep),
            Err(SessionError::UnknownImage(_))
        ));
    }

    #[test]
    fn test_voc_import_merges_by_label() {
        let dir = folder_with(&["a.png"]);
        let mut session = session_for(&dir);
        session.add_label("car").unwrap();
        session.select_tool(Tool::Box);
        drag(&mut session, (10.0, 10.0), (50.0, 80.0));
        let out = TempDir::new().unwrap();
        session.export("voc", out.path()).unwrap();

        let warnings = session.import("voc", out.path()).unwrap();
        assert!(warnings.is_empty());
        let a = dir.path().join("a.png");
        let labels: Vec<_> = session.synchronizer().tree().labels_for_file(&a).collect();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].children().len(), 2);
        assert!(session.synchronizer().is_consistent());
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let dir = folder_with(&["a.png"]);
        let session = session_for(&dir);
        assert!(matches!(
            session.export("coco", dir.path()),
            Err(SessionError::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_close_asks_before_dropping_edits() {
        let dir = folder_with(&["a.png"]);
        let mut session = session_for(&dir);
        session.add_label("car").unwrap();

        assert!(matches!(
            session.close(UnsavedPolicy::Ask),
            Err(SessionError::UnsavedChanges(_))
        ));
        session.close(UnsavedPolicy::Discard).unwrap();
        assert!(session.synchronizer().tree().is_empty());
        assert!(session.catalog().is_empty());
    }

    #[test]
    fn test_autosave_writes_project() {
        let dir = folder_with(&["a.png"]);
        let mut config = AppConfig::default();
        config.preferences.autosave_debounce_secs = 0;
        config.preferences.autosave_interval_secs = 0;
        let mut session = AnnotationSession::new(config);
        session.open_folder(dir.path()).unwrap();
        assert!(!session.poll_autosave().unwrap());

        let project = dir.path().join("p.json");
        session.save_project(&project).unwrap();
        session.add_label("car").unwrap();
        assert!(session.poll_autosave().unwrap());
        assert!(!session.has_unsaved_changes());
        let text = std::fs::read_to_string(&project).unwrap();
        assert!(text.contains("\"car\""));
    }
}
