//! Undo/Redo system for shape-editing gestures.
//!
//! This module implements the Command pattern over the scene graph. Each
//! command is tagged with the graphic it edits, which is what lets the log
//! group a drag into one step and unravel an abandoned shape in one go.
//! Every image file owns its own [`CommandLog`]; [`UndoHistories`] swaps
//! between them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::constants::DEFAULT_MAX_HISTORY;
use crate::model::{Geometry, Point, PointEffect, ShapeGeometry, display_name};
use crate::scene::{GraphicBody, GraphicId, Scene};
use crate::sync::{Field, SceneChange};

// ============================================================================
// Command Types
// ============================================================================

/// A reversible edit of one shape graphic.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Insert a new shape graphic under a label group
    Create {
        graphic: GraphicId,
        /// Label group the shape is attached to
        parent: GraphicId,
        /// Geometry at creation time (a single seed point)
        seed: Geometry,
        /// Display name captured on revert, so a redo keeps renames
        name: Option<String>,
    },
    /// Append one point/segment
    Extend {
        graphic: GraphicId,
        point: Point,
        /// What the last apply did, needed for an exact revert
        effect: Option<PointEffect>,
    },
    /// Overwrite one vertex or corner
    Move {
        graphic: GraphicId,
        vertex: usize,
        /// Prior value, captured on apply
        from: Option<Point>,
        to: Point,
    },
}

impl Command {
    pub fn create(graphic: GraphicId, parent: GraphicId, seed: Geometry) -> Self {
        Command::Create {
            graphic,
            parent,
            seed,
            name: None,
        }
    }

    pub fn extend(graphic: GraphicId, point: Point) -> Self {
        Command::Extend {
            graphic,
            point,
            effect: None,
        }
    }

    pub fn move_vertex(graphic: GraphicId, vertex: usize, to: Point) -> Self {
        Command::Move {
            graphic,
            vertex,
            from: None,
            to,
        }
    }

    /// The shape this command belongs to.
    pub fn graphic(&self) -> GraphicId {
        match self {
            Command::Create { graphic, .. }
            | Command::Extend { graphic, .. }
            | Command::Move { graphic, .. } => *graphic,
        }
    }

    /// Get a human-readable description of this command
    pub fn description(&self) -> String {
        match self {
            Command::Create { seed, .. } => format!("Create {}", seed.kind().name().to_lowercase()),
            Command::Extend { .. } => "Add point".to_string(),
            Command::Move { vertex, .. } => format!("Move point {}", vertex),
        }
    }

    /// Apply the command to the scene.
    pub fn apply(&mut self, scene: &mut Scene) -> Vec<SceneChange> {
        match self {
            Command::Create {
                graphic,
                parent,
                seed,
                name,
            } => {
                let Some(color) = scene.get(*parent).map(|p| p.color) else {
                    log::warn!("Undo: parent {} of {} is gone, create skipped", parent, graphic);
                    return Vec::new();
                };
                let g = scene.insert(*graphic, GraphicBody::Shape(seed.clone()), Some(*parent));
                g.name = name
                    .clone()
                    .unwrap_or_else(|| display_name(seed.kind(), seed.origin()));
                g.color = color;
                g.selected = true;
                vec![SceneChange::Created(*graphic)]
            }
            Command::Extend {
                graphic,
                point,
                effect,
            } => match scene.get_mut(*graphic).and_then(|g| g.geometry_mut()) {
                Some(geometry) => {
                    let applied = geometry.apply_point(*point);
                    *effect = Some(applied);
                    if applied == PointEffect::Ignored {
                        Vec::new()
                    } else {
                        vec![SceneChange::Changed(*graphic, Field::Geometry)]
                    }
                }
                None => {
                    log::debug!("Undo: extend of missing {} ignored", graphic);
                    Vec::new()
                }
            },
            Command::Move {
                graphic,
                vertex,
                from,
                to,
            } => match scene.get_mut(*graphic).and_then(|g| g.geometry_mut()) {
                Some(geometry) => {
                    *from = geometry.move_vertex(*vertex, *to);
                    if from.is_some() {
                        vec![SceneChange::Changed(*graphic, Field::Geometry)]
                    } else {
                        Vec::new()
                    }
                }
                None => {
                    log::debug!("Undo: move on missing {} ignored", graphic);
                    Vec::new()
                }
            },
        }
    }

    /// Reverse a previous [`apply`](Self::apply).
    pub fn revert(&mut self, scene: &mut Scene) -> Vec<SceneChange> {
        match self {
            Command::Create { graphic, name, .. } => {
                if let Some(g) = scene.get(*graphic) {
                    *name = Some(g.name.clone());
                }
                if scene.destroy(*graphic).is_empty() {
                    Vec::new()
                } else {
                    vec![SceneChange::Removed(*graphic)]
                }
            }
            Command::Extend {
                graphic, effect, ..
            } => {
                let Some(applied) = effect.take() else {
                    return Vec::new();
                };
                match scene.get_mut(*graphic).and_then(|g| g.geometry_mut()) {
                    Some(geometry) if applied != PointEffect::Ignored => {
                        geometry.revert_point(&applied);
                        vec![SceneChange::Changed(*graphic, Field::Geometry)]
                    }
                    _ => Vec::new(),
                }
            }
            Command::Move {
                graphic,
                vertex,
                from,
                ..
            } => {
                let Some(prior) = from.take() else {
                    return Vec::new();
                };
                match scene.get_mut(*graphic).and_then(|g| g.geometry_mut()) {
                    Some(geometry) => {
                        geometry.move_vertex(*vertex, prior);
                        vec![SceneChange::Changed(*graphic, Field::Geometry)]
                    }
                    None => Vec::new(),
                }
            }
        }
    }
}

// ============================================================================
// Command Log
// ============================================================================

/// Configuration for the command logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoConfig {
    /// Maximum number of commands to keep per image
    pub max_history: usize,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    command: Command,
    /// Macro id; consecutive entries sharing one undo as a unit
    group: Option<u64>,
}

/// Linear, replayable history of one image's shape edits.
///
/// Entries before `cursor` are applied, entries after it are undone and can
/// be redone. Executing a new command discards the redo tail.
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    entries: Vec<Entry>,
    cursor: usize,
    open_group: Option<u64>,
    next_group: u64,
    config: UndoConfig,
}

impl CommandLog {
    /// Create a new empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom configuration
    pub fn with_config(config: UndoConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Apply `command` and record it. Clears the redo tail.
    pub fn execute(&mut self, mut command: Command, scene: &mut Scene) -> Vec<SceneChange> {
        if self.cursor < self.entries.len() {
            log::debug!("Undo: dropped {} redo entries", self.entries.len() - self.cursor);
            self.entries.truncate(self.cursor);
        }
        let changes = command.apply(scene);
        log::debug!("📝 Undo: pushed '{}' ({})", command.description(), command.graphic());
        self.entries.push(Entry {
            command,
            group: self.open_group,
        });
        self.cursor = self.entries.len();
        self.trim_history();
        changes
    }

    /// Start a macro: everything executed until [`end_group`](Self::end_group)
    /// undoes and redoes as one step.
    pub fn begin_group(&mut self) {
        self.next_group += 1;
        self.open_group = Some(self.next_group);
    }

    pub fn end_group(&mut self) {
        self.open_group = None;
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    /// Undo the last step (a whole macro when grouped).
    pub fn undo(&mut self, scene: &mut Scene) -> Vec<SceneChange> {
        let mut changes = Vec::new();
        let Some(last) = self.cursor.checked_sub(1) else {
            return changes;
        };
        let group = self.entries[last].group;
        loop {
            let entry = &mut self.entries[self.cursor - 1];
            log::debug!("⏪ Undo: '{}'", entry.command.description());
            changes.extend(entry.command.revert(scene));
            self.cursor -= 1;
            let same_group = group.is_some()
                && self
                    .cursor
                    .checked_sub(1)
                    .is_some_and(|i| self.entries[i].group == group);
            if !same_group {
                break;
            }
        }
        changes
    }

    /// Redo the next step (a whole macro when grouped).
    pub fn redo(&mut self, scene: &mut Scene) -> Vec<SceneChange> {
        let mut changes = Vec::new();
        let Some(group) = self.entries.get(self.cursor).map(|e| e.group) else {
            return changes;
        };
        while let Some(entry) = self.entries.get_mut(self.cursor) {
            log::debug!("⏩ Redo: '{}'", entry.command.description());
            changes.extend(entry.command.apply(scene));
            self.cursor += 1;
            let same_group =
                group.is_some() && self.entries.get(self.cursor).is_some_and(|e| e.group == group);
            if !same_group {
                break;
            }
        }
        changes
    }

    /// Retroactively remove every command belonging to `graphic`, as if the
    /// shape had never been drawn. The redo tail is discarded and the cursor
    /// moves to the end.
    pub fn unravel(&mut self, graphic: GraphicId, scene: &mut Scene) -> Vec<SceneChange> {
        self.entries.truncate(self.cursor);
        let mut changes = Vec::new();
        for entry in self.entries.iter_mut().rev() {
            if entry.command.graphic() == graphic {
                changes.extend(entry.command.revert(scene));
            }
        }
        let before = self.entries.len();
        self.entries.retain(|e| e.command.graphic() != graphic);
        self.cursor = self.entries.len();
        log::debug!("🧹 Undo: unraveled {} ({} entries)", graphic, before - self.entries.len());
        changes
    }

    /// Drop every command referencing `graphic` without touching the scene.
    /// Used once the shape has been deleted by other means.
    pub fn forget(&mut self, graphic: GraphicId) -> usize {
        let applied_removed = self.entries[..self.cursor]
            .iter()
            .filter(|e| e.command.graphic() == graphic)
            .count();
        let before = self.entries.len();
        self.entries.retain(|e| e.command.graphic() != graphic);
        self.cursor -= applied_removed;
        before - self.entries.len()
    }

    /// Drop the commands of every shape created under the label graphic
    /// `parent`, undone ones included. Returns how many entries went.
    pub fn forget_under(&mut self, parent: GraphicId) -> usize {
        let orphans: Vec<GraphicId> = self
            .entries
            .iter()
            .filter_map(|e| match &e.command {
                Command::Create {
                    graphic,
                    parent: p,
                    ..
                } if *p == parent => Some(*graphic),
                _ => None,
            })
            .collect();
        orphans.into_iter().map(|g| self.forget(g)).sum()
    }

    /// Re-apply every applied command in order. The scene must not already
    /// contain the shapes the log creates.
    pub fn replay(&mut self, scene: &mut Scene) -> Vec<SceneChange> {
        let mut changes = Vec::new();
        for entry in &mut self.entries[..self.cursor] {
            changes.extend(entry.command.apply(scene));
        }
        changes
    }

    /// Whether any entry edits `graphic`.
    pub fn references(&self, graphic: GraphicId) -> bool {
        self.entries.iter().any(|e| e.command.graphic() == graphic)
    }

    /// Get the number of applied commands
    pub fn undo_count(&self) -> usize {
        self.cursor
    }

    /// Get the number of undone commands
    pub fn redo_count(&self) -> usize {
        self.entries.len() - self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all history
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
        self.open_group = None;
        log::debug!("🗑️ Undo history cleared");
    }

    /// Drop whole shapes, oldest first, until the log fits `max_history`.
    /// The shape being edited is never split, so a single long stroke may
    /// leave the log over the cap.
    fn trim_history(&mut self) {
        let current = self.entries.last().map(|e| e.command.graphic());
        while self.entries.len() > self.config.max_history && self.cursor > 0 {
            let oldest = self.entries[0].command.graphic();
            if Some(oldest) == current {
                break;
            }
            let removed = self.forget(oldest);
            log::debug!("Undo: history full, dropped {} entries of {}", removed, oldest);
        }
    }
}

// ============================================================================
// Per-image histories
// ============================================================================

/// One [`CommandLog`] per image file, with one of them active.
#[derive(Debug, Default)]
pub struct UndoHistories {
    logs: HashMap<PathBuf, CommandLog>,
    active: Option<PathBuf>,
    config: UndoConfig,
}

impl UndoHistories {
    pub fn new(config: UndoConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Make `file`'s log the active one, creating it on first use. Other
    /// logs are left untouched.
    pub fn activate(&mut self, file: &Path) {
        let config = self.config;
        self.logs
            .entry(file.to_path_buf())
            .or_insert_with(|| CommandLog::with_config(config));
        self.active = Some(file.to_path_buf());
    }

    pub fn active_file(&self) -> Option<&Path> {
        self.active.as_deref()
    }

    pub fn active(&self) -> Option<&CommandLog> {
        self.active.as_ref().and_then(|f| self.logs.get(f))
    }

    pub fn active_mut(&mut self) -> Option<&mut CommandLog> {
        self.active.as_ref().and_then(|f| self.logs.get_mut(f))
    }

    pub fn get(&self, file: &Path) -> Option<&CommandLog> {
        self.logs.get(file)
    }

    /// Drop `file`'s log entirely. It is recreated empty on next activation.
    pub fn discard(&mut self, file: &Path) -> Option<CommandLog> {
        if self.active.as_deref() == Some(file) {
            self.active = None;
        }
        self.logs.remove(file)
    }

    /// Forget `graphic` in whichever log references it.
    pub fn forget(&mut self, graphic: GraphicId) {
        for log in self.logs.values_mut() {
            log.forget(graphic);
        }
    }

    /// Forget every shape ever created under the label graphic `parent`.
    pub fn forget_under(&mut self, parent: GraphicId) {
        for log in self.logs.values_mut() {
            log.forget_under(parent);
        }
    }

    pub fn clear(&mut self) {
        self.logs.clear();
        self.active = None;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoxGeometry, PathGeometry, PolygonGeometry};

    fn scene_with_label() -> (Scene, GraphicId) {
        let mut scene = Scene::new();
        let label = scene.allocate_id();
        scene.insert(label, GraphicBody::Label, None);
        (scene, label)
    }

    fn geometry(scene: &Scene, id: GraphicId) -> Option<Geometry> {
        scene.get(id).and_then(|g| g.geometry().cloned())
    }

    fn draw_stroke(log: &mut CommandLog, scene: &mut Scene, label: GraphicId) -> GraphicId {
        let id = scene.allocate_id();
        log.begin_group();
        log.execute(
            Command::create(id, label, Geometry::Path(PathGeometry::new(Point::new(0.0, 0.0), 2.0))),
            scene,
        );
        for i in 1..=5 {
            log.execute(Command::extend(id, Point::new(i as f32, i as f32)), scene);
        }
        log.end_group();
        id
    }

    #[test]
    fn test_stroke_undoes_as_one_step() {
        let (mut scene, label) = scene_with_label();
        let mut log = CommandLog::new();
        let id = draw_stroke(&mut log, &mut scene, label);

        let changes = log.undo(&mut scene);
        assert!(changes.contains(&SceneChange::Removed(id)));
        assert!(!scene.contains(id));
        assert!(!log.can_undo());

        log.redo(&mut scene);
        assert_eq!(log.undo_count(), 6);
        let Some(Geometry::Path(path)) = geometry(&scene, id) else {
            panic!("expected a path");
        };
        assert_eq!(path.ops.len(), 6);
    }

    #[test]
    fn test_polygon_points_undo_individually() {
        let (mut scene, label) = scene_with_label();
        let mut log = CommandLog::new();
        let id = scene.allocate_id();
        log.execute(
            Command::create(id, label, Geometry::Polygon(PolygonGeometry::new(Point::new(0.0, 0.0)))),
            &mut scene,
        );
        log.execute(Command::extend(id, Point::new(100.0, 0.0)), &mut scene);
        log.execute(Command::extend(id, Point::new(100.0, 100.0)), &mut scene);

        log.undo(&mut scene);
        let Some(Geometry::Polygon(poly)) = geometry(&scene, id) else {
            panic!("expected a polygon");
        };
        assert_eq!(poly.vertices.len(), 2);
        assert_eq!(log.redo_count(), 1);
    }

    #[test]
    fn test_create_inherits_parent_color_and_name() {
        let (mut scene, label) = scene_with_label();
        if let Some(g) = scene.get_mut(label) {
            g.color = crate::color_utils::Color::rgb(10, 20, 30);
        }
        let mut log = CommandLog::new();
        let id = scene.allocate_id();
        log.execute(
            Command::create(id, label, Geometry::Box(BoxGeometry::new(Point::new(120.0, 340.0)))),
            &mut scene,
        );
        let g = scene.get(id).expect("created");
        assert_eq!(g.name, "Box at (120, 340)");
        assert_eq!(g.color, crate::color_utils::Color::rgb(10, 20, 30));
        assert!(g.selected);
    }

    #[test]
    fn test_unravel_removes_shape_and_resets_cursor() {
        let (mut scene, label) = scene_with_label();
        let mut log = CommandLog::new();
        let kept = draw_stroke(&mut log, &mut scene, label);

        let abandoned = scene.allocate_id();
        log.execute(
            Command::create(abandoned, label, Geometry::Polygon(PolygonGeometry::new(Point::new(5.0, 5.0)))),
            &mut scene,
        );
        log.execute(Command::extend(abandoned, Point::new(50.0, 5.0)), &mut scene);

        let changes = log.unravel(abandoned, &mut scene);
        assert!(changes.contains(&SceneChange::Removed(abandoned)));
        assert!(!scene.contains(abandoned));
        assert!(!log.references(abandoned));
        assert!(!log.can_redo());
        assert_eq!(log.undo_count(), 6);
        assert!(scene.contains(kept));
    }

    #[test]
    fn test_box_drag_is_reversible() {
        let (mut scene, label) = scene_with_label();
        let mut log = CommandLog::new();
        let id = scene.allocate_id();
        log.execute(
            Command::create(id, label, Geometry::Box(BoxGeometry::new(Point::new(10.0, 10.0)))),
            &mut scene,
        );
        log.execute(Command::move_vertex(id, 1, Point::new(30.0, 30.0)), &mut scene);
        log.execute(Command::move_vertex(id, 1, Point::new(50.0, 80.0)), &mut scene);
        log.execute(Command::extend(id, Point::new(50.0, 80.0)), &mut scene);

        log.undo(&mut scene);
        log.undo(&mut scene);
        let Some(Geometry::Box(b)) = geometry(&scene, id) else {
            panic!("expected a box");
        };
        assert!(!b.closed);
        assert_eq!(b.corners[1], Point::new(30.0, 30.0));
    }

    #[test]
    fn test_replay_reproduces_geometry() {
        let (mut scene, label) = scene_with_label();
        let mut log = CommandLog::new();
        let stroke = draw_stroke(&mut log, &mut scene, label);
        let poly = scene.allocate_id();
        log.execute(
            Command::create(poly, label, Geometry::Polygon(PolygonGeometry::new(Point::new(0.0, 0.0)))),
            &mut scene,
        );
        for p in [(100.0, 0.0), (100.0, 100.0), (0.0, 100.0), (3.0, 2.0)] {
            log.execute(Command::extend(poly, Point::new(p.0, p.1)), &mut scene);
        }
        log.undo(&mut scene);
        log.redo(&mut scene);
        let expected = (geometry(&scene, stroke), geometry(&scene, poly));

        let (mut fresh, fresh_label) = scene_with_label();
        assert_eq!(fresh_label, label);
        log.replay(&mut fresh);
        assert_eq!((geometry(&fresh, stroke), geometry(&fresh, poly)), expected);
    }

    #[test]
    fn test_execute_clears_redo() {
        let (mut scene, label) = scene_with_label();
        let mut log = CommandLog::new();
        draw_stroke(&mut log, &mut scene, label);
        log.undo(&mut scene);
        assert!(log.can_redo());

        draw_stroke(&mut log, &mut scene, label);
        assert!(!log.can_redo());
        assert_eq!(log.len(), 6);
    }

    #[test]
    fn test_max_history_drops_whole_shapes() {
        let (mut scene, label) = scene_with_label();
        let mut log = CommandLog::with_config(UndoConfig { max_history: 8 });
        let first = draw_stroke(&mut log, &mut scene, label);
        let second = draw_stroke(&mut log, &mut scene, label);

        assert!(!log.references(first));
        assert!(log.references(second));
        assert_eq!(log.len(), 6);
    }

    #[test]
    fn test_long_stroke_over_cap_stays_whole() {
        let (mut scene, label) = scene_with_label();
        let mut log = CommandLog::with_config(UndoConfig { max_history: 3 });
        let id = draw_stroke(&mut log, &mut scene, label);

        assert_eq!(log.len(), 6);
        let expected = geometry(&scene, id);
        let (mut fresh, _) = scene_with_label();
        log.replay(&mut fresh);
        assert_eq!(geometry(&fresh, id), expected);

        log.undo(&mut scene);
        assert!(!scene.contains(id));
        assert!(!log.can_undo());
    }

    #[test]
    fn test_cap_drops_older_shape_before_splitting_current() {
        let (mut scene, label) = scene_with_label();
        let mut log = CommandLog::with_config(UndoConfig { max_history: 4 });
        let first = draw_stroke(&mut log, &mut scene, label);
        let second = draw_stroke(&mut log, &mut scene, label);

        assert!(!log.references(first));
        assert_eq!(log.len(), 6);
        log.undo(&mut scene);
        assert!(!scene.contains(second));
        assert!(scene.contains(first));
    }

    #[test]
    fn test_redo_keeps_renamed_shape_name() {
        let (mut scene, label) = scene_with_label();
        let mut log = CommandLog::new();
        let id = scene.allocate_id();
        log.execute(
            Command::create(id, label, Geometry::Box(BoxGeometry::new(Point::new(1.0, 2.0)))),
            &mut scene,
        );
        if let Some(g) = scene.get_mut(id) {
            g.name = "front bumper".to_string();
        }

        log.undo(&mut scene);
        log.redo(&mut scene);
        assert_eq!(scene.get(id).map(|g| g.name.as_str()), Some("front bumper"));
    }

    #[test]
    fn test_forget_under_drops_undone_shapes() {
        let (mut scene, label) = scene_with_label();
        let mut log = CommandLog::new();
        draw_stroke(&mut log, &mut scene, label);
        log.undo(&mut scene);
        assert!(log.can_redo());

        assert_eq!(log.forget_under(label), 6);
        assert!(log.is_empty());
        assert!(!log.can_redo());
    }

    #[test]
    fn test_forget_adjusts_cursor() {
        let (mut scene, label) = scene_with_label();
        let mut log = CommandLog::new();
        let first = draw_stroke(&mut log, &mut scene, label);
        draw_stroke(&mut log, &mut scene, label);
        log.undo(&mut scene);

        assert_eq!(log.forget(first), 6);
        assert_eq!(log.undo_count(), 0);
        assert_eq!(log.redo_count(), 6);
    }

    #[test]
    fn test_histories_are_isolated() {
        let (mut scene, label) = scene_with_label();
        let mut histories = UndoHistories::new(UndoConfig::default());

        histories.activate(Path::new("a.png"));
        if let Some(log) = histories.active_mut() {
            draw_stroke(log, &mut scene, label);
        }
        histories.activate(Path::new("b.png"));
        assert!(histories.active().is_some_and(|l| !l.can_undo()));

        histories.activate(Path::new("a.png"));
        assert_eq!(histories.active().map(CommandLog::undo_count), Some(6));
        assert_eq!(histories.get(Path::new("b.png")).map(CommandLog::len), Some(0));
    }
}
