//! Model-scene synchronization.
//!
//! [`Synchronizer`] owns the Annotation Node tree, the scene graph and the
//! [`IdentityMap`] between them, and mirrors edits from either side onto the
//! other. Every copy is diff-guarded: a field is only written when the
//! destination value actually differs, so a change bounced back from the
//! other side is a no-op and two observers can never ping-pong forever.
//!
//! A lookup miss is never an error. If a node has no graphic (or a graphic no
//! node) when a change arrives, the counterpart is created on the spot.

mod identity;

use std::path::{Path, PathBuf};

pub use identity::IdentityMap;

use crate::color_utils::Color;
use crate::model::{
    AnnotationNode, AnnotationTree, CheckState, Geometry, NodeId, ShapeGeometry, display_name,
};
use crate::scene::{GraphicBody, GraphicId, Scene};

/// A synchronizable property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Color,
    Visibility,
    Geometry,
    Selection,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Name,
        Field::Color,
        Field::Visibility,
        Field::Geometry,
        Field::Selection,
    ];
}

/// A change made directly to the scene (by an undo command or the host) that
/// still has to be mirrored into the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneChange {
    Created(GraphicId),
    Changed(GraphicId, Field),
    Removed(GraphicId),
}

/// Notification for external observers (tree views, canvases).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    NodeCreated(NodeId),
    GraphicCreated(GraphicId),
    NodeChanged(NodeId, Vec<Field>),
    GraphicChanged(GraphicId, Vec<Field>),
    NodeRemoved(NodeId),
    GraphicRemoved(GraphicId),
}

/// Everything torn down by one removal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removal {
    /// Removed nodes, parents first.
    pub nodes: Vec<NodeId>,
    pub graphics: Vec<GraphicId>,
}

impl Removal {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.graphics.is_empty()
    }

    fn merge(&mut self, other: Removal) {
        self.nodes.extend(other.nodes);
        self.graphics.extend(other.graphics);
    }
}

/// Mediator between the annotation tree and the scene.
#[derive(Debug, Default)]
pub struct Synchronizer {
    tree: AnnotationTree,
    scene: Scene,
    map: IdentityMap,
    active_file: Option<PathBuf>,
    events: Vec<SyncEvent>,
}

const FALLBACK_COLOR: Color = Color::gray(200);

impl Synchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree(&self) -> &AnnotationTree {
        &self.tree
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Direct scene access. Callers must report edits through
    /// [`on_graphic_changed`](Self::on_graphic_changed) or
    /// [`apply_scene_changes`](Self::apply_scene_changes).
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn identity(&self) -> &IdentityMap {
        &self.map
    }

    pub fn graphic_for(&self, node: NodeId) -> Option<GraphicId> {
        self.map.graphic_for(node)
    }

    pub fn node_for(&self, graphic: GraphicId) -> Option<NodeId> {
        self.map.node_for(graphic)
    }

    pub fn active_file(&self) -> Option<&Path> {
        self.active_file.as_deref()
    }

    /// Take all pending observer notifications.
    pub fn drain_events(&mut self) -> Vec<SyncEvent> {
        std::mem::take(&mut self.events)
    }

    // ========================================================================
    // Node -> graphic
    // ========================================================================

    /// Mirror `fields` of `node` onto its graphic, creating the graphic if it
    /// does not exist yet. Returns the fields that actually changed.
    pub fn on_node_changed(&mut self, node: NodeId, fields: &[Field]) -> Vec<Field> {
        if !self.tree.contains(node) {
            log::debug!("Sync: change for unknown {} ignored", node);
            return Vec::new();
        }
        let graphic = match self.live_graphic(node) {
            Some(g) => g,
            None => {
                return match self.create_graphic_for(node) {
                    Some(_) => Field::ALL.to_vec(),
                    None => Vec::new(),
                };
            }
        };

        let mut changed = Vec::new();
        let mut recolor_children = false;
        {
            let Some(n) = self.tree.get(node) else {
                return changed;
            };
            let color = self.tree.effective_color(node);
            let Some(g) = self.scene.get_mut(graphic) else {
                return changed;
            };
            for field in fields {
                let differs = match field {
                    Field::Name => {
                        if !n.name.is_empty() && g.name != n.name {
                            g.name = n.name.clone();
                            true
                        } else {
                            false
                        }
                    }
                    Field::Color => match color {
                        Some(c) if g.color != c => {
                            g.color = c;
                            recolor_children = n.kind.is_label();
                            true
                        }
                        _ => false,
                    },
                    Field::Visibility => {
                        if g.visible != n.is_visible() {
                            g.visible = n.is_visible();
                            true
                        } else {
                            false
                        }
                    }
                    Field::Geometry => match &n.geometry {
                        Some(geo) if g.geometry() != Some(geo) => {
                            g.body = GraphicBody::Shape(geo.clone());
                            true
                        }
                        _ => false,
                    },
                    Field::Selection => {
                        if g.selected != n.selected {
                            g.selected = n.selected;
                            true
                        } else {
                            false
                        }
                    }
                };
                if differs && !changed.contains(field) {
                    changed.push(*field);
                }
            }
        }

        if recolor_children {
            let children = self.tree.get(node).map(|n| n.children().to_vec()).unwrap_or_default();
            for child in children {
                self.on_node_changed(child, &[Field::Color]);
            }
        }
        if !changed.is_empty() {
            log::trace!("Sync: {} -> {} {:?}", node, graphic, changed);
            self.events.push(SyncEvent::GraphicChanged(graphic, changed.clone()));
        }
        changed
    }

    fn live_graphic(&self, node: NodeId) -> Option<GraphicId> {
        self.map.graphic_for(node).filter(|g| self.scene.contains(*g))
    }

    fn live_node(&self, graphic: GraphicId) -> Option<NodeId> {
        self.map.node_for(graphic).filter(|n| self.tree.contains(*n))
    }

    /// Build the graphic for `node` (and for its label first, if needed).
    fn create_graphic_for(&mut self, node: NodeId) -> Option<GraphicId> {
        let n: AnnotationNode = self.tree.get(node)?.clone();
        let parent = match n.parent() {
            Some(p) => Some(match self.live_graphic(p) {
                Some(g) => g,
                None => self.create_graphic_for(p)?,
            }),
            None => None,
        };
        let body = match &n.geometry {
            Some(geo) => GraphicBody::Shape(geo.clone()),
            None => GraphicBody::Label,
        };
        let color = self.tree.effective_color(node).unwrap_or(FALLBACK_COLOR);

        let id = self.scene.allocate_id();
        let graphic = self.scene.insert(id, body, parent);
        graphic.name = n.name.clone();
        graphic.color = color;
        graphic.visible = n.is_visible();
        graphic.selected = n.selected;
        if self.active_file.as_deref() != Some(n.file.as_path()) {
            self.scene.detach(id);
        }
        self.map.insert(node, id);
        log::debug!("Sync: created {} for {} '{}'", id, node, n.name);
        self.events.push(SyncEvent::GraphicCreated(id));
        Some(id)
    }

    // ========================================================================
    // Graphic -> node
    // ========================================================================

    /// Mirror `fields` of `graphic` onto its node, creating the node if it
    /// does not exist yet. Returns the fields that actually changed.
    pub fn on_graphic_changed(&mut self, graphic: GraphicId, fields: &[Field]) -> Vec<Field> {
        if !self.scene.contains(graphic) {
            log::debug!("Sync: change for unknown {} ignored", graphic);
            return Vec::new();
        }
        let node = match self.live_node(graphic) {
            Some(n) => n,
            None => {
                return match self.create_node_for(graphic) {
                    Some(_) => Field::ALL.to_vec(),
                    None => Vec::new(),
                };
            }
        };

        let mut changed = Vec::new();
        let mut follow_up: Vec<NodeId> = Vec::new();
        let mut recolor_children = false;
        for field in fields {
            let Some(g) = self.scene.get(graphic) else {
                break;
            };
            let differs = match field {
                Field::Name => !g.name.is_empty() && self.tree.set_name(node, &g.name),
                Field::Color => {
                    let is_label = g.is_label();
                    let updated = self.tree.set_color(node, Some(g.color));
                    recolor_children |= updated && is_label;
                    updated
                }
                Field::Visibility => {
                    let visible = g.visible;
                    let current = self.tree.get(node).map(AnnotationNode::is_visible);
                    if current == Some(visible) {
                        false
                    } else {
                        let affected = self
                            .tree
                            .set_check_state(node, CheckState::from_visible(visible));
                        follow_up.extend(affected.iter().copied().filter(|n| *n != node));
                        affected.contains(&node)
                    }
                }
                Field::Geometry => match g.geometry() {
                    Some(geo) => {
                        let geo: Geometry = geo.clone();
                        self.tree.set_geometry(node, &geo)
                    }
                    None => false,
                },
                Field::Selection => {
                    let selected = g.selected;
                    self.tree.set_selected(node, selected)
                }
            };
            if differs && !changed.contains(field) {
                changed.push(*field);
            }
        }

        // Propagated check states and inherited colors flow back out to the
        // other graphics; the diff guard makes the source graphic a no-op.
        for other in follow_up {
            self.on_node_changed(other, &[Field::Visibility]);
        }
        if recolor_children {
            let children = self.tree.get(node).map(|n| n.children().to_vec()).unwrap_or_default();
            for child in children {
                self.on_node_changed(child, &[Field::Color]);
            }
        }
        if !changed.is_empty() {
            log::trace!("Sync: {} -> {} {:?}", graphic, node, changed);
            self.events.push(SyncEvent::NodeChanged(node, changed.clone()));
        }
        changed
    }

    /// Build the node for `graphic` (and for its label group first, if needed).
    fn create_node_for(&mut self, graphic: GraphicId) -> Option<NodeId> {
        let g = self.scene.get(graphic)?.clone();
        let id = match &g.body {
            GraphicBody::Label => {
                let file = self.active_file.clone().unwrap_or_default();
                self.tree.add_label(g.name.clone(), g.color, file)
            }
            GraphicBody::Shape(geo) => {
                let parent_graphic = g.parent?;
                let parent = match self.live_node(parent_graphic) {
                    Some(n) => n,
                    None => self.create_node_for(parent_graphic)?,
                };
                let name = if g.name.is_empty() {
                    display_name(geo.kind(), geo.origin())
                } else {
                    g.name.clone()
                };
                let id = self.tree.add_shape(parent, name, geo.clone())?;
                self.tree.set_color(id, Some(g.color));
                self.tree.set_selected(id, g.selected);
                if !g.visible {
                    self.tree.set_check_state(id, CheckState::Unchecked);
                }
                id
            }
        };
        self.map.insert(id, graphic);
        log::debug!("Sync: created {} for {}", id, graphic);
        self.events.push(SyncEvent::NodeCreated(id));
        Some(id)
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Remove the row `row` under `parent` together with its descendants,
    /// destroying their graphics and identity map entries.
    pub fn on_node_removed(&mut self, parent: Option<NodeId>, row: usize) -> Removal {
        let Some(id) = self.tree.node_at(parent, row) else {
            log::debug!("Sync: no row {} under {:?}", row, parent);
            return Removal::default();
        };
        let mut removal = Removal::default();
        for node in self.tree.subtree(id).into_iter().rev() {
            if let Some(graphic) = self.map.remove_node(node) {
                self.scene.destroy(graphic);
                removal.graphics.push(graphic);
                self.events.push(SyncEvent::GraphicRemoved(graphic));
            }
        }
        removal.graphics.reverse();
        removal.nodes = self.tree.remove_row(parent, row);
        for node in &removal.nodes {
            self.events.push(SyncEvent::NodeRemoved(*node));
        }
        log::debug!(
            "Sync: removed {} nodes / {} graphics",
            removal.nodes.len(),
            removal.graphics.len()
        );
        removal
    }

    /// Remove `graphic`'s node row (cascading). Safe to call again for a
    /// graphic whose removal was already processed.
    pub fn on_graphic_removed(&mut self, graphic: GraphicId) -> Removal {
        if let Some(node) = self.map.node_for(graphic) {
            if let Some((parent, row)) = self.tree.position(node) {
                return self.on_node_removed(parent, row);
            }
            self.map.remove_graphic(graphic);
        }

        // No live node: just make sure the graphic and any children are gone.
        let mut removal = Removal::default();
        for destroyed in self.scene.destroy(graphic) {
            let gid = destroyed.id();
            if let Some(node) = self.map.remove_graphic(gid) {
                if let Some((parent, row)) = self.tree.position(node) {
                    removal.merge(self.on_node_removed(parent, row));
                }
            }
            removal.graphics.push(gid);
            self.events.push(SyncEvent::GraphicRemoved(gid));
        }
        removal
    }

    /// Remove a node by id. Convenience over [`on_node_removed`](Self::on_node_removed).
    pub fn remove_node(&mut self, node: NodeId) -> Removal {
        match self.tree.position(node) {
            Some((parent, row)) => self.on_node_removed(parent, row),
            None => Removal::default(),
        }
    }

    /// Mirror a batch of scene edits into the tree.
    pub fn apply_scene_changes(&mut self, changes: &[SceneChange]) -> Removal {
        let mut removal = Removal::default();
        for change in changes {
            match *change {
                SceneChange::Created(g) => {
                    self.on_graphic_changed(g, &Field::ALL);
                }
                SceneChange::Changed(g, field) => {
                    self.on_graphic_changed(g, &[field]);
                }
                SceneChange::Removed(g) => removal.merge(self.on_graphic_removed(g)),
            }
        }
        removal
    }

    // ========================================================================
    // Image switching
    // ========================================================================

    /// Make `file` the active image: attach its labels and shapes to the
    /// scene and detach everything else. Graphics are kept, not recreated.
    pub fn filter_visible_for_file(&mut self, file: &Path) {
        self.active_file = Some(file.to_path_buf());
        let labels: Vec<NodeId> = self.tree.roots().to_vec();
        let (mut shown, mut hidden) = (0, 0);
        for label in labels {
            let Some(node) = self.tree.get(label) else {
                continue;
            };
            let show = node.file == file;
            let children = node.children().to_vec();
            if show {
                let Some(graphic) = self
                    .live_graphic(label)
                    .or_else(|| self.create_graphic_for(label))
                else {
                    continue;
                };
                for child in children {
                    if self.live_graphic(child).is_none() {
                        self.create_graphic_for(child);
                    }
                }
                self.scene.attach(graphic);
                shown += 1;
            } else if let Some(graphic) = self.live_graphic(label) {
                self.scene.detach(graphic);
                hidden += 1;
            }
        }
        log::debug!(
            "Sync: active file {:?} ({} labels shown, {} hidden)",
            file,
            shown,
            hidden
        );
    }

    /// Copy the label vocabulary (names and colors, no shapes) of `from`
    /// onto `to`, skipping names `to` already has.
    pub fn copy_labels(&mut self, from: &Path, to: &Path) -> Vec<NodeId> {
        let definitions: Vec<(String, Color)> = self
            .tree
            .labels_for_file(from)
            .map(|n| (n.name.clone(), n.color.unwrap_or(FALLBACK_COLOR)))
            .collect();
        let mut created = Vec::new();
        for (name, color) in definitions {
            if self.tree.label_by_name(to, &name).is_none() {
                created.push(self.add_label(name, color, to));
            }
        }
        if !created.is_empty() {
            log::debug!("Sync: copied {} labels {:?} -> {:?}", created.len(), from, to);
        }
        created
    }

    // ========================================================================
    // Edits arriving from the tree side
    // ========================================================================

    pub fn add_label(&mut self, name: impl Into<String>, color: Color, file: impl Into<PathBuf>) -> NodeId {
        let id = self.tree.add_label(name, color, file);
        self.events.push(SyncEvent::NodeCreated(id));
        self.on_node_changed(id, &Field::ALL);
        id
    }

    pub fn add_shape(&mut self, label: NodeId, name: impl Into<String>, geometry: Geometry) -> Option<NodeId> {
        let id = self.tree.add_shape(label, name, geometry)?;
        self.events.push(SyncEvent::NodeCreated(id));
        self.on_node_changed(id, &Field::ALL);
        // The label's tri-state may have changed
        self.on_node_changed(label, &[Field::Visibility]);
        Some(id)
    }

    pub fn rename_node(&mut self, node: NodeId, name: &str) -> bool {
        self.tree.set_name(node, name) && !self.on_node_changed(node, &[Field::Name]).is_empty()
    }

    pub fn recolor_node(&mut self, node: NodeId, color: Option<Color>) -> bool {
        if !self.tree.set_color(node, color) {
            return false;
        }
        self.on_node_changed(node, &[Field::Color]);
        true
    }

    pub fn set_node_check_state(&mut self, node: NodeId, state: CheckState) -> Vec<NodeId> {
        let affected = self.tree.set_check_state(node, state);
        for n in &affected {
            self.on_node_changed(*n, &[Field::Visibility]);
        }
        affected
    }

    pub fn set_node_geometry(&mut self, node: NodeId, geometry: &Geometry) -> bool {
        self.tree.set_geometry(node, geometry)
            && !self.on_node_changed(node, &[Field::Geometry]).is_empty()
    }

    /// Replace the tree selection with `nodes`, mirrored onto the scene.
    pub fn select_nodes(&mut self, nodes: &[NodeId]) {
        let previously: Vec<NodeId> = self
            .tree
            .iter()
            .filter(|n| n.selected && !nodes.contains(&n.id()))
            .map(AnnotationNode::id)
            .collect();
        for node in previously {
            if self.tree.set_selected(node, false) {
                self.on_node_changed(node, &[Field::Selection]);
            }
        }
        for node in nodes {
            if self.tree.set_selected(*node, true) {
                self.on_node_changed(*node, &[Field::Selection]);
            }
        }
    }

    // ========================================================================
    // Edits arriving from the scene side
    // ========================================================================

    /// Replace the scene selection with `graphics`, mirrored onto the tree.
    pub fn select_graphics(&mut self, graphics: &[GraphicId]) {
        let previously: Vec<GraphicId> = self
            .scene
            .iter()
            .filter(|g| g.selected && !graphics.contains(&g.id()))
            .map(|g| g.id())
            .collect();
        for (graphic, selected) in previously
            .into_iter()
            .map(|g| (g, false))
            .chain(graphics.iter().map(|g| (*g, true)))
        {
            let Some(g) = self.scene.get_mut(graphic) else {
                continue;
            };
            if g.selected != selected {
                g.selected = selected;
                self.on_graphic_changed(graphic, &[Field::Selection]);
            }
        }
    }

    pub fn set_graphic_visible(&mut self, graphic: GraphicId, visible: bool) -> bool {
        match self.scene.get_mut(graphic) {
            Some(g) if g.visible != visible => {
                g.visible = visible;
                self.on_graphic_changed(graphic, &[Field::Visibility]);
                true
            }
            _ => false,
        }
    }

    pub fn set_graphic_color(&mut self, graphic: GraphicId, color: Color) -> bool {
        match self.scene.get_mut(graphic) {
            Some(g) if g.color != color => {
                g.color = color;
                self.on_graphic_changed(graphic, &[Field::Color]);
                true
            }
            _ => false,
        }
    }

    // ========================================================================
    // Whole-state helpers
    // ========================================================================

    /// Create graphics for every node that lacks one.
    pub fn materialize_all(&mut self) {
        let labels: Vec<NodeId> = self.tree.roots().to_vec();
        for label in labels {
            for node in self.tree.subtree(label) {
                if self.live_graphic(node).is_none() {
                    self.create_graphic_for(node);
                }
            }
        }
    }

    /// Shape nodes whose geometry is degenerate (zero-area boxes, zero-length paths).
    pub fn degenerate_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .tree
            .iter()
            .filter(|n| n.geometry.as_ref().is_some_and(Geometry::is_degenerate))
            .map(AnnotationNode::id)
            .collect();
        nodes.sort_unstable();
        nodes
    }

    /// Every node has exactly one live graphic and vice versa.
    pub fn is_consistent(&self) -> bool {
        self.map.len() == self.tree.len()
            && self.map.len() == self.scene.len()
            && self
                .map
                .iter()
                .all(|(n, g)| self.tree.contains(n) && self.scene.contains(g))
    }

    pub fn clear(&mut self) {
        self.tree.clear();
        self.scene.clear();
        self.map.clear();
        self.active_file = None;
        self.events.clear();
    }
}
