//! Annotation Node hierarchy: labels at the top level, shapes beneath them.
//!
//! The tree is the model half of the model/scene pair. Every mutation goes
//! through a setter that reports whether anything actually changed, which is
//! what lets the synchronizer stop update ping-pong.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::color_utils::Color;
use crate::model::shape::{Geometry, ShapeGeometry, ShapeKind};

/// Stable identity of an annotation node. Never reused within a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Kind of annotation node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Label,
    Path,
    Polygon,
    Box,
}

impl NodeKind {
    pub fn shape_kind(&self) -> Option<ShapeKind> {
        match self {
            NodeKind::Label => None,
            NodeKind::Path => Some(ShapeKind::Path),
            NodeKind::Polygon => Some(ShapeKind::Polygon),
            NodeKind::Box => Some(ShapeKind::Box),
        }
    }

    pub fn is_label(&self) -> bool {
        matches!(self, NodeKind::Label)
    }
}

impl From<ShapeKind> for NodeKind {
    fn from(kind: ShapeKind) -> Self {
        match kind {
            ShapeKind::Path => NodeKind::Path,
            ShapeKind::Polygon => NodeKind::Polygon,
            ShapeKind::Box => NodeKind::Box,
        }
    }
}

/// Tri-state visibility check box, as shown in a tree view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckState {
    #[default]
    Checked,
    Unchecked,
    /// Some, but not all, children are visible (labels only).
    PartiallyChecked,
}

impl CheckState {
    pub fn from_visible(visible: bool) -> Self {
        if visible {
            CheckState::Checked
        } else {
            CheckState::Unchecked
        }
    }

    pub fn is_visible(&self) -> bool {
        !matches!(self, CheckState::Unchecked)
    }
}

/// A label or shape record.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationNode {
    id: NodeId,
    pub kind: NodeKind,
    pub name: String,
    /// Image file this node belongs to.
    pub file: PathBuf,
    /// Labels always carry a color; shapes carry one only when overriding
    /// their label's color.
    pub color: Option<Color>,
    pub check: CheckState,
    pub selected: bool,
    /// Shape payload; `None` for labels.
    pub geometry: Option<Geometry>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl AnnotationNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_visible(&self) -> bool {
        self.check.is_visible()
    }
}

/// Owner of all annotation nodes, with labels ordered as rows.
#[derive(Debug, Clone, Default)]
pub struct AnnotationTree {
    nodes: HashMap<NodeId, AnnotationNode>,
    roots: Vec<NodeId>,
    next_id: u64,
}

impl AnnotationTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> NodeId {
        self.next_id += 1;
        NodeId(self.next_id)
    }

    /// Append a top-level label row.
    pub fn add_label(&mut self, name: impl Into<String>, color: Color, file: impl Into<PathBuf>) -> NodeId {
        let id = self.allocate();
        self.nodes.insert(
            id,
            AnnotationNode {
                id,
                kind: NodeKind::Label,
                name: name.into(),
                file: file.into(),
                color: Some(color),
                check: CheckState::Checked,
                selected: false,
                geometry: None,
                parent: None,
                children: Vec::new(),
            },
        );
        self.roots.push(id);
        id
    }

    /// Append a shape row under `label`. Returns `None` if `label` is not a label.
    pub fn add_shape(&mut self, label: NodeId, name: impl Into<String>, geometry: Geometry) -> Option<NodeId> {
        let file = match self.nodes.get(&label) {
            Some(node) if node.kind.is_label() => node.file.clone(),
            _ => return None,
        };
        let id = self.allocate();
        self.nodes.insert(
            id,
            AnnotationNode {
                id,
                kind: geometry.kind().into(),
                name: name.into(),
                file,
                color: None,
                check: CheckState::Checked,
                selected: false,
                geometry: Some(geometry),
                parent: Some(label),
                children: Vec::new(),
            },
        );
        if let Some(parent) = self.nodes.get_mut(&label) {
            parent.children.push(id);
        }
        self.refresh_parent_check(label);
        Some(id)
    }

    pub fn get(&self, id: NodeId) -> Option<&AnnotationNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top-level label rows in order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Row list of `parent` (`None` for the top level).
    pub fn rows(&self, parent: Option<NodeId>) -> &[NodeId] {
        match parent {
            None => &self.roots,
            Some(p) => self.nodes.get(&p).map(|n| n.children.as_slice()).unwrap_or(&[]),
        }
    }

    pub fn node_at(&self, parent: Option<NodeId>, row: usize) -> Option<NodeId> {
        self.rows(parent).get(row).copied()
    }

    /// Parent and row index of a node.
    pub fn position(&self, id: NodeId) -> Option<(Option<NodeId>, usize)> {
        let parent = self.nodes.get(&id)?.parent;
        let row = self.rows(parent).iter().position(|n| *n == id)?;
        Some((parent, row))
    }

    /// The node and all of its descendants, parents before children.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.get(&next) {
                out.push(next);
                stack.extend(node.children.iter().rev());
            }
        }
        out
    }

    /// Label rows belonging to `file`, in row order.
    pub fn labels_for_file<'a>(&'a self, file: &'a Path) -> impl Iterator<Item = &'a AnnotationNode> + 'a {
        self.roots
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(move |n| n.file == file)
    }

    pub fn label_by_name(&self, file: &Path, name: &str) -> Option<NodeId> {
        self.labels_for_file(file)
            .find(|n| n.name == name)
            .map(|n| n.id)
    }

    /// Distinct image files referenced by labels, in first-row order.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = Vec::new();
        for node in self.roots.iter().filter_map(|id| self.nodes.get(id)) {
            if !files.contains(&node.file) {
                files.push(node.file.clone());
            }
        }
        files
    }

    /// Color the node is drawn with: its own, or its label's.
    pub fn effective_color(&self, id: NodeId) -> Option<Color> {
        let node = self.nodes.get(&id)?;
        match (node.color, node.parent) {
            (Some(color), _) => Some(color),
            (None, Some(parent)) => self.nodes.get(&parent).and_then(|p| p.color),
            (None, None) => None,
        }
    }

    /// Rename a node. Empty names are placeholders and are ignored.
    pub fn set_name(&mut self, id: NodeId, name: &str) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) if !name.is_empty() && node.name != name => {
                node.name = name.to_string();
                true
            }
            _ => false,
        }
    }

    /// Set a node's color. For shapes, passing the label's own color (or
    /// `None`) clears the override.
    pub fn set_color(&mut self, id: NodeId, color: Option<Color>) -> bool {
        let parent_color = self
            .nodes
            .get(&id)
            .and_then(|n| n.parent)
            .and_then(|p| self.nodes.get(&p))
            .and_then(|p| p.color);
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        let color = if node.kind.is_label() {
            match color {
                Some(c) => Some(c),
                None => return false,
            }
        } else if color == parent_color {
            None
        } else {
            color
        };
        if node.color == color {
            return false;
        }
        node.color = color;
        true
    }

    /// Set a node's check state and propagate it.
    ///
    /// Checking or unchecking a label applies to all of its shapes; toggling a
    /// shape recomputes its label's tri-state. Returns every node whose state
    /// changed.
    pub fn set_check_state(&mut self, id: NodeId, state: CheckState) -> Vec<NodeId> {
        let mut changed = Vec::new();
        let Some(node) = self.nodes.get(&id) else {
            return changed;
        };
        let (is_label, parent) = (node.kind.is_label(), node.parent);

        if is_label {
            if state == CheckState::PartiallyChecked {
                // Derived state, cannot be set directly
                return changed;
            }
            let children = node.children.clone();
            for child in std::iter::once(id).chain(children) {
                match self.nodes.get_mut(&child) {
                    Some(n) if n.check != state => {
                        n.check = state;
                        changed.push(child);
                    }
                    _ => {}
                }
            }
        } else {
            let state = CheckState::from_visible(state.is_visible());
            match self.nodes.get_mut(&id) {
                Some(n) if n.check != state => {
                    n.check = state;
                    changed.push(id);
                }
                _ => {}
            }
            if let Some(parent) = parent {
                if self.refresh_parent_check(parent) {
                    changed.push(parent);
                }
            }
        }
        changed
    }

    /// Recompute a label's tri-state from its children.
    fn refresh_parent_check(&mut self, label: NodeId) -> bool {
        let Some(node) = self.nodes.get(&label) else {
            return false;
        };
        if node.children.is_empty() {
            return false;
        }
        let visible = node
            .children
            .iter()
            .filter(|c| self.nodes.get(c).is_some_and(AnnotationNode::is_visible))
            .count();
        let state = match visible {
            0 => CheckState::Unchecked,
            n if n == node.children.len() => CheckState::Checked,
            _ => CheckState::PartiallyChecked,
        };
        match self.nodes.get_mut(&label) {
            Some(n) if n.check != state => {
                n.check = state;
                true
            }
            _ => false,
        }
    }

    pub fn set_selected(&mut self, id: NodeId, selected: bool) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) if node.selected != selected => {
                node.selected = selected;
                true
            }
            _ => false,
        }
    }

    /// Replace a shape node's geometry.
    pub fn set_geometry(&mut self, id: NodeId, geometry: &Geometry) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) if !node.kind.is_label() && node.geometry.as_ref() != Some(geometry) => {
                node.geometry = Some(geometry.clone());
                true
            }
            _ => false,
        }
    }

    /// Remove the row at `parent`/`row` together with its descendants.
    /// Returns the removed ids, parents first.
    pub fn remove_row(&mut self, parent: Option<NodeId>, row: usize) -> Vec<NodeId> {
        let Some(id) = self.node_at(parent, row) else {
            return Vec::new();
        };
        let removed = self.subtree(id);
        match parent {
            None => {
                self.roots.remove(row);
            }
            Some(p) => {
                if let Some(parent_node) = self.nodes.get_mut(&p) {
                    parent_node.children.remove(row);
                }
            }
        }
        for node in &removed {
            self.nodes.remove(node);
        }
        if let Some(p) = parent {
            self.refresh_parent_check(p);
        }
        removed
    }

    /// All nodes, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &AnnotationNode> {
        self.nodes.values()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
    }
}
