//! The scene graph: Shape Graphics, which of them are attached to the active
//! view, z-order and selection.
//!
//! Detaching a graphic hides it from the active scene but keeps the object
//! alive, so edits survive switching between images. Destroying it drops the
//! object for good.

mod graphic;

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

pub use graphic::{GraphicBody, GraphicId, ShapeGraphic};

use crate::model::{Point, Rect};

#[derive(Debug, Default)]
pub struct Scene {
    graphics: HashMap<GraphicId, ShapeGraphic>,
    attached: HashSet<GraphicId>,
    next_id: u64,
    next_z: u32,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an id for a graphic created later (e.g. by a Create command).
    pub fn allocate_id(&mut self) -> GraphicId {
        self.next_id += 1;
        GraphicId(self.next_id)
    }

    /// Insert a new graphic (or replace one with the same id) on top of the
    /// z-order. It is attached unless its parent group is detached.
    pub fn insert(&mut self, id: GraphicId, body: GraphicBody, parent: Option<GraphicId>) -> &mut ShapeGraphic {
        if id.0 > self.next_id {
            self.next_id = id.0;
        }
        self.next_z += 1;
        let mut graphic = ShapeGraphic::new(id, body, parent);
        graphic.z = self.next_z;
        if parent.is_none_or(|p| self.attached.contains(&p)) {
            self.attached.insert(id);
        } else {
            self.attached.remove(&id);
        }
        log::trace!("Scene: inserted {}", id);
        match self.graphics.entry(id) {
            Entry::Occupied(mut slot) => {
                slot.insert(graphic);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(graphic),
        }
    }

    pub fn get(&self, id: GraphicId) -> Option<&ShapeGraphic> {
        self.graphics.get(&id)
    }

    pub fn get_mut(&mut self, id: GraphicId) -> Option<&mut ShapeGraphic> {
        self.graphics.get_mut(&id)
    }

    pub fn contains(&self, id: GraphicId) -> bool {
        self.graphics.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.graphics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphics.is_empty()
    }

    /// Direct children of a label group, in z-order.
    pub fn children_of(&self, id: GraphicId) -> Vec<GraphicId> {
        let mut children: Vec<_> = self
            .graphics
            .values()
            .filter(|g| g.parent == Some(id))
            .map(|g| (g.z, g.id()))
            .collect();
        children.sort_unstable();
        children.into_iter().map(|(_, id)| id).collect()
    }

    fn with_children(&self, id: GraphicId) -> Vec<GraphicId> {
        let mut ids = vec![id];
        ids.extend(self.children_of(id));
        ids
    }

    /// Put a graphic and its children back into the active scene.
    pub fn attach(&mut self, id: GraphicId) {
        for g in self.with_children(id) {
            if self.graphics.contains_key(&g) {
                self.attached.insert(g);
            }
        }
    }

    /// Take a graphic and its children out of the active scene, keeping them alive.
    pub fn detach(&mut self, id: GraphicId) {
        for g in self.with_children(id) {
            self.attached.remove(&g);
        }
    }

    pub fn is_attached(&self, id: GraphicId) -> bool {
        self.attached.contains(&id)
    }

    /// Destroy a graphic and its children. Destroying an unknown id is a no-op.
    pub fn destroy(&mut self, id: GraphicId) -> Vec<ShapeGraphic> {
        let mut removed = Vec::new();
        for g in self.with_children(id) {
            self.attached.remove(&g);
            if let Some(graphic) = self.graphics.remove(&g) {
                removed.push(graphic);
            }
        }
        if !removed.is_empty() {
            log::trace!("Scene: destroyed {} ({} items)", id, removed.len());
        }
        removed
    }

    /// Attached graphics, bottom to top.
    pub fn items(&self) -> Vec<&ShapeGraphic> {
        let mut items: Vec<_> = self
            .attached
            .iter()
            .filter_map(|id| self.graphics.get(id))
            .collect();
        items.sort_unstable_by_key(|g| g.z);
        items
    }

    /// All graphics, attached or not.
    pub fn iter(&self) -> impl Iterator<Item = &ShapeGraphic> {
        self.graphics.values()
    }

    /// Whether a graphic is effectively visible: attached, itself visible
    /// and its label group visible.
    pub fn is_shown(&self, id: GraphicId) -> bool {
        let Some(g) = self.graphics.get(&id) else {
            return false;
        };
        self.is_attached(id)
            && g.visible
            && g
                .parent
                .and_then(|p| self.graphics.get(&p))
                .is_none_or(|p| p.visible)
    }

    /// Top-most shown shape under `point`.
    pub fn hit_test(&self, point: &Point) -> Option<GraphicId> {
        self.items()
            .into_iter()
            .rev()
            .filter(|g| !g.is_label() && self.is_shown(g.id()))
            .find(|g| g.contains(point))
            .map(ShapeGraphic::id)
    }

    /// Shown shapes whose bounds intersect `rect`.
    pub fn items_in_rect(&self, rect: &Rect) -> Vec<GraphicId> {
        self.items()
            .into_iter()
            .filter(|g| !g.is_label() && self.is_shown(g.id()))
            .filter(|g| g.bounding_rect().is_some_and(|b| b.intersects(rect)))
            .map(ShapeGraphic::id)
            .collect()
    }

    pub fn selected(&self) -> Vec<GraphicId> {
        self.items()
            .into_iter()
            .filter(|g| g.selected)
            .map(ShapeGraphic::id)
            .collect()
    }

    /// Bring a graphic to the top of the z-order.
    pub fn raise(&mut self, id: GraphicId) {
        self.next_z += 1;
        let z = self.next_z;
        if let Some(g) = self.graphics.get_mut(&id) {
            g.z = z;
        }
    }

    pub fn clear(&mut self) {
        self.graphics.clear();
        self.attached.clear();
    }
}
