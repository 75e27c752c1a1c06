//! Bidirectional Annotation Node <-> Shape Graphic index.

use std::collections::HashMap;

use crate::model::NodeId;
use crate::scene::GraphicId;

/// One-to-one association between node and graphic identities.
///
/// Both directions are updated together; there is no way to insert or remove
/// only one half of a pair.
#[derive(Debug, Default, Clone)]
pub struct IdentityMap {
    node_to_graphic: HashMap<NodeId, GraphicId>,
    graphic_to_node: HashMap<GraphicId, NodeId>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a node and a graphic, replacing any previous partner of either.
    pub fn insert(&mut self, node: NodeId, graphic: GraphicId) {
        if let Some(old_graphic) = self.node_to_graphic.insert(node, graphic) {
            self.graphic_to_node.remove(&old_graphic);
        }
        if let Some(old_node) = self.graphic_to_node.insert(graphic, node) {
            if old_node != node {
                self.node_to_graphic.remove(&old_node);
            }
        }
    }

    pub fn graphic_for(&self, node: NodeId) -> Option<GraphicId> {
        self.node_to_graphic.get(&node).copied()
    }

    pub fn node_for(&self, graphic: GraphicId) -> Option<NodeId> {
        self.graphic_to_node.get(&graphic).copied()
    }

    /// Drop the pair containing `node`. Removing twice is harmless.
    pub fn remove_node(&mut self, node: NodeId) -> Option<GraphicId> {
        let graphic = self.node_to_graphic.remove(&node)?;
        self.graphic_to_node.remove(&graphic);
        Some(graphic)
    }

    /// Drop the pair containing `graphic`. Removing twice is harmless.
    pub fn remove_graphic(&mut self, graphic: GraphicId) -> Option<NodeId> {
        let node = self.graphic_to_node.remove(&graphic)?;
        self.node_to_graphic.remove(&node);
        Some(node)
    }

    pub fn len(&self) -> usize {
        self.node_to_graphic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_to_graphic.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, GraphicId)> + '_ {
        self.node_to_graphic.iter().map(|(n, g)| (*n, *g))
    }

    pub fn clear(&mut self) {
        self.node_to_graphic.clear();
        self.graphic_to_node.clear();
    }
}
