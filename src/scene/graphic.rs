//! Shape Graphic: the renderable, selectable counterpart of an annotation node.

use std::fmt;

use crate::color_utils::Color;
use crate::model::{Geometry, NodeKind, Point, Rect, ShapeGeometry};

/// Identity of a graphic within a [`Scene`](super::Scene).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphicId(pub(crate) u64);

impl fmt::Display for GraphicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graphic#{}", self.0)
    }
}

/// Payload of a graphic: a label group or a drawable shape.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphicBody {
    /// Group item that owns the shapes of one label.
    Label,
    Shape(Geometry),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeGraphic {
    id: GraphicId,
    pub body: GraphicBody,
    pub name: String,
    pub color: Color,
    pub visible: bool,
    pub selected: bool,
    /// Owning label group, `None` for top-level items.
    pub parent: Option<GraphicId>,
    pub z: u32,
}

impl ShapeGraphic {
    pub(crate) fn new(id: GraphicId, body: GraphicBody, parent: Option<GraphicId>) -> Self {
        Self {
            id,
            body,
            name: String::new(),
            color: Color::gray(200),
            visible: true,
            selected: false,
            parent,
            z: 0,
        }
    }

    pub fn id(&self) -> GraphicId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        match &self.body {
            GraphicBody::Label => NodeKind::Label,
            GraphicBody::Shape(g) => g.kind().into(),
        }
    }

    pub fn is_label(&self) -> bool {
        matches!(self.body, GraphicBody::Label)
    }

    pub fn geometry(&self) -> Option<&Geometry> {
        match &self.body {
            GraphicBody::Shape(g) => Some(g),
            GraphicBody::Label => None,
        }
    }

    pub fn geometry_mut(&mut self) -> Option<&mut Geometry> {
        match &mut self.body {
            GraphicBody::Shape(g) => Some(g),
            GraphicBody::Label => None,
        }
    }

    /// Bounds of the shape; labels have none of their own.
    pub fn bounding_rect(&self) -> Option<Rect> {
        self.geometry().and_then(ShapeGeometry::bounding_rect)
    }

    pub fn contains(&self, point: &Point) -> bool {
        self.geometry().is_some_and(|g| g.contains(point))
    }

    pub fn is_closed(&self) -> bool {
        self.geometry().is_some_and(ShapeGeometry::is_closed)
    }
}
