//! Data models: geometry, shape variants and the annotation node hierarchy.

mod geometry;
mod node;
mod shape;

pub use geometry::{Point, Rect};
pub use node::{AnnotationNode, AnnotationTree, CheckState, NodeId, NodeKind};
pub use shape::{
    BoxGeometry, Geometry, PathGeometry, PathOp, PointEffect, PolygonGeometry, ShapeGeometry,
    ShapeKind, display_name,
};
