//! Shape geometry variants and the capability interface they share.
//!
//! Every drawable shape is one of [`PathGeometry`], [`PolygonGeometry`] or
//! [`BoxGeometry`], wrapped in the tagged [`Geometry`] enum. Converters, the
//! synchronizer and the undo engine only talk to shapes through the
//! [`ShapeGeometry`] trait, never by inspecting the concrete variant.

use serde::{Deserialize, Serialize};

use crate::constants::{HIT_RADIUS, POLYGON_CLOSE_MIN_VERTICES, POLYGON_CLOSE_THRESHOLD};
use crate::model::geometry::{Point, Rect};

/// The kind of drawable shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Path,
    Polygon,
    Box,
}

impl ShapeKind {
    pub fn name(&self) -> &'static str {
        match self {
            ShapeKind::Path => "Path",
            ShapeKind::Polygon => "Polygon",
            ShapeKind::Box => "Box",
        }
    }
}

/// What a single [`ShapeGeometry::apply_point`] call did to the geometry.
///
/// Kept by the undo engine so [`ShapeGeometry::revert_point`] can reverse
/// exactly that step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointEffect {
    /// A new vertex/segment was appended.
    Appended,
    /// The point snapped onto the first vertex and closed the polygon.
    Closed,
    /// The box's free corner was committed and the rectangle normalized.
    Committed { previous: [Point; 2] },
    /// Nothing changed (shape already closed).
    Ignored,
}

/// Capability interface implemented by every shape variant.
pub trait ShapeGeometry {
    fn kind(&self) -> ShapeKind;

    /// Vertex sequence describing the geometry.
    fn points(&self) -> Vec<Point>;

    /// Axis-aligned bounds used for export and hit testing.
    fn bounding_rect(&self) -> Option<Rect>;

    /// Feed the next pointer point into the geometry.
    fn apply_point(&mut self, point: Point) -> PointEffect;

    /// Undo a previous [`apply_point`](Self::apply_point) given its effect.
    fn revert_point(&mut self, effect: &PointEffect);

    /// Overwrite vertex `index`, returning its prior value.
    fn move_vertex(&mut self, index: usize, to: Point) -> Option<Point>;

    fn is_closed(&self) -> bool;

    /// Hit test in scene coordinates.
    fn contains(&self, point: &Point) -> bool;
}

/// A single path drawing instruction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathOp {
    MoveTo(Point),
    LineTo(Point),
}

impl PathOp {
    pub fn point(&self) -> Point {
        match self {
            PathOp::MoveTo(p) | PathOp::LineTo(p) => *p,
        }
    }
}

/// Freehand stroke: a move followed by line segments, drawn with a round brush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathGeometry {
    pub ops: Vec<PathOp>,
    /// Brush radius; the stroked outline extends this far from the centerline.
    pub radius: f32,
}

impl PathGeometry {
    pub fn new(start: Point, radius: f32) -> Self {
        Self {
            ops: vec![PathOp::MoveTo(start)],
            radius,
        }
    }

    /// True when the stroke never left its starting point.
    pub fn is_zero_length(&self) -> bool {
        let Some(first) = self.ops.first().map(PathOp::point) else {
            return true;
        };
        self.ops.iter().all(|op| op.point() == first)
    }

    /// Line segments of the centerline.
    pub fn segments(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        self.ops.windows(2).filter_map(|w| match w[1] {
            PathOp::LineTo(to) => Some((w[0].point(), to)),
            PathOp::MoveTo(_) => None,
        })
    }
}

impl ShapeGeometry for PathGeometry {
    fn kind(&self) -> ShapeKind {
        ShapeKind::Path
    }

    fn points(&self) -> Vec<Point> {
        self.ops.iter().map(PathOp::point).collect()
    }

    fn bounding_rect(&self) -> Option<Rect> {
        // Stroked outline: the brush reaches `radius` past every vertex, which
        // also covers any self-intersecting loops of the centerline.
        Rect::enclosing(self.points()).map(|r| r.expanded(self.radius))
    }

    fn apply_point(&mut self, point: Point) -> PointEffect {
        self.ops.push(PathOp::LineTo(point));
        PointEffect::Appended
    }

    fn revert_point(&mut self, effect: &PointEffect) {
        if matches!(effect, PointEffect::Appended)
            && matches!(self.ops.last(), Some(PathOp::LineTo(_)))
        {
            self.ops.pop();
        }
    }

    fn move_vertex(&mut self, index: usize, to: Point) -> Option<Point> {
        let op = self.ops.get_mut(index)?;
        let prior = op.point();
        *op = match *op {
            PathOp::MoveTo(_) => PathOp::MoveTo(to),
            PathOp::LineTo(_) => PathOp::LineTo(to),
        };
        Some(prior)
    }

    fn is_closed(&self) -> bool {
        false
    }

    fn contains(&self, point: &Point) -> bool {
        let reach = self.radius + HIT_RADIUS;
        if self.ops.len() == 1 {
            return self.ops[0].point().distance_to(point) <= reach;
        }
        self.segments()
            .any(|(a, b)| distance_to_segment(point, a, b) <= reach)
    }
}

fn default_close_threshold() -> f32 {
    POLYGON_CLOSE_THRESHOLD
}

/// Click-by-click polygon. Closing never duplicates the first vertex; the
/// closing edge is implied by `closed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonGeometry {
    pub vertices: Vec<Point>,
    pub closed: bool,
    #[serde(skip, default = "default_close_threshold")]
    pub close_threshold: f32,
}

impl PolygonGeometry {
    pub fn new(start: Point) -> Self {
        Self {
            vertices: vec![start],
            closed: false,
            close_threshold: POLYGON_CLOSE_THRESHOLD,
        }
    }

    pub fn with_close_threshold(mut self, threshold: f32) -> Self {
        self.close_threshold = threshold;
        self
    }

    /// Whether adding `point` next would snap the polygon closed.
    pub fn would_close(&self, point: &Point) -> bool {
        !self.closed
            && self.vertices.len() >= POLYGON_CLOSE_MIN_VERTICES
            && self
                .vertices
                .first()
                .is_some_and(|first| first.distance_to(point) <= self.close_threshold)
    }

    /// Polygon edges, including the closing edge once closed.
    pub fn edges(&self) -> Vec<(Point, Point)> {
        let mut edges: Vec<_> = self.vertices.windows(2).map(|w| (w[0], w[1])).collect();
        if self.closed && self.vertices.len() > 2 {
            edges.push((self.vertices[self.vertices.len() - 1], self.vertices[0]));
        }
        edges
    }
}

impl ShapeGeometry for PolygonGeometry {
    fn kind(&self) -> ShapeKind {
        ShapeKind::Polygon
    }

    fn points(&self) -> Vec<Point> {
        self.vertices.clone()
    }

    fn bounding_rect(&self) -> Option<Rect> {
        Rect::enclosing(self.vertices.iter().copied())
    }

    fn apply_point(&mut self, point: Point) -> PointEffect {
        if self.closed {
            return PointEffect::Ignored;
        }
        if self.would_close(&point) {
            self.closed = true;
            return PointEffect::Closed;
        }
        self.vertices.push(point);
        PointEffect::Appended
    }

    fn revert_point(&mut self, effect: &PointEffect) {
        match effect {
            PointEffect::Closed => self.closed = false,
            PointEffect::Appended => {
                self.vertices.pop();
            }
            PointEffect::Committed { .. } | PointEffect::Ignored => {}
        }
    }

    fn move_vertex(&mut self, index: usize, to: Point) -> Option<Point> {
        let vertex = self.vertices.get_mut(index)?;
        Some(std::mem::replace(vertex, to))
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn contains(&self, point: &Point) -> bool {
        if self.closed && self.vertices.len() >= 3 && point_in_polygon(point, &self.vertices) {
            return true;
        }
        self.edges()
            .iter()
            .any(|(a, b)| distance_to_segment(point, *a, *b) <= HIT_RADIUS)
    }
}

/// Two-corner box. Corner 0 is the anchor placed on press, corner 1 follows
/// the pointer until the box is committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxGeometry {
    pub corners: [Point; 2],
    pub closed: bool,
}

impl BoxGeometry {
    pub fn new(anchor: Point) -> Self {
        Self {
            corners: [anchor, anchor],
            closed: false,
        }
    }

    /// Finished box spanning `rect`.
    pub fn from_rect(rect: Rect) -> Self {
        Self {
            corners: [rect.top_left(), rect.bottom_right()],
            closed: true,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::from_corners(self.corners[0], self.corners[1])
    }

    /// Finished box with zero area.
    pub fn is_degenerate(&self) -> bool {
        self.closed && self.rect().is_degenerate()
    }
}

impl ShapeGeometry for BoxGeometry {
    fn kind(&self) -> ShapeKind {
        ShapeKind::Box
    }

    fn points(&self) -> Vec<Point> {
        self.corners.to_vec()
    }

    fn bounding_rect(&self) -> Option<Rect> {
        Some(self.rect())
    }

    fn apply_point(&mut self, point: Point) -> PointEffect {
        if self.closed {
            return PointEffect::Ignored;
        }
        let previous = self.corners;
        let rect = Rect::from_corners(self.corners[0], point);
        self.corners = [rect.top_left(), rect.bottom_right()];
        self.closed = true;
        PointEffect::Committed { previous }
    }

    fn revert_point(&mut self, effect: &PointEffect) {
        if let PointEffect::Committed { previous } = effect {
            self.corners = *previous;
            self.closed = false;
        }
    }

    fn move_vertex(&mut self, index: usize, to: Point) -> Option<Point> {
        let corner = self.corners.get_mut(index)?;
        Some(std::mem::replace(corner, to))
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn contains(&self, point: &Point) -> bool {
        self.rect().contains(point)
    }
}

/// Tagged shape payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Geometry {
    Path(PathGeometry),
    Polygon(PolygonGeometry),
    Box(BoxGeometry),
}

impl Geometry {
    /// Fresh geometry of `kind` seeded at `origin`.
    pub fn seed(kind: ShapeKind, origin: Point, radius: f32, close_threshold: f32) -> Self {
        match kind {
            ShapeKind::Path => Geometry::Path(PathGeometry::new(origin, radius)),
            ShapeKind::Polygon => Geometry::Polygon(
                PolygonGeometry::new(origin).with_close_threshold(close_threshold),
            ),
            ShapeKind::Box => Geometry::Box(BoxGeometry::new(origin)),
        }
    }

    fn inner(&self) -> &dyn ShapeGeometry {
        match self {
            Geometry::Path(g) => g,
            Geometry::Polygon(g) => g,
            Geometry::Box(g) => g,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn ShapeGeometry {
        match self {
            Geometry::Path(g) => g,
            Geometry::Polygon(g) => g,
            Geometry::Box(g) => g,
        }
    }

    /// Zero-length path or finished zero-area box.
    pub fn is_degenerate(&self) -> bool {
        match self {
            Geometry::Path(p) => p.is_zero_length(),
            Geometry::Polygon(_) => false,
            Geometry::Box(b) => b.is_degenerate(),
        }
    }

    /// First point of the geometry, used for display names.
    pub fn origin(&self) -> Point {
        self.points().first().copied().unwrap_or_default()
    }
}

impl ShapeGeometry for Geometry {
    fn kind(&self) -> ShapeKind {
        self.inner().kind()
    }

    fn points(&self) -> Vec<Point> {
        self.inner().points()
    }

    fn bounding_rect(&self) -> Option<Rect> {
        self.inner().bounding_rect()
    }

    fn apply_point(&mut self, point: Point) -> PointEffect {
        self.inner_mut().apply_point(point)
    }

    fn revert_point(&mut self, effect: &PointEffect) {
        self.inner_mut().revert_point(effect)
    }

    fn move_vertex(&mut self, index: usize, to: Point) -> Option<Point> {
        self.inner_mut().move_vertex(index, to)
    }

    fn is_closed(&self) -> bool {
        self.inner().is_closed()
    }

    fn contains(&self, point: &Point) -> bool {
        self.inner().contains(point)
    }
}

/// Display name derived from the creation point, e.g. `Path at (120, 340)`.
pub fn display_name(kind: ShapeKind, origin: Point) -> String {
    format!(
        "{} at ({}, {})",
        kind.name(),
        origin.x.round() as i64,
        origin.y.round() as i64
    )
}

fn distance_to_segment(p: &Point, a: Point, b: Point) -> f32 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return p.distance_to(&a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance_to(&Point::new(a.x + t * dx, a.y + t * dy))
}

/// Ray casting point-in-polygon test.
fn point_in_polygon(point: &Point, vertices: &[Point]) -> bool {
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (vi, vj) = (vertices[i], vertices[j]);
        if ((vi.y > point.y) != (vj.y > point.y))
            && (point.x < (vj.x - vi.x) * (point.y - vi.y) / (vj.y - vi.y) + vi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_polygon() -> PolygonGeometry {
        let mut poly = PolygonGeometry::new(Point::new(0.0, 0.0));
        poly.apply_point(Point::new(100.0, 0.0));
        poly.apply_point(Point::new(100.0, 100.0));
        poly.apply_point(Point::new(0.0, 100.0));
        poly
    }

    #[test]
    fn test_polygon_closes_near_first_vertex() {
        let mut poly = square_polygon();
        let effect = poly.apply_point(Point::new(5.0, 8.0));

        assert_eq!(effect, PointEffect::Closed);
        assert!(poly.is_closed());
        assert_eq!(poly.vertices.len(), 4);
        assert_eq!(poly.vertices[0], Point::new(0.0, 0.0));
    }

    #[test]
    fn test_polygon_needs_two_vertices_to_close() {
        let mut poly = PolygonGeometry::new(Point::new(0.0, 0.0));
        assert_eq!(poly.apply_point(Point::new(3.0, 3.0)), PointEffect::Appended);
        assert!(!poly.is_closed());
        assert_eq!(poly.vertices.len(), 2);
    }

    #[test]
    fn test_polygon_far_click_keeps_accumulating() {
        let mut poly = square_polygon();
        for i in 0..50 {
            poly.apply_point(Point::new(200.0 + i as f32, 300.0));
        }
        assert!(!poly.is_closed());
        assert_eq!(poly.vertices.len(), 54);
    }

    #[test]
    fn test_polygon_revert_close_reopens() {
        let mut poly = square_polygon();
        let effect = poly.apply_point(Point::new(1.0, 1.0));
        poly.revert_point(&effect);
        assert!(!poly.is_closed());
        assert_eq!(poly.vertices.len(), 4);

        let effect = poly.apply_point(Point::new(50.0, 200.0));
        poly.revert_point(&effect);
        assert_eq!(poly, square_polygon());
    }

    #[test]
    fn test_polygon_contains() {
        let mut poly = square_polygon();
        poly.apply_point(Point::new(0.0, 0.0));
        assert!(poly.contains(&Point::new(50.0, 50.0)));
        assert!(!poly.contains(&Point::new(150.0, 50.0)));
    }

    #[test]
    fn test_box_commit_normalizes() {
        let mut b = BoxGeometry::new(Point::new(50.0, 80.0));
        b.move_vertex(1, Point::new(20.0, 20.0));
        let effect = b.apply_point(Point::new(10.0, 10.0));

        assert!(b.is_closed());
        assert_eq!(b.corners, [Point::new(10.0, 10.0), Point::new(50.0, 80.0)]);

        b.revert_point(&effect);
        assert!(!b.is_closed());
        assert_eq!(b.corners, [Point::new(50.0, 80.0), Point::new(20.0, 20.0)]);
    }

    #[test]
    fn test_box_degenerate() {
        let mut b = BoxGeometry::new(Point::new(10.0, 10.0));
        assert!(!b.is_degenerate(), "open boxes are never flagged");
        b.apply_point(Point::new(10.0, 40.0));
        assert!(b.is_degenerate());
    }

    #[test]
    fn test_path_bounds_are_stroked() {
        let mut path = PathGeometry::new(Point::new(10.0, 10.0), 3.0);
        path.apply_point(Point::new(20.0, 30.0));
        assert_eq!(path.bounding_rect(), Some(Rect::new(7.0, 7.0, 16.0, 26.0)));
    }

    #[test]
    fn test_path_zero_length() {
        let mut path = PathGeometry::new(Point::new(1.0, 1.0), 2.0);
        assert!(path.is_zero_length());
        path.apply_point(Point::new(1.0, 1.0));
        assert!(path.is_zero_length());
        path.apply_point(Point::new(2.0, 1.0));
        assert!(!path.is_zero_length());
    }

    #[test]
    fn test_path_revert_is_exact() {
        let mut path = PathGeometry::new(Point::new(0.0, 0.0), 2.0);
        path.apply_point(Point::new(5.0, 5.0));
        let before = path.clone();
        let effect = path.apply_point(Point::new(9.0, 1.0));
        path.revert_point(&effect);
        assert_eq!(path, before);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(
            display_name(ShapeKind::Path, Point::new(120.4, 339.6)),
            "Path at (120, 340)"
        );
    }

    #[test]
    fn test_geometry_serde_tag() {
        let geometry = Geometry::Box(BoxGeometry::from_rect(Rect::new(1.0, 2.0, 3.0, 4.0)));
        let json = serde_json::to_string(&geometry).expect("serialize");
        assert!(json.contains("\"type\":\"box\""));
        let back: Geometry = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, geometry);
    }
}
