//! Interactive tool state machine.
//!
//! One tool is active at a time. Pointer events arrive in screen coordinates,
//! are mapped into the scene through the view transform, and each tool turns
//! its press/move/release sequence into shape commands on a [`ToolContext`].
//!
//! | Tool    | Press            | Move            | Release                    |
//! |---------|------------------|-----------------|----------------------------|
//! | Pan     | start drag       | pan view        | end drag                   |
//! | Lasso   | anchor rectangle | track rectangle | select (click or rect)     |
//! | Path    | group + Create   | Extend          | end group, unravel if dot  |
//! | Polygon | Create / Extend  |                 |                            |
//! | Box     | Create           | Move corner 1   | Extend (commit, normalize) |
//!
//! Wheel events zoom the view for Pan and Lasso and change the brush radius
//! for the drawing tools.

use crate::config::DrawingConfig;
use crate::model::{Geometry, Point, Rect, ShapeGeometry, ShapeKind};
use crate::scene::GraphicId;
use crate::view::ViewTransform;

/// The active interaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tool {
    /// Idle: drag pans, wheel zooms
    #[default]
    Pan,
    Lasso,
    Path,
    Polygon,
    Box,
}

impl Tool {
    /// Shape kind drawn by this tool, if any.
    pub fn shape_kind(&self) -> Option<ShapeKind> {
        match self {
            Tool::Pan | Tool::Lasso => None,
            Tool::Path => Some(ShapeKind::Path),
            Tool::Polygon => Some(ShapeKind::Polygon),
            Tool::Box => Some(ShapeKind::Box),
        }
    }

    pub fn is_drawing(&self) -> bool {
        self.shape_kind().is_some()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tool::Pan => "Pan",
            Tool::Lasso => "Lasso",
            Tool::Path => "Path",
            Tool::Polygon => "Polygon",
            Tool::Box => "Box",
        }
    }
}

/// Pointer input in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Press(Point),
    Move(Point),
    Release(Point),
    /// Positive `delta` is away from the user (zoom in / grow brush)
    Wheel { at: Point, delta: f32 },
}

/// What a pointer event did, for the host to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResponse {
    None,
    ShapeStarted(GraphicId),
    ShapeExtended(GraphicId),
    ShapeFinished(GraphicId),
    /// The in-progress shape was unraveled
    ShapeDiscarded(GraphicId),
    Selected(Vec<GraphicId>),
    ViewChanged,
    BrushChanged(f32),
}

/// Operations the tools drive. Implemented by the editing session, which
/// routes them through the active command log and the synchronizer.
pub trait ToolContext {
    /// Create a shape of `kind` at `at` under the current label.
    /// Returns `None` when no shape can be created (e.g. no label).
    fn begin_shape(&mut self, kind: ShapeKind, at: Point, radius: f32) -> Option<GraphicId>;

    fn extend_shape(&mut self, graphic: GraphicId, at: Point);

    fn move_vertex(&mut self, graphic: GraphicId, vertex: usize, to: Point);

    fn geometry(&self, graphic: GraphicId) -> Option<&Geometry>;

    /// Start grouping subsequent commands into one undo step.
    fn begin_group(&mut self);

    fn end_group(&mut self);

    /// Remove every trace of `graphic` from the log and the scene.
    fn unravel(&mut self, graphic: GraphicId);

    fn select_at(&mut self, at: Point) -> Vec<GraphicId>;

    fn select_in_rect(&mut self, rect: Rect) -> Vec<GraphicId>;
}

/// In-flight gesture of the active tool.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
enum Gesture {
    #[default]
    Idle,
    Panning {
        last: Point,
    },
    Lasso {
        origin: Point,
    },
    Stroke {
        graphic: GraphicId,
        last: Point,
    },
    Polygon {
        graphic: GraphicId,
    },
    BoxDrag {
        graphic: GraphicId,
    },
}

/// Drives the active tool's gesture state.
#[derive(Debug, Clone)]
pub struct ToolController {
    tool: Tool,
    gesture: Gesture,
    view: ViewTransform,
    brush_radius: f32,
    drawing: DrawingConfig,
}

impl ToolController {
    pub fn new(drawing: DrawingConfig) -> Self {
        Self {
            tool: Tool::default(),
            gesture: Gesture::Idle,
            view: ViewTransform::identity(),
            brush_radius: drawing.clamp_brush(drawing.brush_radius),
            drawing,
        }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn view(&self) -> ViewTransform {
        self.view
    }

    pub fn brush_radius(&self) -> f32 {
        self.brush_radius
    }

    /// Shape currently being drawn, if any.
    pub fn in_progress(&self) -> Option<GraphicId> {
        match self.gesture {
            Gesture::Stroke { graphic, .. }
            | Gesture::Polygon { graphic }
            | Gesture::BoxDrag { graphic } => Some(graphic),
            Gesture::Idle | Gesture::Panning { .. } | Gesture::Lasso { .. } => None,
        }
    }

    /// Switch tools. An in-progress shape is unraveled first.
    pub fn select_tool(&mut self, tool: Tool, ctx: &mut impl ToolContext) -> ToolResponse {
        let response = self.cancel(ctx);
        if self.tool != tool {
            log::debug!("Tool: {} -> {}", self.tool.name(), tool.name());
            self.tool = tool;
        }
        response
    }

    /// Abandon the current gesture. A half-drawn shape is unraveled, as if
    /// it had never been started.
    pub fn cancel(&mut self, ctx: &mut impl ToolContext) -> ToolResponse {
        let gesture = std::mem::take(&mut self.gesture);
        match gesture {
            Gesture::Stroke { graphic, .. } => {
                ctx.end_group();
                self.discard(graphic, ctx)
            }
            Gesture::Polygon { graphic } | Gesture::BoxDrag { graphic } => {
                if ctx.geometry(graphic).is_some_and(ShapeGeometry::is_closed) {
                    ToolResponse::None
                } else {
                    self.discard(graphic, ctx)
                }
            }
            Gesture::Idle | Gesture::Panning { .. } | Gesture::Lasso { .. } => ToolResponse::None,
        }
    }

    /// Drop a gesture whose shape no longer exists, e.g. after its Create
    /// was undone.
    pub fn reconcile(&mut self, ctx: &impl ToolContext) {
        if let Some(graphic) = self.in_progress() {
            if ctx.geometry(graphic).is_none() {
                log::debug!("Tool: {} vanished, gesture reset", graphic);
                self.gesture = Gesture::Idle;
            }
        }
    }

    fn discard(&self, graphic: GraphicId, ctx: &mut impl ToolContext) -> ToolResponse {
        log::debug!("Tool: unraveling unfinished {}", graphic);
        ctx.unravel(graphic);
        ToolResponse::ShapeDiscarded(graphic)
    }

    /// Feed one pointer event to the active tool.
    pub fn handle(&mut self, event: PointerEvent, ctx: &mut impl ToolContext) -> ToolResponse {
        if let PointerEvent::Wheel { at, delta } = event {
            return self.wheel(at, delta);
        }
        match self.tool {
            Tool::Pan => self.pan(event),
            Tool::Lasso => self.lasso(event, ctx),
            Tool::Path => self.path(event, ctx),
            Tool::Polygon => self.polygon(event, ctx),
            Tool::Box => self.boxed(event, ctx),
        }
    }

    fn wheel(&mut self, at: Point, delta: f32) -> ToolResponse {
        if self.tool.is_drawing() {
            let radius = self
                .drawing
                .clamp_brush(self.brush_radius + delta * self.drawing.brush_wheel_step);
            if radius == self.brush_radius {
                return ToolResponse::None;
            }
            self.brush_radius = radius;
            log::trace!("Tool: brush radius {}", radius);
            ToolResponse::BrushChanged(radius)
        } else {
            self.view = self.view.zoom_steps(delta, at);
            ToolResponse::ViewChanged
        }
    }

    fn pan(&mut self, event: PointerEvent) -> ToolResponse {
        match (event, self.gesture) {
            (PointerEvent::Press(at), _) => {
                self.gesture = Gesture::Panning { last: at };
                ToolResponse::None
            }
            (PointerEvent::Move(at), Gesture::Panning { last }) => {
                self.view = self.view.pan_by(at.x - last.x, at.y - last.y);
                self.gesture = Gesture::Panning { last: at };
                ToolResponse::ViewChanged
            }
            (PointerEvent::Release(_), _) => {
                self.gesture = Gesture::Idle;
                ToolResponse::None
            }
            _ => ToolResponse::None,
        }
    }

    fn lasso(&mut self, event: PointerEvent, ctx: &mut impl ToolContext) -> ToolResponse {
        match (event, self.gesture) {
            (PointerEvent::Press(at), _) => {
                self.gesture = Gesture::Lasso {
                    origin: self.view.to_scene(at),
                };
                ToolResponse::None
            }
            (PointerEvent::Release(at), Gesture::Lasso { origin }) => {
                self.gesture = Gesture::Idle;
                let end = self.view.to_scene(at);
                // Drag length is judged on screen so zoom doesn't change it
                let dragged = origin.distance_to(&end) * self.view.zoom;
                let selected = if dragged < self.drawing.lasso_min_drag {
                    ctx.select_at(end)
                } else {
                    ctx.select_in_rect(Rect::from_corners(origin, end))
                };
                ToolResponse::Selected(selected)
            }
            _ => ToolResponse::None,
        }
    }

    fn path(&mut self, event: PointerEvent, ctx: &mut impl ToolContext) -> ToolResponse {
        match (event, self.gesture) {
            (PointerEvent::Press(at), Gesture::Idle) => {
                let at = self.view.to_scene(at);
                ctx.begin_group();
                match ctx.begin_shape(ShapeKind::Path, at, self.brush_radius) {
                    Some(graphic) => {
                        self.gesture = Gesture::Stroke { graphic, last: at };
                        ToolResponse::ShapeStarted(graphic)
                    }
                    None => {
                        ctx.end_group();
                        ToolResponse::None
                    }
                }
            }
            (PointerEvent::Move(at), Gesture::Stroke { graphic, last }) => {
                let at = self.view.to_scene(at);
                if at == last {
                    return ToolResponse::None;
                }
                ctx.extend_shape(graphic, at);
                self.gesture = Gesture::Stroke { graphic, last: at };
                ToolResponse::ShapeExtended(graphic)
            }
            (PointerEvent::Release(at), Gesture::Stroke { graphic, last }) => {
                let at = self.view.to_scene(at);
                if at != last {
                    ctx.extend_shape(graphic, at);
                }
                ctx.end_group();
                self.gesture = Gesture::Idle;
                if ctx.geometry(graphic).is_none_or(Geometry::is_degenerate) {
                    // Press and release without movement: accidental click
                    self.discard(graphic, ctx)
                } else {
                    ToolResponse::ShapeFinished(graphic)
                }
            }
            _ => ToolResponse::None,
        }
    }

    fn polygon(&mut self, event: PointerEvent, ctx: &mut impl ToolContext) -> ToolResponse {
        let PointerEvent::Press(at) = event else {
            return ToolResponse::None;
        };
        let at = self.view.to_scene(at);
        match self.gesture {
            Gesture::Polygon { graphic } if ctx.geometry(graphic).is_some() => {
                ctx.extend_shape(graphic, at);
                if ctx.geometry(graphic).is_some_and(ShapeGeometry::is_closed) {
                    self.gesture = Gesture::Idle;
                    log::debug!("Tool: polygon {} closed", graphic);
                    ToolResponse::ShapeFinished(graphic)
                } else {
                    ToolResponse::ShapeExtended(graphic)
                }
            }
            _ => match ctx.begin_shape(ShapeKind::Polygon, at, self.brush_radius) {
                Some(graphic) => {
                    self.gesture = Gesture::Polygon { graphic };
                    ToolResponse::ShapeStarted(graphic)
                }
                None => {
                    self.gesture = Gesture::Idle;
                    ToolResponse::None
                }
            },
        }
    }

    fn boxed(&mut self, event: PointerEvent, ctx: &mut impl ToolContext) -> ToolResponse {
        match (event, self.gesture) {
            (PointerEvent::Press(at), Gesture::Idle) => {
                let at = self.view.to_scene(at);
                match ctx.begin_shape(ShapeKind::Box, at, self.brush_radius) {
                    Some(graphic) => {
                        self.gesture = Gesture::BoxDrag { graphic };
                        ToolResponse::ShapeStarted(graphic)
                    }
                    None => ToolResponse::None,
                }
            }
            (PointerEvent::Move(at), Gesture::BoxDrag { graphic }) => {
                ctx.move_vertex(graphic, 1, self.view.to_scene(at));
                ToolResponse::ShapeExtended(graphic)
            }
            (PointerEvent::Release(at), Gesture::BoxDrag { graphic }) => {
                ctx.extend_shape(graphic, self.view.to_scene(at));
                self.gesture = Gesture::Idle;
                if ctx.geometry(graphic).is_some_and(Geometry::is_degenerate) {
                    log::warn!("Tool: {} is a zero-area box, flagged for correction", graphic);
                }
                ToolResponse::ShapeFinished(graphic)
            }
            _ => ToolResponse::None,
        }
    }
}

impl Default for ToolController {
    fn default() -> Self {
        Self::new(DrawingConfig::default())
    }
}
