//! Global constants for the annotation core

/// Distance (scene pixels) within which a polygon click snaps onto the first vertex.
pub const POLYGON_CLOSE_THRESHOLD: f32 = 20.0;

/// Vertices a polygon needs before a click near the first vertex may close it.
pub const POLYGON_CLOSE_MIN_VERTICES: usize = 2;

/// Default brush (stroke) radius for freehand paths.
pub const DEFAULT_BRUSH_RADIUS: f32 = 4.0;

/// Smallest allowed brush radius.
pub const MIN_BRUSH_RADIUS: f32 = 1.0;

/// Largest allowed brush radius.
pub const MAX_BRUSH_RADIUS: f32 = 64.0;

/// Brush radius change per wheel notch.
pub const BRUSH_WHEEL_STEP: f32 = 1.0;

/// Minimum lasso drag distance before a press counts as a rectangle selection.
pub const LASSO_MIN_DRAG: f32 = 2.0;

/// Hit radius for picking graphics under the cursor (scene pixels).
pub const HIT_RADIUS: f32 = 5.0;

/// Zoom limits for the pan tool.
pub const MIN_ZOOM: f32 = 0.1;
pub const MAX_ZOOM: f32 = 50.0;

/// Zoom factor per wheel notch.
pub const ZOOM_STEP: f32 = 1.1;

/// Default number of undo entries kept per image.
pub const DEFAULT_MAX_HISTORY: usize = 500;

/// Raster extensions enumerated by the image catalog.
pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];
