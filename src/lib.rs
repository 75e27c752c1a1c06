//! annoscene - image annotation core
//!
//! A label → shape annotation hierarchy kept in sync, in both directions,
//! with an interactive scene of drawable shapes. Shape edits go through
//! per-image undo logs driven by a tool state machine, and the result can be
//! exported to Pascal VOC, YOLO and pixel masks or saved as a project file.
//!
//! A GUI host drives everything through [`AnnotationSession`]: it feeds
//! pointer events, calls node edits from its tree view and redraws from the
//! [`SyncEvent`]s it drains.

pub mod catalog;
pub mod color_utils;
pub mod config;
pub mod constants;
pub mod format;
pub mod model;
pub mod scene;
pub mod session;
pub mod sync;
pub mod tools;
pub mod undo;
pub mod view;

pub use catalog::ImageCatalog;
pub use config::AppConfig;
pub use session::{AnnotationSession, SessionError, UnsavedPolicy};
pub use sync::{SyncEvent, Synchronizer};
pub use tools::{PointerEvent, Tool, ToolResponse};
