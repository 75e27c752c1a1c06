//! Configuration file support.
//!
//! Settings are plain serde structs passed by value into the session; there
//! is no global configuration state. Every section has serde defaults so an
//! older or partial file still loads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::color_utils::{Color, default_palette, palette_color};
use crate::constants::{
    BRUSH_WHEEL_STEP, DEFAULT_BRUSH_RADIUS, DEFAULT_IMAGE_EXTENSIONS, DEFAULT_MAX_HISTORY,
    LASSO_MIN_DRAG, MAX_BRUSH_RADIUS, MIN_BRUSH_RADIUS, POLYGON_CLOSE_THRESHOLD,
};
use crate::undo::UndoConfig;

/// Log level setting for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    /// Get the display name for this log level.
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Error => "Error",
            LogLevel::Warn => "Warn",
            LogLevel::Info => "Info",
            LogLevel::Debug => "Debug",
            LogLevel::Trace => "Trace",
        }
    }

    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version of the configuration file format
    pub version: u32,

    /// Application name (for identification)
    #[serde(default = "default_app_name")]
    pub app_name: String,

    #[serde(default)]
    pub preferences: UserPreferences,

    #[serde(default)]
    pub drawing: DrawingConfig,

    /// Ordered label color table; label N gets entry `N % len`.
    #[serde(default = "default_palette")]
    pub palette: Vec<[u8; 3]>,

    #[serde(default)]
    pub history: HistoryConfig,

    /// Raster extensions listed by the image catalog (lowercase, no dot).
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

fn default_app_name() -> String {
    "annoscene".to_string()
}

fn default_image_extensions() -> Vec<String> {
    DEFAULT_IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

/// User preferences section of the config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Log verbosity level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Save the project automatically after edits
    #[serde(default = "default_autosave_enabled")]
    pub autosave_enabled: bool,

    /// Seconds to wait after the last edit before auto-saving
    #[serde(default = "default_autosave_debounce")]
    pub autosave_debounce_secs: u64,

    /// Minimum seconds between two auto-saves
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval_secs: u64,

    /// Default export folder path
    #[serde(default)]
    pub export_folder: String,
}

fn default_autosave_enabled() -> bool {
    true
}

fn default_autosave_debounce() -> u64 {
    5
}

fn default_autosave_interval() -> u64 {
    60
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            autosave_enabled: default_autosave_enabled(),
            autosave_debounce_secs: default_autosave_debounce(),
            autosave_interval_secs: default_autosave_interval(),
            export_folder: String::new(),
        }
    }
}

impl UserPreferences {
    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_secs(self.autosave_debounce_secs)
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }
}

/// Drawing tool parameters, in scene pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawingConfig {
    /// Distance within which a polygon click snaps onto the first vertex
    pub polygon_close_threshold: f32,
    /// Initial brush radius for freehand paths
    pub brush_radius: f32,
    pub min_brush_radius: f32,
    pub max_brush_radius: f32,
    /// Brush radius change per wheel notch
    pub brush_wheel_step: f32,
    /// Lasso drags shorter than this select by click instead of rectangle
    pub lasso_min_drag: f32,
}

impl Default for DrawingConfig {
    fn default() -> Self {
        Self {
            polygon_close_threshold: POLYGON_CLOSE_THRESHOLD,
            brush_radius: DEFAULT_BRUSH_RADIUS,
            min_brush_radius: MIN_BRUSH_RADIUS,
            max_brush_radius: MAX_BRUSH_RADIUS,
            brush_wheel_step: BRUSH_WHEEL_STEP,
            lasso_min_drag: LASSO_MIN_DRAG,
        }
    }
}

impl DrawingConfig {
    pub fn clamp_brush(&self, radius: f32) -> f32 {
        radius.clamp(self.min_brush_radius, self.max_brush_radius.max(self.min_brush_radius))
    }
}

/// Undo history section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Commands kept per image before the oldest shapes are dropped
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
        }
    }
}

impl AppConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            app_name: default_app_name(),
            preferences: UserPreferences::default(),
            drawing: DrawingConfig::default(),
            palette: default_palette(),
            history: HistoryConfig::default(),
            image_extensions: default_image_extensions(),
        }
    }

    /// Color for the label created `index`-th in the session.
    pub fn label_color(&self, index: usize) -> Color {
        palette_color(&self.palette, index)
    }

    pub fn undo_config(&self) -> UndoConfig {
        UndoConfig {
            max_history: self.history.max_history.max(1),
        }
    }

    /// Whether `path` has one of the configured raster extensions.
    pub fn is_supported_image(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.image_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;

        // Validate version compatibility
        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }

        Ok(config)
    }

    /// Get the default filename for the config file.
    pub fn default_filename() -> &'static str {
        "annoscene-config.json"
    }

    /// Get the default config file path for auto-load/save.
    pub fn default_path() -> Option<PathBuf> {
        // Try to use XDG config directory, fall back to home directory
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("annoscene").join(Self::default_filename()))
        } else {
            dirs::home_dir().map(|home| {
                home.join(".config")
                    .join("annoscene")
                    .join(Self::default_filename())
            })
        }
    }

    /// Load configuration from an explicit file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to an explicit file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Try to load configuration from the default path.
    /// Returns None if the file doesn't exist or can't be read.
    pub fn load_from_default_path() -> Option<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            log::debug!("No config file found at {:?}", path);
            return None;
        }

        match Self::load(&path) {
            Ok(config) => Some(config),
            Err(e) => {
                log::warn!("Failed to load config file {:?}: {}", path, e);
                None
            }
        }
    }

    /// Load from `path` if given, else from the default path, falling back
    /// to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let loaded = match path {
            Some(path) => Self::load(path)
                .map_err(|e| log::warn!("Failed to load config file {:?}: {}", path, e))
                .ok(),
            None => Self::load_from_default_path(),
        };
        loaded.unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Configuration version is newer than supported
    #[error(
        "Configuration file version {file_version} is newer than supported version {supported_version}"
    )]
    VersionTooNew {
        file_version: u32,
        supported_version: u32,
    },

    /// I/O error when reading/writing config
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
