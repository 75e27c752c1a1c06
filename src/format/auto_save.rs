//! Auto-save scheduling for the session's project file.
//!
//! Saves are debounced after the last edit and rate limited by a minimum
//! interval, both taken from [`UserPreferences`].

use std::time::Duration;
use web_time::Instant;

use crate::config::UserPreferences;

/// Decides when the session should write its project file.
///
/// Two timers gate a save:
/// 1. **Debounce delay**: wait this long after the last edit so a burst of
///    strokes results in one save.
/// 2. **Minimum interval**: never save more often than this, even while
///    edits keep arriving.
#[derive(Debug)]
pub struct AutoSaveManager {
    save_interval: Duration,
    debounce_delay: Duration,
    last_save: Option<Instant>,
    last_change: Option<Instant>,
    enabled: bool,
    dirty: bool,
}

impl AutoSaveManager {
    /// Default minimum interval between saves (60 seconds).
    pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(60);

    /// Default debounce delay (5 seconds).
    pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_secs(5);

    pub fn new() -> Self {
        Self {
            save_interval: Self::DEFAULT_SAVE_INTERVAL,
            debounce_delay: Self::DEFAULT_DEBOUNCE_DELAY,
            last_save: None,
            last_change: None,
            enabled: true,
            dirty: false,
        }
    }

    /// Timers and enable flag from user preferences.
    pub fn from_preferences(preferences: &UserPreferences) -> Self {
        let mut manager = Self::new()
            .with_save_interval(preferences.autosave_interval())
            .with_debounce_delay(preferences.autosave_debounce());
        manager.enabled = preferences.autosave_enabled;
        manager
    }

    pub fn disabled() -> Self {
        let mut manager = Self::new();
        manager.enabled = false;
        manager
    }

    pub fn with_save_interval(mut self, interval: Duration) -> Self {
        self.save_interval = interval;
        self
    }

    pub fn with_debounce_delay(mut self, delay: Duration) -> Self {
        self.debounce_delay = delay;
        self
    }

    /// Record an edit that needs saving.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.last_change = Some(Instant::now());
        log::trace!("Auto-save: marked dirty");
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// True when enabled, dirty, the debounce delay has passed since the last
    /// edit and the minimum interval has passed since the last save.
    pub fn should_save(&self) -> bool {
        if !self.enabled || !self.dirty {
            return false;
        }

        let Some(last_change) = self.last_change else {
            return false;
        };

        if last_change.elapsed() < self.debounce_delay {
            return false;
        }

        self.last_save
            .is_none_or(|last_save| last_save.elapsed() >= self.save_interval)
    }

    pub fn mark_saved(&mut self) {
        self.last_save = Some(Instant::now());
        self.dirty = false;
        self.last_change = None;
        log::trace!("Auto-save: marked saved");
    }

    /// A failed save stays dirty but waits a full interval before retrying.
    pub fn mark_save_failed(&mut self) {
        self.last_save = Some(Instant::now());
        log::trace!("Auto-save: marked save failed");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn reset(&mut self) {
        self.last_save = None;
        self.last_change = None;
        self.dirty = false;
    }
}

impl Default for AutoSaveManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let manager = AutoSaveManager::new();
        assert!(!manager.is_dirty());
        assert!(!manager.should_save());
        assert!(manager.is_enabled());
    }

    #[test]
    fn test_mark_saved_clears_dirty() {
        let mut manager = AutoSaveManager::new();
        manager.mark_dirty();
        assert!(manager.is_dirty());

        manager.mark_saved();
        assert!(!manager.is_dirty());
        assert!(!manager.should_save());
    }

    #[test]
    fn test_disabled() {
        let mut manager = AutoSaveManager::disabled();
        manager.mark_dirty();
        assert!(!manager.should_save());
    }

    #[test]
    fn test_debounce_prevents_immediate_save() {
        let mut manager = AutoSaveManager::new()
            .with_debounce_delay(Duration::from_secs(10))
            .with_save_interval(Duration::ZERO);

        manager.mark_dirty();
        assert!(!manager.should_save());
    }

    #[test]
    fn test_zero_timers_save_immediately() {
        let mut manager = AutoSaveManager::new()
            .with_debounce_delay(Duration::ZERO)
            .with_save_interval(Duration::ZERO);

        manager.mark_dirty();
        assert!(manager.should_save());
    }

    #[test]
    fn test_interval_blocks_retry_after_failure() {
        let mut manager = AutoSaveManager::new()
            .with_debounce_delay(Duration::ZERO)
            .with_save_interval(Duration::from_secs(60));

        manager.mark_dirty();
        manager.mark_save_failed();
        assert!(manager.is_dirty());
        assert!(!manager.should_save());
    }

    #[test]
    fn test_from_preferences() {
        let mut preferences = UserPreferences::default();
        preferences.autosave_enabled = false;
        let manager = AutoSaveManager::from_preferences(&preferences);
        assert!(!manager.is_enabled());
    }
}
