//! Configuration module - persisted user preferences
//!
//! This module provides functionality for:
//! - Loading and saving preferences from the AutoShelf config directory
//! - Default values and clamping for every preference
//! - Watching the preferences file for live updates
//!
//! # Module Structure
//!
//! - `defaults` - All default constant values
//! - `types` - `Preferences` definition and getters
//! - `loader` - File system loading and saving
//! - `watcher` - Live reload of the preferences file

mod defaults;
mod loader;
mod types;
mod watcher;

pub use defaults::{
    DEFAULT_AUTO_CLOSE_DURATION_SECS, DEFAULT_SHELF_BUNDLE_ID, DEFAULT_SHELF_SERVICE_NAME,
    DEFAULT_WINDOW_SETTLE_DELAY_MS, MAX_AUTO_CLOSE_DURATION_SECS, MIN_AUTO_CLOSE_DURATION_SECS,
};

pub use types::Preferences;

pub use loader::{default_preferences_path, load_preferences, save_preferences};

pub use watcher::{PreferencesReloadEvent, PreferencesWatcher};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
