//! Preferences loading and saving
//!
//! Preferences live in a single JSON file. A missing file means defaults;
//! a malformed file is logged and also yields defaults so the app still starts.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use super::defaults::{APP_DIR_NAME, PREFERENCES_FILE_NAME};
use super::types::Preferences;
use crate::error::{AutoShelfError, Result};

/// ~/Library/Application Support/AutoShelf/preferences.json on macOS
pub fn default_preferences_path() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
        .join(PREFERENCES_FILE_NAME)
}

/// Load preferences from `path`.
///
/// Returns `Preferences::default()` if the file is missing, unreadable or
/// not valid JSON.
#[instrument(name = "load_preferences", skip_all, fields(path = %path.display()))]
pub fn load_preferences(path: &Path) -> Preferences {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("Preferences file not found, using defaults");
            return Preferences::default();
        }
        Err(e) => {
            warn!(error = %e, "Failed to read preferences, using defaults");
            return Preferences::default();
        }
    };

    if contents.trim().is_empty() {
        return Preferences::default();
    }

    match serde_json::from_str::<Preferences>(&contents) {
        Ok(prefs) => {
            info!("Loaded preferences");
            prefs
        }
        Err(e) => {
            warn!(error = %e, "Failed to parse preferences JSON, using defaults");
            Preferences::default()
        }
    }
}

/// Write preferences as pretty JSON, creating the parent directory if needed
pub fn save_preferences(path: &Path, prefs: &Preferences) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AutoShelfError::Config(format!("cannot create {}: {}", parent.display(), e))
        })?;
    }

    let json = serde_json::to_string_pretty(prefs)
        .map_err(|e| AutoShelfError::Config(format!("cannot serialize preferences: {}", e)))?;

    fs::write(path, json)
        .map_err(|e| AutoShelfError::Config(format!("cannot write {}: {}", path.display(), e)))?;

    info!(path = %path.display(), "Saved preferences");
    Ok(())
}
