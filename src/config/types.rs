//! Preference type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::defaults::*;

/// Persisted user preferences.
///
/// Every field is optional on disk; getters supply defaults and clamp values
/// into the range the settings UI allows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// Folder to watch (default: the platform Downloads folder). `~` is expanded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitored_path: Option<String>,
    /// Seconds before an open shelf is closed automatically (default: 30, range 5-120)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_close_duration_seconds: Option<f64>,
    /// Post a notification when an item is added or removed (default: false)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications_enabled: Option<bool>,
    /// Read by the menu bar surface only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_menu_bar_icon: Option<bool>,
    /// Bundle identifier of the shelf application
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shelf_bundle_id: Option<String>,
    /// Services menu entry used for the hand-off
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shelf_service_name: Option<String>,
    /// Wait between hand-off and window recapture (ms, default: 100, range 20-2000)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_settle_delay_ms: Option<u64>,
}

impl Preferences {
    /// Returns the folder to watch.
    ///
    /// None when no path is configured and the platform Downloads folder
    /// cannot be resolved; callers treat that as fatal.
    pub fn get_monitored_path(&self) -> Option<PathBuf> {
        match self.monitored_path.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => {
                Some(PathBuf::from(shellexpand::tilde(path).as_ref()))
            }
            _ => dirs::download_dir(),
        }
    }

    /// Returns the auto-close timeout, clamped to 5-120 seconds
    pub fn get_auto_close_duration(&self) -> Duration {
        let secs = self
            .auto_close_duration_seconds
            .filter(|s| s.is_finite())
            .unwrap_or(DEFAULT_AUTO_CLOSE_DURATION_SECS)
            .clamp(MIN_AUTO_CLOSE_DURATION_SECS, MAX_AUTO_CLOSE_DURATION_SECS);
        Duration::from_secs_f64(secs)
    }

    pub fn notifications_enabled(&self) -> bool {
        self.notifications_enabled
            .unwrap_or(DEFAULT_NOTIFICATIONS_ENABLED)
    }

    pub fn show_menu_bar_icon(&self) -> bool {
        self.show_menu_bar_icon.unwrap_or(DEFAULT_SHOW_MENU_BAR_ICON)
    }

    pub fn get_shelf_bundle_id(&self) -> String {
        self.shelf_bundle_id
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SHELF_BUNDLE_ID.to_string())
    }

    pub fn get_shelf_service_name(&self) -> String {
        self.shelf_service_name
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SHELF_SERVICE_NAME.to_string())
    }

    /// Returns the hand-off settle delay, clamped to 20-2000 ms
    pub fn get_window_settle_delay(&self) -> Duration {
        let ms = self
            .window_settle_delay_ms
            .unwrap_or(DEFAULT_WINDOW_SETTLE_DELAY_MS)
            .clamp(MIN_WINDOW_SETTLE_DELAY_MS, MAX_WINDOW_SETTLE_DELAY_MS);
        Duration::from_millis(ms)
    }

    /// Every field filled in with the value actually in effect
    pub fn resolved(&self) -> Preferences {
        Preferences {
            monitored_path: self
                .get_monitored_path()
                .map(|p| p.to_string_lossy().into_owned()),
            auto_close_duration_seconds: Some(self.get_auto_close_duration().as_secs_f64()),
            notifications_enabled: Some(self.notifications_enabled()),
            show_menu_bar_icon: Some(self.show_menu_bar_icon()),
            shelf_bundle_id: Some(self.get_shelf_bundle_id()),
            shelf_service_name: Some(self.get_shelf_service_name()),
            window_settle_delay_ms: Some(self.get_window_settle_delay().as_millis() as u64),
        }
    }
}
