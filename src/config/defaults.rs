//! Default preference values
//!
//! All constants used throughout the config module are defined here.

/// Auto-close timeout for a shelf window (seconds)
pub const DEFAULT_AUTO_CLOSE_DURATION_SECS: f64 = 30.0;

/// Bounds the settings UI allows for the auto-close timeout
pub const MIN_AUTO_CLOSE_DURATION_SECS: f64 = 5.0;
pub const MAX_AUTO_CLOSE_DURATION_SECS: f64 = 120.0;

/// Notifications are opt-in
pub const DEFAULT_NOTIFICATIONS_ENABLED: bool = false;

pub const DEFAULT_SHOW_MENU_BAR_ICON: bool = true;

/// Bundle identifier of the shelf application the hand-off targets
pub const DEFAULT_SHELF_BUNDLE_ID: &str = "com.pilotmoon.dropshelf";

/// Name of the Services menu entry the shelf application registers
pub const DEFAULT_SHELF_SERVICE_NAME: &str = "Send to Dropshelf";

/// Delay between hand-off and recapturing the shelf window list (milliseconds).
/// Best-effort: the shelf app gives no "window created" signal we can wait on.
pub const DEFAULT_WINDOW_SETTLE_DELAY_MS: u64 = 100;
pub const MIN_WINDOW_SETTLE_DELAY_MS: u64 = 20;
pub const MAX_WINDOW_SETTLE_DELAY_MS: u64 = 2000;

/// File name of the persisted preferences inside the config directory
pub const PREFERENCES_FILE_NAME: &str = "preferences.json";

/// Directory name under the platform config dir
pub const APP_DIR_NAME: &str = "AutoShelf";
