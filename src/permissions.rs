//! Accessibility permission checks
//!
//! Reading another application's windows needs the process to be trusted in
//! System Settings > Privacy & Security > Accessibility.

use tracing::info;

use crate::error::{AutoShelfError, Result};

#[cfg(target_os = "macos")]
use macos_accessibility_client::accessibility;
#[cfg(target_os = "macos")]
use tracing::{debug, instrument};

#[cfg(target_os = "macos")]
#[instrument]
pub fn has_accessibility_permission() -> bool {
    let result = accessibility::application_is_trusted();
    debug!(granted = result, "Checked accessibility permission");
    result
}

#[cfg(not(target_os = "macos"))]
pub fn has_accessibility_permission() -> bool {
    false
}

/// Show the system prompt if needed and return the current trust state
#[cfg(target_os = "macos")]
#[instrument]
pub fn request_accessibility_permission() -> bool {
    info!("Requesting accessibility permission");
    accessibility::application_is_trusted_with_prompt()
}

#[cfg(not(target_os = "macos"))]
pub fn request_accessibility_permission() -> bool {
    info!("Accessibility permission is only meaningful on macOS");
    false
}

/// Fail with `AccessibilityPermission` unless the process is trusted.
///
/// Prompts once when not yet trusted.
pub fn ensure_accessibility_permission() -> Result<()> {
    if !cfg!(target_os = "macos") {
        return Err(AutoShelfError::Unsupported("Accessibility access"));
    }
    if has_accessibility_permission() || request_accessibility_permission() {
        Ok(())
    } else {
        Err(AutoShelfError::AccessibilityPermission)
    }
}
