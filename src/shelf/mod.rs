//! External shelf lifecycle
//!
//! Hands new files to the shelf application, finds the window it opens and
//! makes sure that window is closed again.

mod manager;
mod platform;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(test)]
pub(crate) mod fake;

pub use manager::{CloseReason, ItemPhase, ShelfId, ShelfManager, ShelfSettings, ShelfSummary};
pub use platform::ShelfPlatform;

#[cfg(target_os = "macos")]
pub use macos::{is_shelf_app_running, AxWindow, MacShelfPlatform};
