//! User-facing notifications and alerts
//!
//! - **macOS**: `osascript` AppleScript `display notification` / `display alert`
//! - **elsewhere**: written to the log
//!
//! Delivery is fire-and-forget. Failures are logged and never reach the caller.

use std::path::Path;
use tracing::{info, warn};

use crate::detector::EntryKind;

/// Title and body of one desktop notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn item_added(path: &Path, kind: EntryKind) -> Self {
        let label = kind.label();
        Self {
            title: format!("New {} in Downloads", label),
            body: format!(
                "The {} '{}' has been added to {}",
                label,
                last_component(path),
                parent_name(path)
            ),
        }
    }

    pub fn item_deleted(path: &Path, kind: EntryKind) -> Self {
        let label = kind.label();
        Self {
            title: format!("{} Deleted from Downloads", label),
            body: format!(
                "The {} '{}' has been removed from {}",
                label,
                last_component(path),
                parent_name(path)
            ),
        }
    }
}

fn last_component(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn parent_name(path: &Path) -> String {
    path.parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Where notifications go
pub trait NotificationSink {
    fn deliver(&self, notification: &Notification);

    fn item_added(&self, path: &Path, kind: EntryKind) {
        self.deliver(&Notification::item_added(path, kind));
    }

    fn item_deleted(&self, path: &Path, kind: EntryKind) {
        self.deliver(&Notification::item_deleted(path, kind));
    }
}

/// Native desktop notifications on macOS, log lines elsewhere
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopNotifier;

impl NotificationSink for DesktopNotifier {
    fn deliver(&self, notification: &Notification) {
        #[cfg(target_os = "macos")]
        {
            let script = format!(
                r#"display notification "{}" with title "{}""#,
                escape_for_applescript(&notification.body),
                escape_for_applescript(&notification.title),
            );
            run_osascript(script);
        }

        #[cfg(not(target_os = "macos"))]
        info!(
            event_type = "notification",
            title = %notification.title,
            body = %notification.body,
            "Notification"
        );
    }
}

/// Escape a string for embedding inside an AppleScript double-quoted string.
///
/// Backslashes are escaped first so later replacements are not doubled.
pub fn escape_for_applescript(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

/// Show a blocking-for-the-user alert for a fatal startup error.
///
/// Waits for `osascript` to exit so the alert is seen before the process quits.
pub fn show_fatal_alert(message: &str) {
    warn!(event_type = "fatal_alert", alert = message, "Fatal error");

    #[cfg(target_os = "macos")]
    {
        let script = format!(
            r#"display alert "AutoShelf" message "{}" as critical buttons {{"Quit"}} default button "Quit""#,
            escape_for_applescript(message)
        );
        if let Err(e) = std::process::Command::new("osascript")
            .arg("-e")
            .arg(&script)
            .output()
        {
            warn!(error = %e, "Failed to show alert");
        }
    }
}

/// Run one AppleScript off the caller's thread
#[cfg(target_os = "macos")]
fn run_osascript(script: String) {
    let spawned = std::thread::Builder::new()
        .name("osascript".into())
        .spawn(move || {
            match std::process::Command::new("osascript")
                .arg("-e")
                .arg(&script)
                .output()
            {
                Ok(output) if !output.status.success() => warn!(
                    status = %output.status,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "osascript reported an error"
                ),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Failed to send macOS notification"),
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "Failed to spawn notification thread");
    } else {
        info!(event_type = "notification", "Notification sent");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_added_file_text() {
        let n = Notification::item_added(
            Path::new("/Users/me/Downloads/report.pdf"),
            EntryKind::File,
        );
        assert_eq!(n.title, "New File in Downloads");
        assert_eq!(n.body, "The File 'report.pdf' has been added to Downloads");
    }

    #[test]
    fn test_deleted_directory_text() {
        let n = Notification::item_deleted(
            Path::new("/Users/me/Inbox/Photos"),
            EntryKind::Directory,
        );
        assert_eq!(n.title, "Directory Deleted from Downloads");
        assert_eq!(n.body, "The Directory 'Photos' has been removed from Inbox");
    }

    #[test]
    fn test_escape_for_applescript() {
        assert_eq!(
            escape_for_applescript(r#"a "quoted" \ name"#),
            r#"a \"quoted\" \\ name"#
        );
        assert_eq!(escape_for_applescript("line\nbreak"), "line\\nbreak");
    }

    #[derive(Default)]
    struct Recorder(RefCell<Vec<Notification>>);

    impl NotificationSink for Recorder {
        fn deliver(&self, notification: &Notification) {
            self.0.borrow_mut().push(notification.clone());
        }
    }

    #[test]
    fn test_sink_default_methods_format_before_delivery() {
        let sink = Recorder::default();
        sink.item_added(Path::new("/d/a.pdf"), EntryKind::File);
        sink.item_deleted(Path::new("/d/b"), EntryKind::Directory);
        let seen = sink.0.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].title, "New File in Downloads");
        assert_eq!(seen[1].title, "Directory Deleted from Downloads");
    }
}
