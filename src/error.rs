use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

/// How a failure affects the running system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Startup cannot continue; the user is alerted and the process exits
    Fatal,
    /// Contained to one item; logged and processing continues
    Recoverable,
}

/// Domain-specific errors for AutoShelf
#[derive(Error, Debug)]
pub enum AutoShelfError {
    #[error("Cannot read watched directory '{path}': {source}")]
    WatchTarget {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File watch error: {0}")]
    FileWatch(#[from] notify::Error),

    #[error("Shelf application '{bundle_id}' is not running")]
    ShelfAppNotRunning { bundle_id: String },

    #[error("Accessibility permission has not been granted")]
    AccessibilityPermission,

    #[error("Accessibility observer failed: {0}")]
    Observer(String),

    #[error("Hand-off of '{}' failed: {reason}", path.display())]
    HandOff { path: PathBuf, reason: String },

    #[error("No new shelf window appeared for '{}'", path.display())]
    NoNewWindow { path: PathBuf },

    #[error("'{}' was removed before its shelf was tracked", path.display())]
    ItemRemoved { path: PathBuf },

    #[error("Close control not found on shelf window")]
    CloseControlNotFound,

    #[error("Accessibility call failed: {0}")]
    Accessibility(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

impl AutoShelfError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::WatchTarget { .. } => ErrorSeverity::Fatal,
            Self::FileWatch(_) => ErrorSeverity::Fatal,
            Self::ShelfAppNotRunning { .. } => ErrorSeverity::Fatal,
            Self::AccessibilityPermission => ErrorSeverity::Fatal,
            Self::Observer(_) => ErrorSeverity::Fatal,
            Self::Unsupported(_) => ErrorSeverity::Fatal,
            Self::HandOff { .. } => ErrorSeverity::Recoverable,
            Self::NoNewWindow { .. } => ErrorSeverity::Recoverable,
            Self::ItemRemoved { .. } => ErrorSeverity::Recoverable,
            Self::CloseControlNotFound => ErrorSeverity::Recoverable,
            Self::Accessibility(_) => ErrorSeverity::Recoverable,
            Self::Config(_) => ErrorSeverity::Recoverable,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == ErrorSeverity::Fatal
    }

    /// Text suitable for an alert or notification body
    pub fn user_message(&self) -> String {
        match self {
            Self::WatchTarget { path, .. } => format!(
                "Failed to read the folder {}. AutoShelf will quit.",
                path.display()
            ),
            Self::FileWatch(e) => format!("Could not watch the folder: {}", e),
            Self::ShelfAppNotRunning { bundle_id } => format!(
                "The shelf application ({}) is not running. Start it and relaunch AutoShelf.",
                bundle_id
            ),
            Self::AccessibilityPermission => {
                "AutoShelf needs Accessibility permission. Grant it in System Settings > Privacy & Security > Accessibility."
                    .to_string()
            }
            Self::Observer(msg) => format!("Could not observe shelf windows: {}", msg),
            Self::HandOff { path, .. } => format!(
                "Could not send '{}' to the shelf",
                file_name_of(path)
            ),
            Self::NoNewWindow { path } => {
                format!("No shelf opened for '{}'", file_name_of(path))
            }
            Self::ItemRemoved { path } => {
                format!("'{}' was removed before its shelf opened", file_name_of(path))
            }
            Self::CloseControlNotFound => "Could not close a shelf window".to_string(),
            Self::Accessibility(msg) => msg.clone(),
            Self::Config(msg) => format!("Configuration issue: {}", msg),
            Self::Unsupported(what) => format!("{} requires macOS", what),
        }
    }
}

fn file_name_of(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub type Result<T> = std::result::Result<T, AutoShelfError>;

/// Extension trait for silent error logging with caller location tracking.
/// Use when the operation is recoverable and the user doesn't need to know.
pub trait ResultExt<T> {
    /// Log as warning with caller location and return None. Use for expected failures.
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation had warning"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_failures_are_fatal() {
        let err = AutoShelfError::ShelfAppNotRunning {
            bundle_id: "com.example.shelf".to_string(),
        };
        assert!(err.is_fatal());
        assert!(AutoShelfError::AccessibilityPermission.is_fatal());
        assert!(AutoShelfError::Observer("boom".into()).is_fatal());
    }

    #[test]
    fn test_per_item_failures_are_recoverable() {
        let handoff = AutoShelfError::HandOff {
            path: PathBuf::from("/tmp/report.pdf"),
            reason: "service unavailable".into(),
        };
        assert_eq!(handoff.severity(), ErrorSeverity::Recoverable);
        assert_eq!(
            AutoShelfError::CloseControlNotFound.severity(),
            ErrorSeverity::Recoverable
        );
    }

    #[test]
    fn test_user_message_uses_file_name() {
        let err = AutoShelfError::NoNewWindow {
            path: PathBuf::from("/Users/me/Downloads/report.pdf"),
        };
        assert_eq!(err.user_message(), "No shelf opened for 'report.pdf'");
    }

    #[test]
    fn test_warn_on_err_returns_none_on_error() {
        let result: std::result::Result<u32, &str> = Err("nope");
        assert_eq!(result.warn_on_err(), None);
        let ok: std::result::Result<u32, &str> = Ok(7);
        assert_eq!(ok.warn_on_err(), Some(7));
    }
}
