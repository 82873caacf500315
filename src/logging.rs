//! Structured JSONL logging plus human-readable stderr output.
//!
//! - **JSONL to file** (~/Library/Logs/AutoShelf/autoshelf.jsonl) - one JSON object per line
//! - **Pretty to stderr** - compact, for running from a terminal
//!
//! # Usage
//!
//! ```rust,ignore
//! // MUST keep guard alive for duration of program
//! let _guard = autoshelf::logging::init();
//! tracing::info!(event_type = "shelf_tracked", path = %path.display(), "Tracking shelf");
//! ```

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_NAME: &str = "autoshelf.jsonl";
const DEFAULT_FILTER: &str = "info,notify=warn";

/// Guard that must be kept alive for the duration of the program.
/// Dropping this guard will flush and close the log file.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the dual-output logging system.
///
/// Returns a guard that MUST be kept alive for the duration of the program.
/// If the log file cannot be opened, only the stderr layer is installed.
pub fn init() -> LoggingGuard {
    let log_dir = get_log_dir();
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("[LOGGING] Failed to create log directory: {}", e);
    }

    let log_path = log_dir.join(LOG_FILE_NAME);
    let (subscriber, file_guard) = build_subscriber(&log_path);
    subscriber.init();

    tracing::info!(
        event_type = "app_lifecycle",
        action = "started",
        log_path = %log_path.display(),
        "Application logging initialized"
    );

    LoggingGuard {
        _file_guard: file_guard,
    }
}

/// Filter, optional JSONL file layer and stderr layer.
///
/// If the log file cannot be opened only the stderr layer is active.
fn build_subscriber(
    log_path: &Path,
) -> (
    impl tracing::Subscriber + Send + Sync + 'static,
    Option<WorkerGuard>,
) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let pretty_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .compact();

    let (json_layer, file_guard) =
        match OpenOptions::new().create(true).append(true).open(log_path) {
            Ok(file) => {
                // Non-blocking so a slow disk never stalls the main context
                let (non_blocking_file, guard) = tracing_appender::non_blocking(file);
                let layer = fmt::layer()
                    .json()
                    .with_writer(non_blocking_file)
                    .with_timer(fmt::time::UtcTime::rfc_3339())
                    .with_target(true)
                    .with_level(true)
                    .with_thread_names(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_span_events(FmtSpan::NONE);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                eprintln!("[LOGGING] Failed to open log file {}: {}", log_path.display(), e);
                (None, None)
            }
        };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer);
    (subscriber, file_guard)
}

/// Log directory: ~/Library/Logs/AutoShelf on macOS, ~/.autoshelf/logs elsewhere
fn get_log_dir() -> PathBuf {
    let home = dirs::home_dir();
    if cfg!(target_os = "macos") {
        if let Some(home) = &home {
            return home.join("Library").join("Logs").join("AutoShelf");
        }
    }
    home.map(|h| h.join(".autoshelf").join("logs"))
        .unwrap_or_else(|| std::env::temp_dir().join("autoshelf-logs"))
}

/// Get the path to the JSONL log file
pub fn log_path() -> PathBuf {
    get_log_dir().join(LOG_FILE_NAME)
}
