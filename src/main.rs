use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use autoshelf::cli::{print_doctor, print_preferences, Cli, Commands};
use autoshelf::error::AutoShelfError;
use autoshelf::logging;
use autoshelf::notifications::show_fatal_alert;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let prefs_path = cli.preferences_path();

    match cli.command {
        Some(Commands::Doctor) => {
            if print_doctor(&prefs_path) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Some(Commands::Preferences { write }) => match print_preferences(&prefs_path, write) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {:#}", e);
                ExitCode::FAILURE
            }
        },
        Some(Commands::Run { path }) => run(path, prefs_path),
        None => run(None, prefs_path),
    }
}

fn run(path_override: Option<PathBuf>, prefs_path: PathBuf) -> ExitCode {
    // Must stay alive until exit so buffered log lines are flushed
    let _logging_guard = logging::init();
    info!(
        event_type = "startup",
        version = env!("CARGO_PKG_VERSION"),
        log_file = %logging::log_path().display(),
        preferences = %prefs_path.display(),
        "AutoShelf starting"
    );

    match run_service(path_override, prefs_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = match e.downcast_ref::<AutoShelfError>() {
                Some(domain) => domain.user_message(),
                None => format!("{:#}", e),
            };
            error!(error = %format!("{:#}", e), "AutoShelf stopped on a fatal error");
            show_fatal_alert(&message);
            ExitCode::FAILURE
        }
    }
}

#[cfg(target_os = "macos")]
fn run_service(path_override: Option<PathBuf>, prefs_path: PathBuf) -> anyhow::Result<()> {
    use anyhow::Context;
    use autoshelf::app::AutoShelfApp;
    use autoshelf::config::load_preferences;
    use autoshelf::detector::EntryFilter;
    use autoshelf::notifications::{DesktopNotifier, NotificationSink};
    use autoshelf::permissions::ensure_accessibility_permission;
    use autoshelf::shelf::{MacShelfPlatform, ShelfManager, ShelfSettings};
    use std::rc::Rc;
    use tracing::warn;

    ensure_accessibility_permission()?;
    let prefs = load_preferences(&prefs_path);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build the main runtime")?;
    let local = tokio::task::LocalSet::new();

    local.block_on(&runtime, async move {
        let platform = MacShelfPlatform::connect(&prefs.get_shelf_bundle_id())?;
        let manager = ShelfManager::new(platform, ShelfSettings::from_preferences(&prefs));
        let notifier: Rc<dyn NotificationSink> = Rc::new(DesktopNotifier);
        let app = AutoShelfApp::new(
            manager,
            notifier,
            EntryFilter::system(),
            prefs_path,
            path_override,
        );

        app.run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for Ctrl-C; stop with SIGTERM");
                std::future::pending::<()>().await;
            }
        })
        .await?;
        Ok::<(), anyhow::Error>(())
    })
}

#[cfg(not(target_os = "macos"))]
fn run_service(_path_override: Option<PathBuf>, _prefs_path: PathBuf) -> anyhow::Result<()> {
    Err(AutoShelfError::Unsupported("Handing files to a shelf app").into())
}
