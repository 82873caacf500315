//! Command-line interface for AutoShelf.
//!
//! `run` (the default) starts the background service. `doctor` and
//! `preferences` are one-shot diagnostics that print and exit.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::{default_preferences_path, load_preferences, save_preferences, Preferences};
use crate::detector::KnownEntrySet;
use crate::permissions::has_accessibility_permission;

/// AutoShelf - send new downloads to your shelf app
#[derive(Parser, Debug)]
#[command(name = "autoshelf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Preferences file (default: ~/Library/Application Support/AutoShelf/preferences.json)
    #[arg(long, value_name = "FILE", global = true)]
    pub preferences: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch the folder and manage shelves (default)
    Run {
        /// Folder to watch instead of `monitoredPath`
        #[arg(long, value_name = "DIR")]
        path: Option<PathBuf>,
    },
    /// Check permissions, the shelf app and the watched folder
    Doctor,
    /// Print the preferences in effect as JSON
    Preferences {
        /// Also write them back to the preferences file
        #[arg(long)]
        write: bool,
    },
}

impl Cli {
    pub fn preferences_path(&self) -> PathBuf {
        self.preferences
            .clone()
            .unwrap_or_else(default_preferences_path)
    }
}

/// One line of `doctor` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

/// Run every startup precondition without starting anything
pub fn doctor_checks(prefs_path: &Path) -> Vec<Check> {
    let prefs = load_preferences(prefs_path);
    let mut checks = Vec::new();

    let trusted = has_accessibility_permission();
    checks.push(Check {
        name: "accessibility",
        passed: trusted,
        detail: if trusted {
            "permission granted".to_string()
        } else {
            "not granted (System Settings > Privacy & Security > Accessibility)".to_string()
        },
    });

    let bundle_id = prefs.get_shelf_bundle_id();
    let running = shelf_app_running(&bundle_id);
    checks.push(Check {
        name: "shelf app",
        passed: running,
        detail: if running {
            format!("{} is running", bundle_id)
        } else {
            format!("{} is not running", bundle_id)
        },
    });

    checks.push(watched_folder_check(&prefs));
    checks
}

fn watched_folder_check(prefs: &Preferences) -> Check {
    match prefs.get_monitored_path() {
        None => Check {
            name: "watched folder",
            passed: false,
            detail: "no folder configured and no Downloads folder found".to_string(),
        },
        Some(path) => match KnownEntrySet::read(&path) {
            Ok(entries) => Check {
                name: "watched folder",
                passed: true,
                detail: format!("{} ({} entries)", path.display(), entries.len()),
            },
            Err(e) => Check {
                name: "watched folder",
                passed: false,
                detail: format!("{}: {}", path.display(), e),
            },
        },
    }
}

#[cfg(target_os = "macos")]
fn shelf_app_running(bundle_id: &str) -> bool {
    crate::shelf::is_shelf_app_running(bundle_id)
}

#[cfg(not(target_os = "macos"))]
fn shelf_app_running(_bundle_id: &str) -> bool {
    false
}

/// Print `doctor` results. Returns true when everything passed.
pub fn print_doctor(prefs_path: &Path) -> bool {
    println!("AutoShelf doctor");
    println!("preferences: {}", prefs_path.display());
    println!();

    let checks = doctor_checks(prefs_path);
    for check in &checks {
        let mark = if check.passed { "ok  " } else { "FAIL" };
        println!("[{}] {:<15} {}", mark, check.name, check.detail);
    }
    checks.iter().all(|c| c.passed)
}

/// Print resolved preferences, optionally persisting them
pub fn print_preferences(prefs_path: &Path, write: bool) -> anyhow::Result<()> {
    let resolved = load_preferences(prefs_path).resolved();
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    if write {
        save_preferences(prefs_path, &resolved)?;
        eprintln!("Wrote {}", prefs_path.display());
    }
    Ok(())
}
