//! Runtime wiring
//!
//! Connects the directory detector, the preferences file and the shelf
//! manager on the main context. Everything here runs inside one `LocalSet`.

use std::future::Future;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::{error, info, warn};

use crate::config::{load_preferences, Preferences, PreferencesWatcher};
use crate::detector::{ChangeBatch, ChangeEvent, ChangeStream, DirectoryMonitor, EntryFilter};
use crate::error::{AutoShelfError, ErrorSeverity, Result, ResultExt};
use crate::notifications::NotificationSink;
use crate::shelf::{ShelfManager, ShelfPlatform, ShelfSettings};

enum Step {
    Changes(Option<ChangeBatch>),
    Reload(bool),
    Shutdown,
}

pub struct AutoShelfApp<P: ShelfPlatform + 'static> {
    manager: ShelfManager<P>,
    notifier: Rc<dyn NotificationSink>,
    filter: EntryFilter,
    preferences_path: PathBuf,
    preferences: Preferences,
    /// `--path` from the command line; wins over `monitoredPath`
    path_override: Option<PathBuf>,
    monitor: Option<DirectoryMonitor>,
}

impl<P: ShelfPlatform + 'static> AutoShelfApp<P> {
    pub fn new(
        manager: ShelfManager<P>,
        notifier: Rc<dyn NotificationSink>,
        filter: EntryFilter,
        preferences_path: PathBuf,
        path_override: Option<PathBuf>,
    ) -> Self {
        let preferences = load_preferences(&preferences_path);
        manager.update_settings(ShelfSettings::from_preferences(&preferences));
        Self {
            manager,
            notifier,
            filter,
            preferences_path,
            preferences,
            path_override,
            monitor: None,
        }
    }

    pub fn manager(&self) -> &ShelfManager<P> {
        &self.manager
    }

    pub fn watched_path(&self) -> Option<PathBuf> {
        self.path_override
            .clone()
            .or_else(|| self.preferences.get_monitored_path())
    }

    /// Start the detector on the effective watched path.
    ///
    /// Any running detector is stopped first.
    fn start_detector(&mut self) -> Result<ChangeStream> {
        if let Some(mut old) = self.monitor.take() {
            old.stop_monitoring();
        }

        let path = self
            .watched_path()
            .ok_or_else(|| AutoShelfError::Config("no folder to watch".to_string()))?;
        let mut monitor = DirectoryMonitor::new(path, self.filter.clone());
        let stream = monitor.start_monitoring()?;
        self.monitor = Some(monitor);
        Ok(stream)
    }

    /// Run until `shutdown` resolves or the detector's event sequence ends.
    ///
    /// Fails only when the detector cannot be started on the watched path.
    /// Open shelves are closed on every exit.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let mut stream = self.start_detector()?;

        let (mut prefs_watcher, reloads) = PreferencesWatcher::new(self.preferences_path.clone());
        // Without the watcher the app still runs, just without live reload
        let mut reloads_open = prefs_watcher.start().warn_on_err().is_some();

        info!(
            event_type = "app_started",
            path = ?self.watched_path(),
            notifications = self.preferences.notifications_enabled(),
            "AutoShelf running"
        );

        tokio::pin!(shutdown);
        let outcome = loop {
            let step = tokio::select! {
                batch = stream.next_batch() => Step::Changes(batch),
                reload = reloads.recv(), if reloads_open => Step::Reload(reload.is_ok()),
                _ = &mut shutdown => Step::Shutdown,
            };

            match step {
                Step::Changes(Some(batch)) => self.handle_changes(batch),
                Step::Changes(None) => {
                    warn!("Change stream ended");
                    break Ok(());
                }
                Step::Reload(true) => match self.reload_preferences() {
                    Ok(Some(restarted)) => stream = restarted,
                    Ok(None) => {}
                    Err(e) => break Err(e),
                },
                Step::Reload(false) => reloads_open = false,
                Step::Shutdown => {
                    info!("Shutdown requested");
                    break Ok(());
                }
            }
        };

        prefs_watcher.stop();
        self.shutdown();
        outcome
    }

    /// Apply one batch in order: notifications first, then shelf work.
    ///
    /// Additions are spawned so a slow hand-off does not hold up the loop;
    /// the manager serializes them.
    pub(crate) fn handle_changes(&self, batch: ChangeBatch) {
        for change in batch {
            if self.preferences.notifications_enabled() {
                match &change {
                    ChangeEvent::Added { path, kind } => self.notifier.item_added(path, *kind),
                    ChangeEvent::Removed { path, kind } => self.notifier.item_deleted(path, *kind),
                }
            }

            match change {
                ChangeEvent::Added { path, .. } => {
                    info!(event_type = "entry_added", path = %path.display(), "New entry");
                    let manager = self.manager.clone();
                    tokio::task::spawn_local(async move {
                        let Err(e) = manager.add_item(&path).await else {
                            return;
                        };
                        if matches!(e, AutoShelfError::ItemRemoved { .. }) {
                            info!(path = %path.display(), "Entry removed before its shelf was tracked");
                            return;
                        }
                        match e.severity() {
                            ErrorSeverity::Fatal => error!(
                                path = %path.display(),
                                error = %e,
                                "Shelf hand-off failed"
                            ),
                            ErrorSeverity::Recoverable => warn!(
                                path = %path.display(),
                                reason = %e.user_message(),
                                error = %e,
                                "Shelf hand-off failed"
                            ),
                        }
                    });
                }
                ChangeEvent::Removed { path, .. } => {
                    info!(event_type = "entry_removed", path = %path.display(), "Entry removed");
                    self.manager.remove_item(&path);
                }
            }
        }
    }

    /// Re-read preferences. Returns a new stream when the detector moved.
    ///
    /// If the new folder cannot be watched the previous one is restored;
    /// only when that also fails is the error returned.
    fn reload_preferences(&mut self) -> Result<Option<ChangeStream>> {
        let previous_path = self.watched_path();
        let previous_bundle = self.preferences.get_shelf_bundle_id();

        self.preferences = load_preferences(&self.preferences_path);
        self.manager
            .update_settings(ShelfSettings::from_preferences(&self.preferences));
        info!(event_type = "preferences_reloaded", "Preferences applied");

        if self.preferences.get_shelf_bundle_id() != previous_bundle {
            warn!(
                bundle_id = %self.preferences.get_shelf_bundle_id(),
                "Shelf application changed; restart AutoShelf to use it"
            );
        }

        if self.watched_path() == previous_path {
            return Ok(None);
        }

        info!(
            from = ?previous_path,
            to = ?self.watched_path(),
            "Watched folder changed, restarting detector"
        );
        match self.start_detector() {
            Ok(stream) => Ok(Some(stream)),
            Err(e) => {
                error!(error = %e, "Cannot watch new folder, keeping the previous one");
                let path = previous_path
                    .ok_or_else(|| AutoShelfError::Config("no folder to watch".to_string()))?;
                let mut monitor = DirectoryMonitor::new(path, self.filter.clone());
                let stream = monitor.start_monitoring()?;
                self.monitor = Some(monitor);
                Ok(Some(stream))
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop_monitoring();
        }
        let closed = self.manager.close_all();
        info!(event_type = "app_stopped", closed_shelves = closed, "AutoShelf stopped");
    }
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;
