use notify::{recommended_watcher, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::filter::EntryFilter;
use super::snapshot::{ChangeEvent, KnownEntrySet};
use crate::error::{AutoShelfError, Result};

/// Events from one notification, removals first then additions
pub type ChangeBatch = Vec<ChangeEvent>;

/// Receiving end of a detector's event sequence.
///
/// Ends (yields `None`) once the detector is stopped or dropped.
#[derive(Debug, Clone)]
pub struct ChangeStream {
    rx: async_channel::Receiver<ChangeBatch>,
}

impl ChangeStream {
    pub async fn next_batch(&self) -> Option<ChangeBatch> {
        self.rx.recv().await.ok()
    }

    pub fn try_next_batch(&self) -> Option<ChangeBatch> {
        self.rx.try_recv().ok()
    }

    pub fn is_closed(&self) -> bool {
        self.rx.is_closed()
    }
}

/// State shared between the detector and the notify callback thread
struct Shared {
    root: PathBuf,
    filter: EntryFilter,
    known: Mutex<KnownEntrySet>,
}

impl Shared {
    /// Re-read the directory and swap in the new snapshot.
    ///
    /// Read, diff and replace happen under one lock so overlapping callbacks
    /// cannot report the same name twice. Unreal entries are dropped after
    /// diffing; the snapshot itself keeps every name.
    fn rescan(&self) -> ChangeBatch {
        let mut known = self.known.lock();
        let current = match KnownEntrySet::read(&self.root) {
            Ok(current) => current,
            Err(e) => {
                warn!(
                    path = %self.root.display(),
                    error = %e,
                    "Watched directory unreadable, skipping rescan"
                );
                return Vec::new();
            }
        };

        known
            .replace(current, &self.root)
            .into_iter()
            .filter(|change| {
                let keep = change
                    .path()
                    .file_name()
                    .is_some_and(|name| self.filter.is_real(name, change.kind()));
                if !keep {
                    debug!(path = %change.path().display(), "Ignoring transient entry");
                }
                keep
            })
            .collect()
    }
}

struct ActiveWatch {
    _watcher: RecommendedWatcher,
    tx: async_channel::Sender<ChangeBatch>,
}

/// Watches the direct children of one directory and reports net additions
/// and removals.
pub struct DirectoryMonitor {
    shared: Arc<Shared>,
    active: Option<ActiveWatch>,
}

impl DirectoryMonitor {
    pub fn new(root: impl Into<PathBuf>, filter: EntryFilter) -> Self {
        Self {
            shared: Arc::new(Shared {
                root: root.into(),
                filter,
                known: Mutex::new(KnownEntrySet::new()),
            }),
            active: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    pub fn is_monitoring(&self) -> bool {
        self.active.is_some()
    }

    /// Snapshot the directory and begin listening for changes.
    ///
    /// Entries already present are never reported. Calling this while
    /// already monitoring restarts the watch with a fresh snapshot.
    #[instrument(skip_all, fields(path = %self.shared.root.display()))]
    pub fn start_monitoring(&mut self) -> Result<ChangeStream> {
        self.stop_monitoring();

        let initial = KnownEntrySet::read(&self.shared.root).map_err(|source| {
            AutoShelfError::WatchTarget {
                path: self.shared.root.clone(),
                source,
            }
        })?;
        let initial_count = initial.len();
        *self.shared.known.lock() = initial;

        let (tx, rx) = async_channel::unbounded::<ChangeBatch>();

        let shared = Arc::clone(&self.shared);
        let callback_tx = tx.clone();
        let mut watcher = recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    let batch = shared.rescan();
                    if !batch.is_empty() {
                        let _ = callback_tx.try_send(batch);
                    }
                }
                Err(e) => warn!(error = %e, watcher = "detector", "File watcher error"),
            }
        })?;
        watcher.watch(&self.shared.root, RecursiveMode::NonRecursive)?;

        // Catch anything created between the snapshot and the watch registration
        let gap = self.shared.rescan();
        if !gap.is_empty() {
            let _ = tx.try_send(gap);
        }

        info!(
            event_type = "detector_started",
            known_entries = initial_count,
            "Directory monitoring started"
        );

        self.active = Some(ActiveWatch {
            _watcher: watcher,
            tx,
        });
        Ok(ChangeStream { rx })
    }

    /// Force a rescan outside of a notification. Returns the filtered batch.
    pub fn rescan(&self) -> ChangeBatch {
        self.shared.rescan()
    }

    /// Cancel the listener and end the event sequence. Safe to call when
    /// never started and safe to call twice.
    pub fn stop_monitoring(&mut self) {
        if let Some(active) = self.active.take() {
            // Ends the stream now, not when the watcher thread exits
            active.tx.close();
            info!(
                event_type = "detector_stopped",
                path = %self.shared.root.display(),
                "Directory monitoring stopped"
            );
        }
    }
}

impl Drop for DirectoryMonitor {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
