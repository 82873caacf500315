use notify::{recommended_watcher, RecursiveMode, Result as NotifyResult, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

/// Quiet period before a burst of writes becomes one reload
const DEBOUNCE: Duration = Duration::from_millis(300);

/// How often the loop wakes to check the stop flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Event emitted when the preferences file needs to be reloaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreferencesReloadEvent {
    Reload,
}

/// Watches the preferences file for changes and emits reload events.
///
/// The parent directory is watched (editors often replace the file rather
/// than write in place) and events are filtered by file name.
pub struct PreferencesWatcher {
    path: PathBuf,
    tx: Option<async_channel::Sender<PreferencesReloadEvent>>,
    stop: Arc<AtomicBool>,
    watcher_thread: Option<thread::JoinHandle<()>>,
}

impl PreferencesWatcher {
    /// Create a new PreferencesWatcher
    ///
    /// Returns a tuple of (watcher, receiver) where receiver will emit
    /// `PreferencesReloadEvent` when the file changes.
    pub fn new(path: impl Into<PathBuf>) -> (Self, async_channel::Receiver<PreferencesReloadEvent>) {
        let (tx, rx) = async_channel::bounded(16);
        let watcher = PreferencesWatcher {
            path: path.into(),
            tx: Some(tx),
            stop: Arc::new(AtomicBool::new(false)),
            watcher_thread: None,
        };
        (watcher, rx)
    }

    /// Start watching on a background thread
    pub fn start(&mut self) -> NotifyResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| std::io::Error::other("watcher already started"))?;

        let watch_dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&watch_dir)?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| std::io::Error::other("preferences path has no file name"))?;

        let (watch_tx, watch_rx) = channel();
        let mut watcher = recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = watch_tx.send(res);
        })?;
        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

        info!(
            path = %watch_dir.display(),
            target = ?file_name,
            "Preferences watcher started"
        );

        let stop = self.stop.clone();
        let thread_handle = thread::Builder::new()
            .name("preferences-watcher".into())
            .spawn(move || {
                // Keep the OS watch alive for as long as the loop runs
                let _watcher = watcher;
                let mut pending_since: Option<Instant> = None;

                while !stop.load(Ordering::Relaxed) {
                    match watch_rx.recv_timeout(POLL_INTERVAL) {
                        Ok(Ok(event)) => {
                            let touches_file = event
                                .paths
                                .iter()
                                .any(|p| p.file_name() == Some(file_name.as_os_str()));
                            let is_relevant_event = matches!(
                                event.kind,
                                notify::EventKind::Create(_)
                                    | notify::EventKind::Modify(_)
                                    | notify::EventKind::Remove(_)
                            );
                            if touches_file && is_relevant_event {
                                debug!(kind = ?event.kind, "Preferences file touched");
                                pending_since = Some(Instant::now());
                            }
                        }
                        Ok(Err(e)) => {
                            warn!(error = %e, watcher = "preferences", "File watcher error");
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }

                    if pending_since.is_some_and(|since| since.elapsed() >= DEBOUNCE) {
                        pending_since = None;
                        info!("Preferences changed, emitting reload event");
                        if tx.send_blocking(PreferencesReloadEvent::Reload).is_err() {
                            break;
                        }
                    }
                }

                info!(watcher = "preferences", "Preferences watcher shutting down");
            })?;

        self.watcher_thread = Some(thread_handle);
        Ok(())
    }

    /// Stop the background thread. Safe to call more than once.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.watcher_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PreferencesWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
