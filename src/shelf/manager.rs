//! Lifecycle of shelf windows opened on behalf of new files
//!
//! Every window located after a hand-off becomes a `ManagedShelf` and is
//! removed exactly once, by whichever comes first: an explicit close, the
//! auto-close timer, or the window's destruction notification.

use chrono::{DateTime, Utc};
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::platform::ShelfPlatform;
use crate::config::Preferences;
use crate::error::{AutoShelfError, Result};

/// Identity of one tracked shelf, unique for the manager's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShelfId(u64);

impl std::fmt::Display for ShelfId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "shelf-{}", self.0)
    }
}

/// Progress of one `add_item` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemPhase {
    Requested,
    HandedOff,
    WindowLocated,
    Closed,
    Failed,
}

/// Why a shelf left the roster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Timeout,
    Explicit,
    Destroyed,
}

/// Values read at the point of use, refreshed when preferences reload
#[derive(Debug, Clone, PartialEq)]
pub struct ShelfSettings {
    pub auto_close: Duration,
    pub settle_delay: Duration,
    pub service_name: String,
}

impl ShelfSettings {
    pub fn from_preferences(prefs: &Preferences) -> Self {
        Self {
            auto_close: prefs.get_auto_close_duration(),
            settle_delay: prefs.get_window_settle_delay(),
            service_name: prefs.get_shelf_service_name(),
        }
    }
}

impl Default for ShelfSettings {
    fn default() -> Self {
        Self::from_preferences(&Preferences::default())
    }
}

#[derive(Debug, Clone)]
struct ManagedShelf<W> {
    id: ShelfId,
    window: W,
    path: PathBuf,
    created_at: DateTime<Utc>,
}

/// Read-only view of a tracked shelf for UI collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShelfSummary {
    pub id: ShelfId,
    pub path: PathBuf,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
}

impl<W> From<&ManagedShelf<W>> for ShelfSummary {
    fn from(shelf: &ManagedShelf<W>) -> Self {
        Self {
            id: shelf.id,
            path: shelf.path.clone(),
            file_name: shelf
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| shelf.path.display().to_string()),
            created_at: shelf.created_at,
        }
    }
}

/// An `add_item` call that has not yet tracked its window
struct PendingItem {
    token: u64,
    path: PathBuf,
    cancelled: bool,
}

struct Inner<P: ShelfPlatform> {
    platform: P,
    settings: RefCell<ShelfSettings>,
    roster: RefCell<Vec<ManagedShelf<P::Window>>>,
    next_id: Cell<u64>,
    pending: RefCell<Vec<PendingItem>>,
    next_token: Cell<u64>,
    /// Held from the Before capture to the After capture
    hand_off_lock: AsyncMutex<()>,
    roster_tx: watch::Sender<Vec<ShelfSummary>>,
}

impl<P: ShelfPlatform> Inner<P> {
    fn publish(&self) {
        let summaries: Vec<ShelfSummary> =
            self.roster.borrow().iter().map(ShelfSummary::from).collect();
        self.roster_tx.send_replace(summaries);
    }

    fn is_tracked(&self, window: &P::Window) -> bool {
        self.roster.borrow().iter().any(|s| &s.window == window)
    }

    /// Remove `id` from the roster and run the close sequence unless the
    /// window is already gone. A second call for the same id is a no-op.
    fn close_shelf(&self, id: ShelfId, reason: CloseReason) -> bool {
        let removed = {
            let mut roster = self.roster.borrow_mut();
            roster
                .iter()
                .position(|s| s.id == id)
                .map(|index| roster.remove(index))
        };

        let Some(shelf) = removed else {
            debug!(shelf_id = %id, reason = ?reason, "Shelf already closed");
            return false;
        };

        if reason != CloseReason::Destroyed {
            if let Err(e) = self.platform.press_close_control(&shelf.window) {
                warn!(
                    shelf_id = %id,
                    path = %shelf.path.display(),
                    error = %e,
                    "Close sequence failed, dropping shelf anyway"
                );
            }
        }

        self.publish();
        info!(
            event_type = "shelf_closed",
            shelf_id = %id,
            path = %shelf.path.display(),
            reason = ?reason,
            phase = ?ItemPhase::Closed,
            open_shelves = self.roster.borrow().len(),
            "Shelf removed"
        );
        true
    }

    fn is_cancelled(&self, token: u64) -> bool {
        self.pending
            .borrow()
            .iter()
            .any(|p| p.token == token && p.cancelled)
    }

    /// Mark in-flight requests for `path` so they never track a window
    fn cancel_pending(&self, path: &Path) -> usize {
        let mut cancelled = 0;
        for item in self.pending.borrow_mut().iter_mut() {
            if item.path == path && !item.cancelled {
                item.cancelled = true;
                cancelled += 1;
            }
        }
        cancelled
    }

    fn on_window_destroyed(&self, window: &P::Window) {
        let id = self
            .roster
            .borrow()
            .iter()
            .find(|s| &s.window == window)
            .map(|s| s.id);
        match id {
            Some(id) => {
                self.close_shelf(id, CloseReason::Destroyed);
            }
            None => debug!(window = ?window, "Destroyed window was not tracked"),
        }
    }
}

/// Registration of one in-flight request, withdrawn on drop
struct PendingGuard<'a, P: ShelfPlatform> {
    inner: &'a Inner<P>,
    token: u64,
}

impl<'a, P: ShelfPlatform> PendingGuard<'a, P> {
    fn register(inner: &'a Inner<P>, path: &Path) -> Self {
        let token = inner.next_token.get();
        inner.next_token.set(token + 1);
        inner.pending.borrow_mut().push(PendingItem {
            token,
            path: path.to_path_buf(),
            cancelled: false,
        });
        Self { inner, token }
    }

    fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled(self.token)
    }
}

impl<P: ShelfPlatform> Drop for PendingGuard<'_, P> {
    fn drop(&mut self) {
        self.inner.pending.borrow_mut().retain(|p| p.token != self.token);
    }
}

/// Tracks shelf windows and guarantees each one is eventually closed.
///
/// Lives on the main context: it is `!Send` and spawns its timers with
/// `tokio::task::spawn_local`, so it must be created inside a `LocalSet`.
pub struct ShelfManager<P: ShelfPlatform> {
    inner: Rc<Inner<P>>,
}

impl<P: ShelfPlatform> Clone for ShelfManager<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P: ShelfPlatform + 'static> ShelfManager<P> {
    pub fn new(platform: P, settings: ShelfSettings) -> Self {
        let (roster_tx, _) = watch::channel(Vec::new());
        let destroyed = platform.destruction_events();
        let inner = Rc::new(Inner {
            platform,
            settings: RefCell::new(settings),
            roster: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
            pending: RefCell::new(Vec::new()),
            next_token: Cell::new(1),
            hand_off_lock: AsyncMutex::new(()),
            roster_tx,
        });

        // Destruction callbacks arrive from another thread; apply them here
        let weak = Rc::downgrade(&inner);
        tokio::task::spawn_local(async move {
            while let Ok(window) = destroyed.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                inner.on_window_destroyed(&window);
            }
        });

        Self { inner }
    }

    pub fn update_settings(&self, settings: ShelfSettings) {
        *self.inner.settings.borrow_mut() = settings;
    }

    pub fn settings(&self) -> ShelfSettings {
        self.inner.settings.borrow().clone()
    }

    /// Hand `path` to the shelf application and track the window it opens.
    ///
    /// Fails with `HandOff` when the service cannot be invoked and with
    /// `NoNewWindow` when no untracked shelf window appears. Either way the
    /// roster is unchanged. Fails with `ItemRemoved` when `remove_item` was
    /// called for `path` meanwhile; a window that already opened is closed.
    #[instrument(skip(self, path), fields(path = %path.display(), correlation_id))]
    pub async fn add_item(&self, path: &Path) -> Result<ShelfId> {
        let correlation_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("correlation_id", correlation_id.as_str());
        debug!(phase = ?ItemPhase::Requested, "Shelf requested");

        let settings = self.settings();
        let paths = [path.to_path_buf()];
        let pending = PendingGuard::register(&*self.inner, path);

        let new_window = {
            let _guard = self.inner.hand_off_lock.lock().await;
            if pending.is_cancelled() {
                debug!(phase = ?ItemPhase::Failed, "Removed before hand-off");
                return Err(AutoShelfError::ItemRemoved {
                    path: path.to_path_buf(),
                });
            }

            let before = self.inner.platform.shelf_windows()?;

            if let Err(e) = self.inner.platform.hand_off(&paths, &settings.service_name) {
                warn!(phase = ?ItemPhase::Failed, error = %e, "Hand-off failed");
                return Err(e);
            }
            debug!(phase = ?ItemPhase::HandedOff, service = %settings.service_name, "Handed off");

            tokio::time::sleep(settings.settle_delay).await;
            let after = self.inner.platform.shelf_windows()?;

            let mut fresh = after
                .into_iter()
                .filter(|w| !before.contains(w) && !self.inner.is_tracked(w));
            let first = fresh.next();
            let extra = fresh.count();
            if extra > 0 {
                warn!(extra, "More than one new shelf window, tracking the first");
            }
            first
        };

        let Some(window) = new_window else {
            warn!(phase = ?ItemPhase::Failed, "No new shelf window located");
            return Err(AutoShelfError::NoNewWindow {
                path: path.to_path_buf(),
            });
        };

        if pending.is_cancelled() {
            if let Err(e) = self.inner.platform.press_close_control(&window) {
                warn!(error = %e, "Could not close shelf of removed item");
            }
            info!(
                event_type = "shelf_discarded",
                phase = ?ItemPhase::Closed,
                "Item removed during hand-off, shelf closed"
            );
            return Err(AutoShelfError::ItemRemoved {
                path: path.to_path_buf(),
            });
        }
        drop(pending);

        let id = ShelfId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);

        self.inner.roster.borrow_mut().push(ManagedShelf {
            id,
            window: window.clone(),
            path: path.to_path_buf(),
            created_at: Utc::now(),
        });
        self.inner.publish();

        info!(
            event_type = "shelf_opened",
            shelf_id = %id,
            phase = ?ItemPhase::WindowLocated,
            auto_close_secs = settings.auto_close.as_secs_f64(),
            open_shelves = self.inner.roster.borrow().len(),
            "Tracking shelf window"
        );

        self.schedule_auto_close(id, settings.auto_close);

        if let Err(e) = self.inner.platform.observe_destruction(&window) {
            warn!(shelf_id = %id, error = %e, "Destruction observer not registered, relying on timeout");
        }

        Ok(id)
    }

    fn schedule_auto_close(&self, id: ShelfId, after: Duration) {
        let weak: Weak<Inner<P>> = Rc::downgrade(&self.inner);
        tokio::task::spawn_local(async move {
            tokio::time::sleep(after).await;
            if let Some(inner) = weak.upgrade() {
                inner.close_shelf(id, CloseReason::Timeout);
            }
        });
    }

    /// Close every shelf opened for `path`. Returns how many were closed.
    ///
    /// Requests for `path` still in flight are cancelled and close their
    /// window as soon as it is located.
    pub fn remove_item(&self, path: &Path) -> usize {
        let cancelled = self.inner.cancel_pending(path);
        if cancelled > 0 {
            debug!(path = %path.display(), cancelled, "Cancelled in-flight hand-off");
        }

        let ids: Vec<ShelfId> = self
            .inner
            .roster
            .borrow()
            .iter()
            .filter(|s| s.path == path)
            .map(|s| s.id)
            .collect();

        ids.into_iter()
            .filter(|id| self.inner.close_shelf(*id, CloseReason::Explicit))
            .count()
    }

    pub fn close(&self, id: ShelfId) -> bool {
        self.inner.close_shelf(id, CloseReason::Explicit)
    }

    pub fn close_all(&self) -> usize {
        let ids: Vec<ShelfId> = self.inner.roster.borrow().iter().map(|s| s.id).collect();
        if !ids.is_empty() {
            info!(count = ids.len(), "Closing all shelves");
        }
        ids.into_iter()
            .filter(|id| self.inner.close_shelf(*id, CloseReason::Explicit))
            .count()
    }

    pub fn shelves(&self) -> Vec<ShelfSummary> {
        self.inner.roster.borrow().iter().map(ShelfSummary::from).collect()
    }

    pub fn count(&self) -> usize {
        self.inner.roster.borrow().len()
    }

    /// Roster updates, sent after every insertion and removal
    pub fn subscribe(&self) -> watch::Receiver<Vec<ShelfSummary>> {
        self.inner.roster_tx.subscribe()
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
