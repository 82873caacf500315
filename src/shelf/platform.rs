//! Seam between the shelf lifecycle and the OS
//!
//! The manager only ever sees opaque window handles compared with `==`.
//! Everything that touches the external process lives behind this trait.

use std::fmt;
use std::path::PathBuf;

use crate::error::Result;

pub trait ShelfPlatform {
    /// Opaque handle to one external window. Identity is `PartialEq` only.
    type Window: Clone + PartialEq + fmt::Debug + 'static;

    /// Current shelf-class windows of the external process
    fn shelf_windows(&self) -> Result<Vec<Self::Window>>;

    /// Put `paths` on a fresh pasteboard and invoke `service_name` with it
    fn hand_off(&self, paths: &[PathBuf], service_name: &str) -> Result<()>;

    /// Press the window's close control. Returns
    /// `AutoShelfError::CloseControlNotFound` when the window has none.
    fn press_close_control(&self, window: &Self::Window) -> Result<()>;

    /// Ask to be told when `window` is destroyed. Notifications arrive on
    /// the receiver returned by `destruction_events`.
    fn observe_destruction(&self, window: &Self::Window) -> Result<()>;

    fn destruction_events(&self) -> async_channel::Receiver<Self::Window>;
}
