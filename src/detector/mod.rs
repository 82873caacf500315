//! Directory change detection
//!
//! Watches the direct children of one directory and turns raw filesystem
//! notifications into net `Added`/`Removed` events for entries that look
//! like finished downloads.

mod filter;
mod monitor;
mod snapshot;

pub use filter::{DefaultHandlerLookup, EntryFilter, SystemHandlerLookup};
pub use monitor::{ChangeBatch, ChangeStream, DirectoryMonitor};
pub use snapshot::{ChangeEvent, EntryKind, KnownEntrySet};
