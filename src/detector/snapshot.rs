//! Directory snapshots and snapshot diffing

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Whether a directory entry is a plain file or a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn is_directory(self) -> bool {
        self == EntryKind::Directory
    }

    pub fn label(self) -> &'static str {
        match self {
            EntryKind::File => "File",
            EntryKind::Directory => "Directory",
        }
    }
}

/// A net change to the watched directory's direct children
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Added { path: PathBuf, kind: EntryKind },
    Removed { path: PathBuf, kind: EntryKind },
}

impl ChangeEvent {
    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Added { path, .. } | ChangeEvent::Removed { path, .. } => path,
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            ChangeEvent::Added { kind, .. } | ChangeEvent::Removed { kind, .. } => *kind,
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, ChangeEvent::Added { .. })
    }
}

/// Snapshot of a directory's direct children keyed by entry name.
///
/// The kind is kept alongside the name so a removed entry can still be
/// classified after it is gone from disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownEntrySet {
    entries: BTreeMap<OsString, EntryKind>,
}

impl KnownEntrySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the direct children of `dir`.
    ///
    /// Entries that disappear between listing and stat are skipped.
    /// Symlinks are classified by their target.
    pub fn read(dir: &Path) -> io::Result<Self> {
        let mut entries = BTreeMap::new();
        for entry in fs::read_dir(dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };

            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(_) => continue,
            };

            let is_dir = if file_type.is_symlink() {
                fs::metadata(entry.path()).map(|m| m.is_dir()).unwrap_or(false)
            } else {
                file_type.is_dir()
            };

            let kind = if is_dir {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            entries.insert(entry.file_name(), kind);
        }
        Ok(Self { entries })
    }

    pub fn insert(&mut self, name: impl Into<OsString>, kind: EntryKind) {
        self.entries.insert(name.into(), kind);
    }

    pub fn contains(&self, name: &OsStr) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names present in `current` but not here are Added, names here but not
    /// in `current` are Removed. Removals come first, each group sorted by name.
    pub fn diff(&self, current: &KnownEntrySet, root: &Path) -> Vec<ChangeEvent> {
        let removed = self
            .entries
            .iter()
            .filter(|(name, _)| !current.entries.contains_key(*name))
            .map(|(name, kind)| ChangeEvent::Removed {
                path: root.join(name),
                kind: *kind,
            });

        let added = current
            .entries
            .iter()
            .filter(|(name, _)| !self.entries.contains_key(*name))
            .map(|(name, kind)| ChangeEvent::Added {
                path: root.join(name),
                kind: *kind,
            });

        removed.chain(added).collect()
    }

    /// Diff against `current` and take it as the new snapshot
    pub fn replace(&mut self, current: KnownEntrySet, root: &Path) -> Vec<ChangeEvent> {
        let changes = self.diff(&current, root);
        *self = current;
        changes
    }
}
