// src/watch/event.rs

//! Filesystem events as seen by jobs.
//!
//! A [`FsEvent`] is the unit the buffer debounces on, so its `Eq`/`Hash`
//! impls define event identity: `(path, kind, destination)`. The directory
//! flag rides along but does not take part in identity.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::str::FromStr;

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use serde::Deserialize;

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Modified => "modified",
            EventKind::Deleted => "deleted",
            EventKind::Moved => "moved",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "created" => Ok(EventKind::Created),
            "modified" => Ok(EventKind::Modified),
            "deleted" => Ok(EventKind::Deleted),
            "moved" => Ok(EventKind::Moved),
            other => Err(format!(
                "invalid event type: {other} (expected created, modified, deleted or moved)"
            )),
        }
    }
}

/// A single filesystem change.
#[derive(Debug, Clone)]
pub struct FsEvent {
    pub path: PathBuf,
    pub kind: EventKind,
    pub is_directory: bool,
    /// Target path for `Moved` events.
    pub destination: Option<PathBuf>,
}

impl FsEvent {
    pub fn new(path: impl Into<PathBuf>, kind: EventKind) -> Self {
        Self {
            path: path.into(),
            kind,
            is_directory: false,
            destination: None,
        }
    }

    pub fn moved(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            path: from.into(),
            kind: EventKind::Moved,
            is_directory: false,
            destination: Some(to.into()),
        }
    }

    pub fn directory(mut self, is_directory: bool) -> Self {
        self.is_directory = is_directory;
        self
    }

    /// Path as a string, used for glob and regex matching.
    pub fn path_str(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Translate a raw `notify` event into zero or more `FsEvent`s.
    ///
    /// Access and unclassified events are dropped. A rename reported with
    /// both ends becomes a single `Moved` event; half-renames are treated as
    /// a delete (source side) or a create (target side).
    pub fn from_notify(event: &notify::Event) -> Vec<FsEvent> {
        use notify::EventKind as N;

        match &event.kind {
            N::Create(kind) => {
                let folder = matches!(kind, CreateKind::Folder);
                per_path(&event.paths, EventKind::Created, folder)
            }
            N::Remove(kind) => {
                let folder = matches!(kind, RemoveKind::Folder);
                // The path is gone, so `is_dir` can't help here.
                event
                    .paths
                    .iter()
                    .map(|p| FsEvent::new(p.clone(), EventKind::Deleted).directory(folder))
                    .collect()
            }
            N::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
                [from, to, ..] => {
                    vec![FsEvent::moved(from.clone(), to.clone()).directory(to.is_dir())]
                }
                _ => Vec::new(),
            },
            N::Modify(ModifyKind::Name(RenameMode::From)) => event
                .paths
                .iter()
                .map(|p| FsEvent::new(p.clone(), EventKind::Deleted))
                .collect(),
            N::Modify(ModifyKind::Name(RenameMode::To)) => {
                per_path(&event.paths, EventKind::Created, false)
            }
            N::Modify(_) => per_path(&event.paths, EventKind::Modified, false),
            N::Access(_) | N::Any | N::Other => Vec::new(),
        }
    }
}

fn per_path(paths: &[PathBuf], kind: EventKind, folder: bool) -> Vec<FsEvent> {
    paths
        .iter()
        .map(|p| FsEvent::new(p.clone(), kind).directory(folder || p.is_dir()))
        .collect()
}

impl PartialEq for FsEvent {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.kind == other.kind && self.destination == other.destination
    }
}

impl Eq for FsEvent {}

impl Hash for FsEvent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
        self.kind.hash(state);
        self.destination.hash(state);
    }
}

impl fmt::Display for FsEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = if self.is_directory { "directory" } else { "file" };
        match &self.destination {
            Some(dest) => write!(
                f,
                "{} {what} {} -> {}",
                self.kind,
                self.path.display(),
                dest.display()
            ),
            None => write!(f, "{} {what} {}", self.kind, self.path.display()),
        }
    }
}
