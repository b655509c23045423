//! Filesystem event types produced by the watcher's discovery sources

use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Kind of filesystem notification that surfaced a path.
///
/// Notification backends and the polling fallback both reduce to these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsEventKind {
    Created,
    Modified,
    /// A file was renamed/moved into the watched directory
    RenamedInto,
    /// Unchanged since the previous directory poll but still waiting
    StillPresent,
}

impl std::fmt::Display for FsEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FsEventKind::Created => write!(f, "created"),
            FsEventKind::Modified => write!(f, "modified"),
            FsEventKind::RenamedInto => write!(f, "renamed-into"),
            FsEventKind::StillPresent => write!(f, "still-present"),
        }
    }
}

/// A single file-system event dispatched to the watcher's handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
}

impl FsEvent {
    pub fn new(kind: FsEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// A path the watcher decided to hand off to the canonical slot.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    /// Absolute path of the arriving file
    pub path: PathBuf,
    pub first_seen: DateTime<Utc>,
    /// Size at the most recent stability poll (`None` if it could not be read)
    pub last_size: Option<u64>,
}

impl CandidateFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            first_seen: Utc::now(),
            last_size: None,
        }
    }

    /// File name for log lines.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(|| self.path.display().to_string(), |n| n.to_string_lossy().into_owned())
    }
}
