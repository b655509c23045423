//! Event source abstraction for file discovery.
//!
//! Provides a unified trait over the two ways new files are discovered:
//! OS notifications (`notify`) and periodic directory listing. Both reduce to
//! the same `FsEvent` stream and both start with a sweep of files already in
//! the directory, so the handler behaves identically either way.

use async_trait::async_trait;
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::types::{FsEvent, FsEventKind};

/// Trait abstracting where file-system events come from.
#[async_trait]
pub trait EventSource: Send + 'static {
    /// Wait for the next event. `None` means the source has shut down.
    async fn next_event(&mut self) -> Option<FsEvent>;

    /// Human-readable name for logging (e.g. "notify", "poll").
    fn source_name(&self) -> &str;
}

// ============================================================================
// Directory Scanning
// ============================================================================

/// Size and mtime of a file, used to diff directory listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

/// Record every regular file directly inside `dir`.
fn scan_dir_files(dir: &Path) -> HashMap<PathBuf, FileStamp> {
    let mut state = HashMap::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Directory listing failed");
            return state;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if let Ok(meta) = entry.metadata() {
            if meta.is_file() {
                state.insert(
                    path,
                    FileStamp {
                        len: meta.len(),
                        modified: meta.modified().ok(),
                    },
                );
            }
        }
    }
    state
}

/// Events describing how `current` differs from `previous`. Deletions are
/// not reported; the handler has nothing to do for them.
fn diff_listings(
    previous: &HashMap<PathBuf, FileStamp>,
    current: &HashMap<PathBuf, FileStamp>,
) -> Vec<FsEvent> {
    let mut events: Vec<FsEvent> = current
        .iter()
        .filter_map(|(path, stamp)| match previous.get(path) {
            None => Some(FsEvent::new(FsEventKind::Created, path.clone())),
            Some(old) if old != stamp => Some(FsEvent::new(FsEventKind::Modified, path.clone())),
            Some(_) => None,
        })
        .collect();
    // HashMap order is arbitrary; keep dispatch order reproducible.
    events.sort_by(|a, b| a.path.cmp(&b.path));
    events
}

/// Files present in both listings with the same stamp.
fn unchanged_files(
    previous: &HashMap<PathBuf, FileStamp>,
    current: &HashMap<PathBuf, FileStamp>,
) -> Vec<FsEvent> {
    let mut events: Vec<FsEvent> = current
        .iter()
        .filter(|(path, stamp)| previous.get(*path) == Some(*stamp))
        .map(|(path, _)| FsEvent::new(FsEventKind::StillPresent, path.clone()))
        .collect();
    events.sort_by(|a, b| a.path.cmp(&b.path));
    events
}

// ============================================================================
// Notify Source
// ============================================================================

/// Map a raw notification to zero or more `FsEvent`s.
pub fn classify_notify_event(event: &Event) -> Vec<FsEvent> {
    let kind = match &event.kind {
        EventKind::Create(CreateKind::Folder) => return Vec::new(),
        EventKind::Create(_) => FsEventKind::Created,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => FsEventKind::RenamedInto,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // paths = [from, to]; only the destination matters
            return event
                .paths
                .get(1)
                .map(|to| vec![FsEvent::new(FsEventKind::RenamedInto, to.clone())])
                .unwrap_or_default();
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => {
            // Some backends cannot tell the two ends apart
            return event
                .paths
                .iter()
                .filter(|p| p.exists())
                .map(|p| FsEvent::new(FsEventKind::RenamedInto, p.clone()))
                .collect();
        }
        EventKind::Modify(ModifyKind::Name(_) | ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(_) => FsEventKind::Modified,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .map(|p| FsEvent::new(kind, p.clone()))
        .collect()
}

/// OS-notification source for one directory (non-recursive).
pub struct NotifySource {
    // Dropping the watcher stops notifications.
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<FsEvent>,
    pending: VecDeque<FsEvent>,
}

impl NotifySource {
    pub fn new(dir: &Path) -> notify::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for fs_event in classify_notify_event(&event) {
                    // Receiver gone means shutdown; nothing to do.
                    let _ = tx.send(fs_event);
                }
            }
            Err(e) => warn!(error = %e, "Filesystem notification error"),
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        let pending = diff_listings(&HashMap::new(), &scan_dir_files(dir)).into();

        Ok(Self {
            _watcher: watcher,
            rx,
            pending,
        })
    }
}

#[async_trait]
impl EventSource for NotifySource {
    async fn next_event(&mut self) -> Option<FsEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        self.rx.recv().await
    }

    fn source_name(&self) -> &str {
        "notify"
    }
}

// ============================================================================
// Polling Source
// ============================================================================

/// Periodic directory listing; the degraded mode when notifications are
/// unavailable. Diffs consecutive listings into `FsEvent`s.
pub struct PollingSource {
    dir: PathBuf,
    interval: Duration,
    last_seen: HashMap<PathBuf, FileStamp>,
    pending: VecDeque<FsEvent>,
    scanned_once: bool,
}

impl PollingSource {
    pub fn new(dir: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            interval,
            last_seen: HashMap::new(),
            pending: VecDeque::new(),
            scanned_once: false,
        }
    }

    fn rescan(&mut self) {
        let current = scan_dir_files(&self.dir);
        let events = diff_listings(&self.last_seen, &current);
        if !events.is_empty() {
            debug!(count = events.len(), "Directory poll found changes");
        }
        self.pending.extend(events);
        // A file skipped as a duplicate, or dropped after failed moves, gets
        // no new stamp. Report it every pass until the watcher takes it.
        self.pending.extend(unchanged_files(&self.last_seen, &current));
        self.last_seen = current;
    }
}

#[async_trait]
impl EventSource for PollingSource {
    async fn next_event(&mut self) -> Option<FsEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            // First listing runs immediately: it is the startup sweep.
            if self.scanned_once {
                tokio::time::sleep(self.interval).await;
            }
            self.scanned_once = true;
            self.rescan();
        }
    }

    fn source_name(&self) -> &str {
        "poll"
    }
}
