//! The canonical slot and the state shared between watcher tasks and the tick.
//!
//! One mutex covers both the canonical file on disk and the ready flag. The
//! writer side (`replace_with`) removes/renames under it and the reader side
//! holds the guard for its whole read-then-clear sequence, so a reader never
//! sees a half-placed file and a writer never swaps the file mid-read.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::debounce::DebounceMap;
use super::handoff::{move_file, RelocationError};

/// State guarded together with the canonical file.
#[derive(Debug, Default)]
pub struct SlotState {
    /// A freshly placed image is waiting for the reader
    pub ready: bool,
    /// When the current canonical image was placed
    pub placed_at: Option<DateTime<Utc>>,
    /// File name the current canonical image arrived under
    pub source_name: Option<String>,
}

impl SlotState {
    /// Reader side: mark the slot as consumed.
    pub fn clear(&mut self) {
        self.ready = false;
    }
}

/// The single well-known file the reader consumes.
#[derive(Debug)]
pub struct CanonicalSlot {
    path: PathBuf,
    state: Mutex<SlotState>,
}

impl CanonicalSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(SlotState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Enter the guarded region.
    ///
    /// A panic in another holder does not make the slot unusable; the
    /// flag is a plain bool and stays meaningful.
    pub fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Non-blocking peek used by the tick to skip work when nothing arrived.
    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    /// Writer side: replace the canonical file with `src` and raise the flag.
    ///
    /// A missing source fails before anything in the slot is touched. The
    /// previous canonical file is removed best-effort, then `src` is moved
    /// (not copied) into place.
    pub fn replace_with(&self, src: &Path) -> Result<(), RelocationError> {
        let mut state = self.lock();

        if !src.exists() {
            return Err(RelocationError::SourceMissing(src.to_path_buf()));
        }

        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                debug!(path = %self.path.display(), error = %e, "Could not remove previous canonical image");
            }
        }

        move_file(src, &self.path).map_err(|source| RelocationError::Io {
            path: src.to_path_buf(),
            source,
        })?;

        state.ready = true;
        state.placed_at = Some(Utc::now());
        state.source_name = src.file_name().map(|n| n.to_string_lossy().into_owned());
        Ok(())
    }
}

/// Everything the watcher tasks and the tick handler share.
#[derive(Debug)]
pub struct SharedState {
    pub slot: CanonicalSlot,
    /// Serialized separately from the slot; never held across the slot lock
    pub debounce: DebounceMap,
}

impl SharedState {
    pub fn new(slot: CanonicalSlot, debounce: DebounceMap) -> Self {
        Self { slot, debounce }
    }
}
