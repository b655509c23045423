//! Per-path debounce bookkeeping shared by all candidate tasks.
//!
//! A single arrival usually fires several notifications (create, modify,
//! rename-into). Only the first trigger inside the window is handled, and a
//! path already being handled is never picked up a second time.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Result of asking whether a trigger should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceDecision {
    Accept,
    /// Same path fired inside the debounce window
    Duplicate,
    /// Another task is still handling this path
    InFlight,
}

#[derive(Debug, Default)]
struct DebounceInner {
    last_seen: HashMap<PathBuf, Instant>,
    in_flight: HashSet<PathBuf>,
}

#[derive(Debug)]
pub struct DebounceMap {
    window: Duration,
    inner: Mutex<DebounceInner>,
}

impl DebounceMap {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            inner: Mutex::new(DebounceInner::default()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Decide on a trigger for `path` seen at `now`; on `Accept` the path is
    /// marked in flight until [`complete`](Self::complete) is called.
    pub fn check_and_mark(&self, path: &Path, now: Instant) -> DebounceDecision {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        if inner.in_flight.contains(path) {
            return DebounceDecision::InFlight;
        }
        if let Some(last) = inner.last_seen.get(path) {
            if now.saturating_duration_since(*last) < self.window {
                return DebounceDecision::Duplicate;
            }
        }

        inner.last_seen.insert(path.to_path_buf(), now);
        inner.in_flight.insert(path.to_path_buf());
        DebounceDecision::Accept
    }

    /// Release the in-flight mark and restart the window from `now`.
    pub fn complete(&self, path: &Path, now: Instant) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.in_flight.remove(path);
        inner.last_seen.insert(path.to_path_buf(), now);

        // Entries past the window can never suppress anything again.
        let window = self.window;
        inner
            .last_seen
            .retain(|_, seen| now.saturating_duration_since(*seen) < window);
    }

    /// Number of paths currently tracked (in flight or inside the window).
    pub fn tracked(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.last_seen.len().max(inner.in_flight.len())
    }
}
