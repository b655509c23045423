//! Arrival Watcher
//!
//! Watches one directory for arriving gauge images and hands each one off to
//! the canonical slot:
//!
//! ```text
//! EventSource ─▶ run() ─▶ dispatch() ─spawn─▶ handle_candidate()
//!                                               1. debounce
//!                                               2. stability wait (bounded)
//!                                               3. relocate under slot lock (bounded retries)
//!                                               4. ready flag raised
//! ```
//!
//! Every candidate runs on its own task so slow I/O and retry sleeps never
//! hold up the discovery loop.

mod debounce;
mod handoff;
mod slot;
pub mod source;

pub use debounce::{DebounceDecision, DebounceMap};
pub use handoff::{
    move_file, relocate_with_retry, wait_for_stable, HandoffSettings, RelocationError,
    RelocationOutcome, StabilityOutcome,
};
pub use slot::{CanonicalSlot, SharedState, SlotState};
pub use source::{EventSource, NotifySource, PollingSource};

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{WatchConfig, WatchMode};
use crate::types::{CandidateFile, FsEvent};

/// Why a trigger was not handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Wrong directory, wrong extension, or the canonical file itself
    NotCandidate,
    Debounced,
    InFlight,
}

/// Final fate of one trigger.
#[derive(Debug)]
pub enum ArrivalOutcome {
    Skipped(SkipReason),
    /// Size settled and the file was relocated
    Success { attempts: u32 },
    /// Size never settled; relocated anyway
    TimedOutButProceeded { attempts: u32 },
    /// Relocation gave up; the candidate is dropped
    ExhaustedRetries { attempts: u32, error: RelocationError },
}

impl ArrivalOutcome {
    pub fn is_relocated(&self) -> bool {
        matches!(
            self,
            ArrivalOutcome::Success { .. } | ArrivalOutcome::TimedOutButProceeded { .. }
        )
    }
}

/// Filters triggers and runs the hand-off for each candidate.
#[derive(Debug, Clone)]
pub struct ArrivalWatcher {
    dir: PathBuf,
    canonical_name: String,
    extensions: Vec<String>,
    settings: HandoffSettings,
    shared: Arc<SharedState>,
}

impl ArrivalWatcher {
    /// Build a watcher for `config.dir`, which must exist.
    pub fn new(config: &WatchConfig, shared: Arc<SharedState>) -> std::io::Result<Self> {
        let dir = std::fs::canonicalize(&config.dir)?;
        Ok(Self {
            dir,
            canonical_name: config.canonical_name.clone(),
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            settings: HandoffSettings::from_config(config),
            shared,
        })
    }

    /// Canonicalized watched directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Absolute candidate path for `path`, or `None` if it is not one.
    ///
    /// A candidate sits directly in the watched directory, has an accepted
    /// extension, and is not the canonical file.
    pub fn candidate_path(&self, path: &Path) -> Option<PathBuf> {
        let name = path.file_name()?;
        if name.to_string_lossy() == self.canonical_name {
            return None;
        }

        let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
        if !self.extensions.iter().any(|e| *e == ext) {
            return None;
        }

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let parent = std::fs::canonicalize(parent).ok()?;
        (parent == self.dir).then(|| self.dir.join(name))
    }

    /// Start handling `event` on its own task. Returns `None` for
    /// non-candidates so callers can tell nothing was spawned.
    pub fn dispatch(&self, event: FsEvent) -> Option<JoinHandle<ArrivalOutcome>> {
        let path = self.candidate_path(&event.path)?;
        debug!(kind = %event.kind, path = %path.display(), "Dispatching candidate");
        let watcher = self.clone();
        Some(tokio::spawn(async move { watcher.handle_candidate(path).await }))
    }

    /// Debounce, wait for the writer to finish, and relocate into the slot.
    pub async fn handle_candidate(&self, path: PathBuf) -> ArrivalOutcome {
        let Some(path) = self.candidate_path(&path) else {
            return ArrivalOutcome::Skipped(SkipReason::NotCandidate);
        };

        match self.shared.debounce.check_and_mark(&path, Instant::now()) {
            DebounceDecision::Accept => {}
            DebounceDecision::Duplicate => return ArrivalOutcome::Skipped(SkipReason::Debounced),
            DebounceDecision::InFlight => return ArrivalOutcome::Skipped(SkipReason::InFlight),
        }

        let mut candidate = CandidateFile::new(path);
        let outcome = self.hand_off(&mut candidate).await;
        self.shared.debounce.complete(&candidate.path, Instant::now());
        debug!(tracked = self.shared.debounce.tracked(), "Debounce entries after hand-off");
        outcome
    }

    async fn hand_off(&self, candidate: &mut CandidateFile) -> ArrivalOutcome {
        let name = candidate.display_name();
        info!(file = %name, "📥 Detected candidate");

        let stability = wait_for_stable(
            &candidate.path,
            self.settings.stability_interval,
            self.settings.stability_max_polls,
        )
        .await;
        let timed_out = match stability {
            StabilityOutcome::Stable { size } => {
                candidate.last_size = Some(size);
                false
            }
            StabilityOutcome::TimedOut { last_size } => {
                candidate.last_size = last_size;
                warn!(file = %name, last_size = ?last_size, "Size not stable; proceeding anyway");
                true
            }
        };

        match relocate_with_retry(
            &self.shared,
            &candidate.path,
            self.settings.relocate_attempts,
            self.settings.relocate_backoff,
        )
        .await
        {
            RelocationOutcome::Relocated { attempts } => {
                info!(
                    file = %name,
                    target = %self.shared.slot.path().display(),
                    attempts,
                    elapsed_ms = (Utc::now() - candidate.first_seen).num_milliseconds(),
                    "Moved candidate into canonical slot"
                );
                if timed_out {
                    ArrivalOutcome::TimedOutButProceeded { attempts }
                } else {
                    ArrivalOutcome::Success { attempts }
                }
            }
            RelocationOutcome::Exhausted { attempts, error } => {
                warn!(file = %name, attempts, error = %error, "Failed to move candidate; dropping it");
                ArrivalOutcome::ExhaustedRetries { attempts, error }
            }
        }
    }

    /// Open the discovery source for `mode`.
    ///
    /// `Auto` prefers OS notifications and degrades to polling when the
    /// notification backend cannot be set up.
    pub fn open_source(
        &self,
        mode: WatchMode,
        poll_interval: std::time::Duration,
    ) -> notify::Result<Box<dyn EventSource>> {
        match mode {
            WatchMode::Poll => Ok(Box::new(PollingSource::new(&self.dir, poll_interval))),
            WatchMode::Events => Ok(Box::new(NotifySource::new(&self.dir)?)),
            WatchMode::Auto => match NotifySource::new(&self.dir) {
                Ok(source) => Ok(Box::new(source)),
                Err(e) => {
                    warn!(error = %e, "Filesystem notifications unavailable, falling back to polling");
                    Ok(Box::new(PollingSource::new(&self.dir, poll_interval)))
                }
            },
        }
    }

    /// Discovery loop: runs until the source closes or `cancel` fires.
    /// Candidate tasks are fire-and-forget.
    pub async fn run(self, mut source: Box<dyn EventSource>, cancel: CancellationToken) {
        info!(dir = %self.dir.display(), source = source.source_name(), "👀 Arrival watcher started");

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[ArrivalWatcher] Shutdown signal received");
                    break;
                }
                event = source.next_event() => event,
            };

            match event {
                Some(event) => {
                    // Detached; the outcome is logged inside the task.
                    let _ = self.dispatch(event);
                }
                None => {
                    warn!("[ArrivalWatcher] Event source closed");
                    break;
                }
            }
        }
    }
}
