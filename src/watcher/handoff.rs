//! Stability wait and relocation into the canonical slot.
//!
//! Both loops are bounded and report a result instead of failing: a file
//! that never settles is handed off anyway, and a relocation that keeps
//! failing is abandoned with a warning.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::slot::SharedState;

/// Relocation failures. Never fatal; the candidate is dropped.
#[derive(Debug, thiserror::Error)]
pub enum RelocationError {
    #[error("source {0} no longer exists")]
    SourceMissing(PathBuf),
    #[error("moving {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("relocation task failed: {0}")]
    Task(String),
}

/// How the size poll ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityOutcome {
    /// Two consecutive polls agreed on a non-zero size
    Stable { size: u64 },
    /// Poll budget exhausted; proceed anyway
    TimedOut { last_size: Option<u64> },
}

/// How the relocation loop ended.
#[derive(Debug)]
pub enum RelocationOutcome {
    Relocated { attempts: u32 },
    Exhausted { attempts: u32, error: RelocationError },
}

/// Bounded retry settings for the hand-off.
#[derive(Debug, Clone, Copy)]
pub struct HandoffSettings {
    pub stability_interval: Duration,
    pub stability_max_polls: u32,
    pub relocate_attempts: u32,
    pub relocate_backoff: Duration,
}

impl HandoffSettings {
    pub fn from_config(config: &crate::config::WatchConfig) -> Self {
        Self {
            stability_interval: config.stability_interval(),
            stability_max_polls: config.stability_max_polls,
            relocate_attempts: config.relocate_attempts,
            relocate_backoff: config.relocate_backoff(),
        }
    }
}

/// Poll the file size until two consecutive reads agree on a non-zero size.
pub async fn wait_for_stable(path: &Path, interval: Duration, max_polls: u32) -> StabilityOutcome {
    let mut prev: Option<u64> = None;

    for _ in 0..max_polls {
        let size = tokio::fs::metadata(path).await.ok().map(|m| m.len());
        if let (Some(now), Some(before)) = (size, prev) {
            if now > 0 && now == before {
                return StabilityOutcome::Stable { size: now };
            }
        }
        prev = size;
        tokio::time::sleep(interval).await;
    }

    StabilityOutcome::TimedOut { last_size: prev }
}

/// Move `src` into the canonical slot, retrying with a fixed backoff.
///
/// A vanished source ends the loop immediately: retrying cannot help and
/// the slot has not been touched.
pub async fn relocate_with_retry(
    shared: &Arc<SharedState>,
    src: &Path,
    attempts: u32,
    backoff: Duration,
) -> RelocationOutcome {
    let mut last_error = RelocationError::Task("no relocation attempted".to_string());

    for attempt in 1..=attempts.max(1) {
        let task_shared = Arc::clone(shared);
        let task_src = src.to_path_buf();
        // Filesystem work under the slot lock stays off the async workers.
        let result = tokio::task::spawn_blocking(move || task_shared.slot.replace_with(&task_src))
            .await
            .unwrap_or_else(|e| Err(RelocationError::Task(e.to_string())));

        match result {
            Ok(()) => return RelocationOutcome::Relocated { attempts: attempt },
            Err(e @ RelocationError::SourceMissing(_)) => {
                return RelocationOutcome::Exhausted {
                    attempts: attempt,
                    error: e,
                };
            }
            Err(e) => {
                warn!(path = %src.display(), attempt, error = %e, "Move attempt failed");
                last_error = e;
                if attempt < attempts {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    RelocationOutcome::Exhausted {
        attempts: attempts.max(1),
        error: last_error,
    }
}

/// Rename `src` to `dst`, falling back to copy-then-delete when a plain
/// rename is impossible (e.g. across filesystems).
pub fn move_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    let rename_err = match std::fs::rename(src, dst) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    if !src.exists() {
        return Err(rename_err);
    }

    debug!(src = %src.display(), dst = %dst.display(), error = %rename_err, "Rename failed, trying copy");
    if std::fs::copy(src, dst).is_err() {
        let _ = std::fs::remove_file(dst);
        return Err(rename_err);
    }
    if let Err(e) = std::fs::remove_file(src) {
        // Two copies are worse than none; undo the copy.
        let _ = std::fs::remove_file(dst);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::{CanonicalSlot, DebounceMap};
    use std::fs;

    fn shared_in(dir: &Path) -> Arc<SharedState> {
        Arc::new(SharedState::new(
            CanonicalSlot::new(dir.join("latest.jpg")),
            DebounceMap::new(Duration::from_millis(1500)),
        ))
    }

    #[tokio::test]
    async fn test_stable_file_detected() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("a.jpg");
        fs::write(&p, vec![7u8; 1024]).unwrap();

        let outcome = wait_for_stable(&p, Duration::from_millis(5), 10).await;

        assert_eq!(outcome, StabilityOutcome::Stable { size: 1024 });
    }

    #[tokio::test]
    async fn test_empty_file_never_stable() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("empty.jpg");
        fs::write(&p, b"").unwrap();

        let outcome = wait_for_stable(&p, Duration::from_millis(2), 4).await;

        assert_eq!(outcome, StabilityOutcome::TimedOut { last_size: Some(0) });
    }

    #[tokio::test]
    async fn test_missing_file_times_out_without_size() {
        let tmp = tempfile::tempdir().unwrap();
        let outcome = wait_for_stable(&tmp.path().join("nope.jpg"), Duration::from_millis(2), 3).await;
        assert_eq!(outcome, StabilityOutcome::TimedOut { last_size: None });
    }

    #[tokio::test]
    async fn test_relocate_succeeds_first_attempt() {
        let tmp = tempfile::tempdir().unwrap();
        let shared = shared_in(tmp.path());
        let src = tmp.path().join("a.jpg");
        fs::write(&src, b"img").unwrap();

        let outcome = relocate_with_retry(&shared, &src, 6, Duration::from_millis(5)).await;

        assert!(matches!(outcome, RelocationOutcome::Relocated { attempts: 1 }));
        assert!(shared.slot.is_ready());
    }

    #[tokio::test]
    async fn test_relocate_missing_source_gives_up_immediately() {
        let tmp = tempfile::tempdir().unwrap();
        let shared = shared_in(tmp.path());

        let outcome =
            relocate_with_retry(&shared, &tmp.path().join("gone.jpg"), 6, Duration::from_millis(5)).await;

        match outcome {
            RelocationOutcome::Exhausted { attempts, error } => {
                assert_eq!(attempts, 1);
                assert!(matches!(error, RelocationError::SourceMissing(_)));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert!(!shared.slot.is_ready());
    }

    #[tokio::test]
    async fn test_relocate_into_unwritable_target_exhausts_retries() {
        let tmp = tempfile::tempdir().unwrap();
        // Canonical slot inside a directory that does not exist: every move fails.
        let shared = Arc::new(SharedState::new(
            CanonicalSlot::new(tmp.path().join("missing_dir").join("latest.jpg")),
            DebounceMap::new(Duration::from_millis(1500)),
        ));
        let src = tmp.path().join("a.jpg");
        fs::write(&src, b"img").unwrap();

        let outcome = relocate_with_retry(&shared, &src, 3, Duration::from_millis(1)).await;

        assert!(matches!(outcome, RelocationOutcome::Exhausted { attempts: 3, .. }));
        assert!(src.exists(), "abandoned candidate stays where it was");
    }

    #[test]
    fn test_move_file_renames() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        fs::write(&a, b"1").unwrap();
        move_file(&a, &b).unwrap();
        assert!(!a.exists());
        assert_eq!(fs::read(&b).unwrap(), b"1");
    }
}
