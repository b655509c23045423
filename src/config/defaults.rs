//! System-wide default constants.
//!
//! Grouped by subsystem; the config structs use these as their defaults.

// ============================================================================
// Arrival Watcher
// ============================================================================

/// File name of the canonical slot the reader consumes.
pub const CANONICAL_NAME: &str = "latest.jpg";

/// Directory listing interval when OS notifications are unavailable (ms).
pub const WATCH_POLL_INTERVAL_MS: u64 = 1_000;

/// Duplicate triggers for the same path inside this window are ignored (ms).
///
/// One physical arrival usually fires create + modify (+ rename) events.
pub const DEBOUNCE_WINDOW_MS: u64 = 1_500;

/// Interval between file-size polls while waiting for a writer to finish (ms).
pub const STABILITY_POLL_MS: u64 = 250;

/// Size polls before giving up on stability and proceeding anyway.
///
/// 40 × 250 ms = 10 s.
pub const STABILITY_MAX_POLLS: u32 = 40;

/// Relocation attempts into the canonical slot before abandoning a candidate.
pub const RELOCATE_ATTEMPTS: u32 = 10;

/// Fixed backoff between relocation attempts (ms).
pub const RELOCATE_BACKOFF_MS: u64 = 500;

// ============================================================================
// Gauge Reader
// ============================================================================

/// Reader/controller tick interval (ms).
pub const TICK_INTERVAL_MS: u64 = 1_000;

/// Value written and used in archive names when no needle is found.
pub const NO_READING_SENTINEL: f64 = -1.0;

/// Seed for the line detector's point ordering. Fixed so repeated runs on
/// the same frame return segments in the same order.
pub const LINE_DETECTOR_SEED: u64 = 0x6A09_E667_F3BC_C908;

/// Scale applied to each half of the composite display frame.
pub const COMPOSITE_SCALE: f32 = 0.7;

/// Needle overlay thickness (px).
pub const NEEDLE_THICKNESS: i32 = 2;

/// Frame border thickness (px).
pub const BORDER_THICKNESS: u32 = 5;
