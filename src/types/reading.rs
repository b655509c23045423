//! Reader outputs: the per-cycle reading and the archived image record

use chrono::{DateTime, Local, Utc};
use image::RgbImage;
use std::path::{Path, PathBuf};

use crate::config::defaults::NO_READING_SENTINEL;

/// Calibrated result of one processing cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// Calibrated, clamped and rounded gauge value
    Value(f64),
    /// No usable needle line in the frame
    NoReading,
}

impl Reading {
    /// The calibrated value, if any.
    pub fn value(&self) -> Option<f64> {
        match self {
            Reading::Value(v) => Some(*v),
            Reading::NoReading => None,
        }
    }

    /// Value with `NoReading` mapped to the sentinel, as written to disk.
    pub fn as_sentinel(&self) -> f64 {
        self.value().unwrap_or(NO_READING_SENTINEL)
    }

    pub fn is_no_reading(&self) -> bool {
        matches!(self, Reading::NoReading)
    }
}

/// Values always carry a decimal point (`120.0`, `59.56`); the sentinel is
/// written bare (`-1`). Archive consumers parse file names in this form.
impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reading::Value(v) if v.fract() == 0.0 => write!(f, "{v:.1}"),
            Reading::Value(v) => write!(f, "{v}"),
            Reading::NoReading => write!(f, "{NO_READING_SENTINEL}"),
        }
    }
}

/// Everything one reader cycle produced. Consumed once by the controller.
#[derive(Debug, Clone)]
pub struct ReadingEvent {
    pub reading: Reading,
    /// Needle angle in degrees clockwise from up, when a tip was found
    pub angle: Option<f64>,
    /// Frame for display (needle overlay, border, optional composite)
    pub annotated: RgbImage,
    /// When the source image was placed in the canonical slot
    pub source_timestamp: DateTime<Utc>,
    /// Archive entry for the source image; `None` if archival failed
    pub archive: Option<ArchiveRecord>,
}

/// Operator verdict on an archived reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityLabel {
    Good,
    Bad,
}

impl QualityLabel {
    /// Suffix appended to the archive file stem.
    pub fn suffix(&self) -> &'static str {
        match self {
            QualityLabel::Good => "GOOD",
            QualityLabel::Bad => "BAD",
        }
    }
}

impl std::fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.suffix())
    }
}

/// An archived source image, named from its reading and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveRecord {
    pub path: PathBuf,
    pub reading: Reading,
    pub timestamp: DateTime<Local>,
    /// Set once by an operator relabel; never cleared
    pub label: Option<QualityLabel>,
}

impl ArchiveRecord {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
