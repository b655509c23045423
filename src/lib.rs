//! Analogue gauge reader
//!
//! Watches a directory for photos of a dial gauge, reads the needle angle,
//! converts it to a calibrated value and raises a work order when the value
//! crosses the operator threshold.
//!
//! ## Architecture
//!
//! - **Arrival Watcher** ([`watcher`]): race-safe hand-off of arriving files
//!   into a single canonical slot
//! - **Gauge Reader** ([`reader`]): edge detection, probabilistic Hough,
//!   needle/tip selection, angle → value calibration, archival
//! - **Alert Controller** ([`alert`]): sanity band and threshold
//!   classification, edge-triggered work-order publishing, operator labels
//! - **Pipeline** ([`pipeline`]): fixed-interval tick wiring the above to a
//!   [`display::Renderer`]

pub mod alert;
pub mod config;
pub mod display;
pub mod pipeline;
pub mod reader;
pub mod types;
pub mod watcher;

pub use config::GaugeConfig;

pub use types::{
    AlertPhase, AlertState, ArchiveRecord, DisplayFrame, FsEvent, FsEventKind, OperatorCommand,
    QualityLabel, Reading, ReadingEvent, StatusColor,
};

pub use alert::{AlertController, WorkOrderPublisher};
pub use pipeline::{PipelineStats, TickLoop};
pub use reader::GaugeReader;
pub use watcher::{ArrivalOutcome, ArrivalWatcher, CanonicalSlot, DebounceMap, SharedState};
