//! Shared data structures for the gauge-reading pipeline
//!
//! - Arrival Watcher: `FsEvent`, `CandidateFile`
//! - Gauge Reader: `Reading`, `ReadingEvent`, `ArchiveRecord`
//! - Alert Controller: `AlertPhase`, `AlertState`, `DisplayFrame`, `OperatorCommand`

mod events;
mod reading;
mod state;

pub use events::*;
pub use reading::*;
pub use state::*;
