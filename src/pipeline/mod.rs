//! Processing Pipeline
//!
//! ```text
//! Arrival Watcher ──(canonical slot + ready flag)──▶ tick
//!                                                     ├─ Gauge Reader
//!                                                     ├─ Alert Controller ──▶ work-order publisher
//!                                                     └─ Renderer
//! operator commands ─────────────────────────────────▶ Alert Controller ──▶ Renderer
//! ```

mod tick_loop;

pub use tick_loop::{PipelineStats, TickLoop, TickOutcome};
