//! Alert state and the payload handed to the renderer each tick

use image::RgbImage;
use std::sync::Arc;

// ============================================================================
// Alert State
// ============================================================================

/// Classification of the latest reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum AlertPhase {
    /// No reading classified yet
    #[default]
    Idle,
    /// Within the sanity band and at or below the threshold
    Ok,
    /// Within the sanity band and above the threshold
    Warn,
    /// Outside the sanity band (camera/lighting artifact)
    Invalid,
}

impl std::fmt::Display for AlertPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertPhase::Idle => write!(f, "Idle"),
            AlertPhase::Ok => write!(f, "OK"),
            AlertPhase::Warn => write!(f, "Warn"),
            AlertPhase::Invalid => write!(f, "Invalid"),
        }
    }
}

/// Process-wide alert state, mutated only by the Alert Controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertState {
    pub phase: AlertPhase,
    /// Latched after a successful work-order publish
    pub work_order_sent: bool,
    pub threshold: f64,
}

impl AlertState {
    pub fn new(threshold: f64) -> Self {
        Self {
            phase: AlertPhase::Idle,
            work_order_sent: false,
            threshold,
        }
    }
}

// ============================================================================
// Display
// ============================================================================

/// Colour of the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusColor {
    #[default]
    Black,
    Green,
    Red,
    Blue,
    Orange,
}

/// What the renderer shows after a tick or an operator command.
#[derive(Debug, Clone)]
pub struct DisplayFrame {
    pub display_value: String,
    /// `None` when only the status line changed
    pub annotated: Option<Arc<RgbImage>>,
    pub status_text: String,
    pub status_color: StatusColor,
    pub clear_enabled: bool,
}

// ============================================================================
// Operator Commands
// ============================================================================

/// Commands the renderer sends back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    ClearAlert,
    MarkGood,
    MarkBad,
    /// Raw operator input; validated by the controller
    SetThreshold(String),
    Exit,
}
