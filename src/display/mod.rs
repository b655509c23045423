//! Renderer collaborator.
//!
//! The pipeline hands every `DisplayFrame` to a `Renderer`. The shipped
//! renderer is headless: it logs the status line and, when configured,
//! writes the annotated frame to a file another viewer can poll.

pub mod commands;

pub use commands::{forward_commands, parse_command, spawn_stdin_commands};

use std::path::PathBuf;
use tracing::{info, warn};

use crate::types::{DisplayFrame, StatusColor};

pub trait Renderer: Send {
    fn render(&mut self, frame: &DisplayFrame);
}

#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    display_image: Option<PathBuf>,
}

impl HeadlessRenderer {
    pub fn new(display_image: Option<PathBuf>) -> Self {
        Self { display_image }
    }
}

impl Renderer for HeadlessRenderer {
    fn render(&mut self, frame: &DisplayFrame) {
        // One log line per frame; multi-line status text is flattened.
        let status = frame.status_text.replace('\n', " | ");
        match frame.status_color {
            StatusColor::Red | StatusColor::Orange => warn!(
                value = %frame.display_value,
                color = ?frame.status_color,
                clear_enabled = frame.clear_enabled,
                "{status}"
            ),
            _ => info!(
                value = %frame.display_value,
                color = ?frame.status_color,
                clear_enabled = frame.clear_enabled,
                "{status}"
            ),
        }

        if let (Some(path), Some(image)) = (&self.display_image, &frame.annotated) {
            if let Err(e) = image.save(path) {
                warn!(path = %path.display(), error = %e, "Failed to write display image");
            }
        }
    }
}
