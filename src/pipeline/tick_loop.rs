//! Fixed-interval tick driving reader → controller → renderer.
//!
//! The tick never waits on watcher activity: it peeks at the ready flag and
//! returns immediately when nothing arrived. Operator commands are handled
//! between ticks on the same task, so controller state has a single owner.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alert::AlertController;
use crate::display::Renderer;
use crate::reader::GaugeReader;
use crate::types::{OperatorCommand, QualityLabel, Reading};
use crate::watcher::SharedState;

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Slot not ready
    Idle,
    /// Reader produced an event (possibly `NoReading`)
    Read(Reading),
    /// Cycle ended without a reading (decode or I/O failure)
    Failed,
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub ticks: u64,
    pub readings: u64,
    pub no_readings: u64,
    pub failures: u64,
    pub frames_rendered: u64,
    pub commands: u64,
}

pub struct TickLoop<R: Renderer> {
    reader: Arc<GaugeReader>,
    controller: AlertController,
    renderer: R,
    shared: Arc<SharedState>,
    commands: mpsc::Receiver<OperatorCommand>,
    tick_interval: Duration,
    cancel_token: CancellationToken,
    stats: PipelineStats,
}

impl<R: Renderer> TickLoop<R> {
    pub fn new(
        reader: GaugeReader,
        controller: AlertController,
        renderer: R,
        shared: Arc<SharedState>,
        commands: mpsc::Receiver<OperatorCommand>,
        tick_interval: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            reader: Arc::new(reader),
            controller,
            renderer,
            shared,
            commands,
            tick_interval,
            cancel_token,
            stats: PipelineStats::default(),
        }
    }

    pub fn controller(&self) -> &AlertController {
        &self.controller
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// One tick: read the slot if ready, classify, render.
    pub async fn tick(&mut self) -> TickOutcome {
        self.stats.ticks += 1;

        if !self.shared.slot.is_ready() {
            debug!("Tick: nothing to read");
            return TickOutcome::Idle;
        }

        let reader = Arc::clone(&self.reader);
        let shared = Arc::clone(&self.shared);
        // Vision work and the slot lock stay off the async workers.
        let result = tokio::task::spawn_blocking(move || reader.process(&shared.slot)).await;

        let event = match result {
            Ok(Ok(Some(event))) => event,
            Ok(Ok(None)) => return TickOutcome::Idle,
            Ok(Err(e)) => {
                warn!(error = %e, "Reader cycle failed");
                self.stats.failures += 1;
                return TickOutcome::Failed;
            }
            Err(e) => {
                warn!(error = %e, "Reader task failed");
                self.stats.failures += 1;
                return TickOutcome::Failed;
            }
        };

        let reading = event.reading;
        if reading.is_no_reading() {
            self.stats.no_readings += 1;
        } else {
            self.stats.readings += 1;
        }

        if let Some(frame) = self.controller.on_reading(event).await {
            self.render(&frame);
        }
        TickOutcome::Read(reading)
    }

    /// Apply an operator command. Returns `false` for `Exit`.
    pub fn handle_command(&mut self, command: OperatorCommand) -> bool {
        self.stats.commands += 1;
        debug!(?command, "Operator command");

        let frame = match command {
            OperatorCommand::ClearAlert => self.controller.clear_alert(),
            OperatorCommand::MarkGood => self.controller.mark_command(QualityLabel::Good),
            OperatorCommand::MarkBad => self.controller.mark_command(QualityLabel::Bad),
            OperatorCommand::SetThreshold(raw) => self.controller.threshold_command(&raw),
            OperatorCommand::Exit => return false,
        };
        self.render(&frame);
        true
    }

    fn render(&mut self, frame: &crate::types::DisplayFrame) {
        self.renderer.render(frame);
        self.stats.frames_rendered += 1;
    }

    /// Run until cancellation or an `Exit` command.
    pub async fn run(mut self) -> PipelineStats {
        info!(interval_ms = self.tick_interval.as_millis() as u64, "Tick loop started");
        let idle = self.controller.idle_frame();
        self.render(&idle);

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Tick loop: shutdown signal received");
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
                cmd = self.commands.recv(), if commands_open => {
                    match cmd {
                        Some(cmd) => {
                            if !self.handle_command(cmd) {
                                info!("Exit requested by operator");
                                self.cancel_token.cancel();
                                break;
                            }
                        }
                        None => commands_open = false,
                    }
                }
            }
        }

        let stats = self.stats;
        info!(
            ticks = stats.ticks,
            readings = stats.readings,
            no_readings = stats.no_readings,
            failures = stats.failures,
            frames = stats.frames_rendered,
            commands = stats.commands,
            "Tick loop stopped"
        );
        stats
    }
}
