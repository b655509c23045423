//! Alert Controller
//!
//! Classifies each reading against the sanity band and the operator
//! threshold, and raises a work order when a reading enters `Warn`:
//!
//! | Reading                           | Phase     | Side effect                          |
//! |-----------------------------------|-----------|--------------------------------------|
//! | NO_READING                        | unchanged | none, display not updated            |
//! | outside `[sanity_min, sanity_max]`| `Invalid` | none                                 |
//! | in band, `<= threshold`           | `Ok`      | work-order latch reset               |
//! | in band, `> threshold`            | `Warn`    | publish once while the latch is open |
//!
//! A publish only latches on success, so a failed publish is retried on the
//! next `Warn` reading. `clear_alert` reopens the latch without touching the
//! last displayed value.

pub mod publisher;

pub use publisher::{DisabledPublisher, HttpPublisher, PublishError, WorkOrderPublisher};

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{AlertConfig, PublishConfig};
use crate::reader::{relabel, ArchiveError};
use crate::types::{
    AlertPhase, AlertState, ArchiveRecord, DisplayFrame, QualityLabel, Reading, ReadingEvent,
    StatusColor,
};

const INVALID_MSG: &str = "Reading appears to be inaccurate\n\
    Reading outside expected range.\n\
    This could be due to shadows or lighting issues.\n\
    Move camera position and try again.";
const WARN_MSG: &str = "Warning! Value exceeds safe working temperature";
const CLEARED_MSG: &str = "Alerts cleared. Monitoring resumed...";

/// Rejected `set_threshold` input. The previous threshold stays in force.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ThresholdError {
    #[error("threshold {0:?} is not a number")]
    NotNumeric(String),
    #[error("threshold {0:?} is not finite")]
    NotFinite(String),
}

/// Parse operator threshold input.
pub fn parse_threshold(raw: &str) -> Result<f64, ThresholdError> {
    let trimmed = raw.trim();
    let value: f64 = trimmed
        .parse()
        .map_err(|_| ThresholdError::NotNumeric(trimmed.to_string()))?;
    if !value.is_finite() {
        return Err(ThresholdError::NotFinite(trimmed.to_string()));
    }
    Ok(value)
}

pub struct AlertController {
    state: AlertState,
    sanity_min: f64,
    sanity_max: f64,
    topic: String,
    publisher: Arc<dyn WorkOrderPublisher>,
    current_archive: Option<ArchiveRecord>,
    display_value: String,
    clear_enabled: bool,
}

impl AlertController {
    pub fn new(
        alert: &AlertConfig,
        publish: &PublishConfig,
        publisher: Arc<dyn WorkOrderPublisher>,
    ) -> Self {
        Self {
            state: AlertState::new(alert.default_threshold),
            sanity_min: alert.sanity_min,
            sanity_max: alert.sanity_max,
            topic: publish.topic.clone(),
            publisher,
            current_archive: None,
            display_value: "Waiting for image...".to_string(),
            clear_enabled: false,
        }
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }

    pub fn current_archive(&self) -> Option<&ArchiveRecord> {
        self.current_archive.as_ref()
    }

    /// Frame shown before the first reading.
    pub fn idle_frame(&self) -> DisplayFrame {
        self.status_frame("System idle...", StatusColor::Black)
    }

    /// Phase for `value` under the current threshold.
    pub fn classify(&self, value: f64) -> AlertPhase {
        if value < self.sanity_min || value > self.sanity_max {
            AlertPhase::Invalid
        } else if value <= self.state.threshold {
            AlertPhase::Ok
        } else {
            AlertPhase::Warn
        }
    }

    /// Consume one reader cycle. `None` means the display is left as is.
    pub async fn on_reading(&mut self, event: ReadingEvent) -> Option<DisplayFrame> {
        // The newest archive is current even when no needle was found.
        self.current_archive = event.archive;

        let value = match event.reading {
            Reading::Value(v) => v,
            Reading::NoReading => return None,
        };

        let phase = self.classify(value);
        self.state.phase = phase;
        self.display_value = format!("Meter Value: {value}");

        let (status_text, status_color, clear_enabled) = match phase {
            AlertPhase::Invalid => (INVALID_MSG.to_string(), StatusColor::Red, true),
            AlertPhase::Ok => {
                self.state.work_order_sent = false;
                (
                    format!("Temperature OK (≤ {})", self.state.threshold),
                    StatusColor::Green,
                    false,
                )
            }
            AlertPhase::Warn => {
                let (text, color) = self.raise_work_order(value).await;
                (text, color, true)
            }
            AlertPhase::Idle => return None,
        };

        self.clear_enabled = clear_enabled;
        Some(DisplayFrame {
            display_value: self.display_value.clone(),
            annotated: Some(Arc::new(event.annotated)),
            status_text,
            status_color,
            clear_enabled,
        })
    }

    async fn raise_work_order(&mut self, value: f64) -> (String, StatusColor) {
        let mut text = WARN_MSG.to_string();

        if !self.publisher.is_available() || self.state.work_order_sent {
            return (text, StatusColor::Red);
        }

        match self.publisher.publish(&self.topic, value).await {
            Ok(()) => {
                self.state.work_order_sent = true;
                info!(topic = %self.topic, value, "Work order published");
                text.push_str("\nInspection work order generated");
                (text, StatusColor::Blue)
            }
            Err(e) => {
                warn!(topic = %self.topic, value, error = %e, "Work order publish failed");
                text.push_str(&format!("\nWork order publish failed: {e}"));
                (text, StatusColor::Orange)
            }
        }
    }

    /// Reopen the work-order latch; the displayed value is kept.
    pub fn clear_alert(&mut self) -> DisplayFrame {
        self.state.work_order_sent = false;
        self.clear_enabled = false;
        info!("Alerts cleared");
        self.status_frame(CLEARED_MSG, StatusColor::Black)
    }

    /// Apply operator threshold input; invalid input keeps the old threshold.
    pub fn set_threshold(&mut self, raw: &str) -> Result<f64, ThresholdError> {
        let threshold = parse_threshold(raw)?;
        self.state.threshold = threshold;
        info!(threshold, "Threshold updated");
        Ok(threshold)
    }

    /// Tag the current archive record with a quality label.
    pub fn mark(&mut self, label: QualityLabel) -> Result<(), ArchiveError> {
        let record = self
            .current_archive
            .as_mut()
            .ok_or(ArchiveError::NoCurrentRecord)?;
        relabel(record, label).map(|_| ())
    }

    /// `set_threshold` with its status line.
    pub fn threshold_command(&mut self, raw: &str) -> DisplayFrame {
        match self.set_threshold(raw) {
            Ok(t) => self.status_frame(&format!("Threshold set to {t}"), StatusColor::Black),
            Err(e) => {
                warn!(error = %e, "Threshold rejected");
                self.status_frame("Invalid threshold value", StatusColor::Red)
            }
        }
    }

    /// `mark` with its status line.
    pub fn mark_command(&mut self, label: QualityLabel) -> DisplayFrame {
        match self.mark(label) {
            Ok(()) => self.status_frame(&format!("File marked as {label}"), StatusColor::Green),
            Err(e) => {
                warn!(label = %label, error = %e, "Relabel failed");
                self.status_frame(&format!("Could not mark file as {label}: {e}"), StatusColor::Red)
            }
        }
    }

    /// Status-only update; value, image and clear button stay as they are.
    fn status_frame(&self, text: &str, color: StatusColor) -> DisplayFrame {
        DisplayFrame {
            display_value: self.display_value.clone(),
            annotated: None,
            status_text: text.to_string(),
            status_color: color,
            clear_enabled: self.clear_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Local, Utc};
    use image::RgbImage;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockPublisher {
        calls: AtomicUsize,
        fail: AtomicBool,
        unavailable: bool,
    }

    #[async_trait]
    impl WorkOrderPublisher for MockPublisher {
        async fn publish(&self, _topic: &str, _value: f64) -> Result<(), PublishError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(PublishError::Unavailable)
            } else {
                Ok(())
            }
        }

        fn is_available(&self) -> bool {
            !self.unavailable
        }
    }

    fn controller(publisher: Arc<MockPublisher>) -> AlertController {
        AlertController::new(&AlertConfig::default(), &PublishConfig::default(), publisher)
    }

    fn event(reading: Reading) -> ReadingEvent {
        ReadingEvent {
            reading,
            angle: None,
            annotated: RgbImage::new(1, 1),
            source_timestamp: Utc::now(),
            archive: None,
        }
    }

    async fn feed(c: &mut AlertController, value: f64) -> DisplayFrame {
        c.on_reading(event(Reading::Value(value))).await.unwrap()
    }

    #[tokio::test]
    async fn test_scenario_band_and_threshold() {
        let p = Arc::new(MockPublisher::default());
        let mut c = controller(p.clone());

        feed(&mut c, 10.0).await;
        assert_eq!(c.state().phase, AlertPhase::Invalid);

        feed(&mut c, 20.0).await;
        assert_eq!(c.state().phase, AlertPhase::Ok);

        let frame = feed(&mut c, 40.0).await;
        assert_eq!(c.state().phase, AlertPhase::Warn);
        assert_eq!(p.calls.load(Ordering::SeqCst), 1);
        assert_eq!(frame.status_color, StatusColor::Blue);
        assert!(frame.clear_enabled);
        assert!(c.state().work_order_sent);
    }

    #[tokio::test]
    async fn test_edge_triggered_publish() {
        let p = Arc::new(MockPublisher::default());
        let mut c = controller(p.clone());

        for v in [20.0, 40.0, 40.0, 20.0, 40.0] {
            feed(&mut c, v).await;
        }

        assert_eq!(p.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_held_warn_shows_plain_warning() {
        let p = Arc::new(MockPublisher::default());
        let mut c = controller(p.clone());
        feed(&mut c, 40.0).await;

        let frame = feed(&mut c, 45.0).await;

        assert_eq!(frame.status_text, WARN_MSG);
        assert_eq!(frame.status_color, StatusColor::Red);
    }

    #[tokio::test]
    async fn test_band_edges_are_valid() {
        let mut c = controller(Arc::new(MockPublisher::default()));
        feed(&mut c, 15.0).await;
        assert_eq!(c.state().phase, AlertPhase::Ok);
        feed(&mut c, 66.0).await;
        assert_eq!(c.state().phase, AlertPhase::Warn);
        feed(&mut c, 66.01).await;
        assert_eq!(c.state().phase, AlertPhase::Invalid);
    }

    #[tokio::test]
    async fn test_threshold_itself_is_ok() {
        let mut c = controller(Arc::new(MockPublisher::default()));
        let frame = feed(&mut c, 25.0).await;
        assert_eq!(c.state().phase, AlertPhase::Ok);
        assert_eq!(frame.status_text, "Temperature OK (≤ 25)");
        assert!(!frame.clear_enabled);
    }

    #[tokio::test]
    async fn test_failed_publish_downgrades_and_retries() {
        let p = Arc::new(MockPublisher::default());
        p.fail.store(true, Ordering::SeqCst);
        let mut c = controller(p.clone());

        let frame = feed(&mut c, 40.0).await;
        assert_eq!(frame.status_color, StatusColor::Orange);
        assert!(frame.status_text.contains("Work order publish failed"));
        assert!(!c.state().work_order_sent);

        p.fail.store(false, Ordering::SeqCst);
        let frame = feed(&mut c, 41.0).await;
        assert_eq!(frame.status_color, StatusColor::Blue);
        assert_eq!(p.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unavailable_publisher_never_called() {
        let p = Arc::new(MockPublisher {
            unavailable: true,
            ..MockPublisher::default()
        });
        let mut c = controller(p.clone());

        let frame = feed(&mut c, 40.0).await;

        assert_eq!(p.calls.load(Ordering::SeqCst), 0);
        assert_eq!(frame.status_color, StatusColor::Red);
        assert_eq!(frame.status_text, WARN_MSG);
    }

    #[tokio::test]
    async fn test_no_reading_changes_nothing() {
        let p = Arc::new(MockPublisher::default());
        let mut c = controller(p.clone());
        feed(&mut c, 40.0).await;
        let before = *c.state();

        assert!(c.on_reading(event(Reading::NoReading)).await.is_none());

        assert_eq!(*c.state(), before);
        assert_eq!(p.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_does_not_reset_latch() {
        let p = Arc::new(MockPublisher::default());
        let mut c = controller(p.clone());
        feed(&mut c, 40.0).await;
        feed(&mut c, 90.0).await;
        feed(&mut c, 40.0).await;
        assert_eq!(p.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_alert_reopens_latch_and_keeps_value() {
        let p = Arc::new(MockPublisher::default());
        let mut c = controller(p.clone());
        feed(&mut c, 40.0).await;

        let frame = c.clear_alert();

        assert!(!c.state().work_order_sent);
        assert_eq!(frame.status_text, CLEARED_MSG);
        assert_eq!(frame.display_value, "Meter Value: 40");
        assert!(frame.annotated.is_none());

        feed(&mut c, 40.0).await;
        assert_eq!(p.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_threshold_change_reclassifies() {
        let mut c = controller(Arc::new(MockPublisher::default()));
        assert_eq!(c.set_threshold(" 45 "), Ok(45.0));
        feed(&mut c, 40.0).await;
        assert_eq!(c.state().phase, AlertPhase::Ok);
    }

    #[test]
    fn test_invalid_threshold_keeps_previous() {
        let mut c = controller(Arc::new(MockPublisher::default()));

        assert_eq!(
            c.set_threshold("abc"),
            Err(ThresholdError::NotNumeric("abc".to_string()))
        );
        assert!(matches!(c.set_threshold("inf"), Err(ThresholdError::NotFinite(_))));
        assert_eq!(c.state().threshold, 25.0);

        let frame = c.threshold_command("");
        assert_eq!(frame.status_color, StatusColor::Red);
        assert_eq!(c.state().threshold, 25.0);
    }

    #[tokio::test]
    async fn test_mark_current_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("latest_40_20240115_143052.jpg");
        std::fs::write(&path, b"x").unwrap();
        let mut c = controller(Arc::new(MockPublisher::default()));
        let mut ev = event(Reading::Value(40.0));
        ev.archive = Some(ArchiveRecord {
            path,
            reading: Reading::Value(40.0),
            timestamp: Local::now(),
            label: None,
        });
        c.on_reading(ev).await;

        let ok = c.mark_command(QualityLabel::Good);
        assert_eq!(ok.status_text, "File marked as GOOD");
        assert!(tmp.path().join("latest_40_20240115_143052_GOOD.jpg").exists());

        let again = c.mark_command(QualityLabel::Bad);
        assert_eq!(again.status_color, StatusColor::Red);
        assert!(matches!(c.mark(QualityLabel::Bad), Err(ArchiveError::AlreadyLabeled(_))));
    }

    #[test]
    fn test_mark_without_archive_fails_softly() {
        let mut c = controller(Arc::new(MockPublisher::default()));
        assert!(matches!(c.mark(QualityLabel::Good), Err(ArchiveError::NoCurrentRecord)));
        assert_eq!(c.mark_command(QualityLabel::Good).status_color, StatusColor::Red);
    }
}
