//! Work-order publish collaborator.
//!
//! The controller only knows the `WorkOrderPublisher` trait. The shipped
//! implementation posts a JSON message to an HTTP bridge in front of the
//! message bus; `DisabledPublisher` stands in when publishing is off.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::PublishConfig;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Bridge returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("Publisher unavailable")]
    Unavailable,
}

#[async_trait]
pub trait WorkOrderPublisher: Send + Sync {
    /// Publish `value` on `topic`. Errors are reported, never retried here.
    async fn publish(&self, topic: &str, value: f64) -> Result<(), PublishError>;

    /// Whether publishing is possible at all. The controller skips
    /// `publish` entirely when this is false.
    fn is_available(&self) -> bool;
}

/// Posts `{topic, value, timestamp}` to the configured bridge endpoint.
#[derive(Clone)]
pub struct HttpPublisher {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpPublisher {
    pub fn new(config: &PublishConfig) -> Result<Self, PublishError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl WorkOrderPublisher for HttpPublisher {
    async fn publish(&self, topic: &str, value: f64) -> Result<(), PublishError> {
        let body = serde_json::json!({
            "topic": topic,
            "value": value,
            "timestamp": Utc::now().to_rfc3339(),
        });

        let resp = self.http.post(&self.endpoint).json(&body).send().await?;

        if resp.status().is_success() {
            debug!(topic, value, "Work order published");
            Ok(())
        } else {
            Err(PublishError::Status(resp.status()))
        }
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Publishing switched off (`--no-publish` or `publish.enabled = false`).
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledPublisher;

#[async_trait]
impl WorkOrderPublisher for DisabledPublisher {
    async fn publish(&self, _topic: &str, _value: f64) -> Result<(), PublishError> {
        Err(PublishError::Unavailable)
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Publisher selected by configuration.
pub fn from_config(config: &PublishConfig) -> Result<Arc<dyn WorkOrderPublisher>, PublishError> {
    if config.enabled {
        Ok(Arc::new(HttpPublisher::new(config)?))
    } else {
        Ok(Arc::new(DisabledPublisher))
    }
}
