//! Fire-and-forget pipeline status notifications.
//!
//! An optional HTTP endpoint receives one JSON event per processed file.
//! Delivery failures are logged and otherwise ignored; the pipeline never
//! blocks or fails on the status sink.

use serde::Serialize;
use tracing::debug;

/// Progress event posted after a file finishes (or is skipped).
#[derive(Debug, Clone, Serialize)]
pub struct StatusEvent {
    pub stage: String,
    pub input: String,
    pub chunk_count: usize,
    pub dimension: usize,
    pub run_tag: String,
}

/// Optional status notification endpoint.
pub struct StatusSink {
    client: reqwest::Client,
    url: Option<String>,
}

impl StatusSink {
    pub fn new(url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    /// No-op sink.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Post the event in a detached task. Never waits, never fails.
    pub fn notify(&self, event: StatusEvent) {
        let Some(url) = self.url.clone() else {
            return;
        };
        let client = self.client.clone();

        tokio::spawn(async move {
            if let Err(e) = client.post(&url).json(&event).send().await {
                debug!(error = %e, "status notification dropped");
            }
        });
    }
}
