//! Bedtime story generation.
//!
//! Wraps [`ChatClient`] with the fixed prompt, the retry policy and the
//! request metrics. In mock mode no client is built and no call is made.

use crate::client::ChatClient;
use crate::config::Settings;
use crate::error::{BedtimeError, Result};
use crate::metrics::Metrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Prompt sent to the chat API.
pub const PROMPT: &str = "Write a one-sentence bedtime story about a unicorn.";

/// Story returned in mock mode.
pub const MOCK_STORY: &str = "Once upon a time, in a land of code, there was a sleeping unicorn.";

/// Generates one story per call, recording metrics as it goes.
#[derive(Debug, Clone)]
pub struct StoryGenerator {
    settings: Settings,
    metrics: Arc<Metrics>,
}

impl StoryGenerator {
    /// Create a generator from settings. No network activity happens here.
    pub fn new(settings: &Settings, metrics: Arc<Metrics>) -> Self {
        Self {
            settings: settings.clone(),
            metrics,
        }
    }

    /// Produce a story, or the canned one when `mock` is set.
    ///
    /// Counts one request and one latency observation per call, and one
    /// error if the final outcome is a failure.
    pub async fn generate(&self, mock: bool) -> Result<String> {
        self.metrics.record_request();
        let start = Instant::now();

        let result = if mock {
            info!("Mock mode enabled, returning canned story");
            Ok(MOCK_STORY.to_string())
        } else {
            self.request_story().await
        };

        self.metrics.observe_latency(start.elapsed());

        if let Err(e) = &result {
            self.metrics.record_error();
            error!(error = %e, kind = ?e.kind(), "Story generation failed");
        }

        result
    }

    async fn request_story(&self) -> Result<String> {
        let client = ChatClient::new(&self.settings)?;
        let start = Instant::now();
        let (story, attempts) = self
            .settings
            .retry
            .run(BedtimeError::is_transient, |_| client.complete(PROMPT))
            .await?;

        info!(
            attempts,
            latency_ms = start.elapsed().as_millis() as u64,
            "Story received"
        );
        Ok(story)
    }
}
