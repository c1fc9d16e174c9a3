//! HTTP client for the chat-completion API.
//!
//! One call to [`ChatClient::complete`] is one HTTP request; retries live in
//! [`crate::retry`]. Failures are classified into [`BedtimeError`] variants
//! so the caller can decide what to retry and how to exit.

use crate::config::{API_KEY_VAR, Settings};
use crate::error::{BedtimeError, Result};
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

/// Request body for `POST /chat/completions`.
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    /// Model identifier.
    pub model: &'a str,
    /// Conversation so far.
    pub messages: Vec<ChatMessage<'a>>,
    /// Sampling temperature.
    pub temperature: f32,
}

/// A single message in a chat request.
#[derive(Debug, Serialize)]
pub struct ChatMessage<'a> {
    /// Author role, e.g. `user`.
    pub role: &'static str,
    /// Message text.
    pub content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Thin wrapper over a configured [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: Client,
    url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl ChatClient {
    /// Create a client for the endpoint and credentials in `settings`.
    pub fn new(settings: &Settings) -> Result<Self> {
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", settings.api_key))
            .map_err(|e| BedtimeError::InvalidSetting {
                key: API_KEY_VAR,
                value: "<redacted>".to_string(),
                reason: e.to_string(),
            })?;
        auth.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(settings.timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(BedtimeError::Transport)?;

        Ok(Self {
            client,
            url: settings.chat_completions_url(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            timeout: settings.timeout,
        })
    }

    /// Send `prompt` as a single user message and return the trimmed reply.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        trace!(url = %self.url, model = %self.model, "Sending chat request");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                BedtimeError::Timeout(self.timeout)
            } else {
                BedtimeError::InvalidResponse {
                    message: e.to_string(),
                }
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BedtimeError::InvalidResponse {
                message: "response contained no choices".to_string(),
            })?
            .message
            .content
            .ok_or_else(|| BedtimeError::InvalidResponse {
                message: "first choice has no content".to_string(),
            })?;

        Ok(content.trim().to_string())
    }

    fn classify_transport(&self, error: reqwest::Error) -> BedtimeError {
        if error.is_timeout() {
            BedtimeError::Timeout(self.timeout)
        } else {
            BedtimeError::Transport(error)
        }
    }
}

/// Map a non-success status and its body to an error.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> BedtimeError {
    let message = serde_json::from_str::<ErrorBody>(body).map_or_else(
        |_| truncate(body, 500),
        |parsed| parsed.error.message,
    );

    match status {
        StatusCode::TOO_MANY_REQUESTS => BedtimeError::RateLimited { message },
        _ => BedtimeError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

fn truncate(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
