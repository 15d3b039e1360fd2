//! Gemini HTTP backend
//!
//! Posts the rendered prompt to the `models/{model}:generateContent` REST
//! endpoint and concatenates the text parts of the first candidate.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::generator::{CodeGenerator, GenerationRequest, GenerationResult};

/// Default model
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Default REST endpoint
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Upper bound on the error body echoed into diagnostics
const MAX_ERROR_BODY: usize = 512;

/// Connection settings for [`GeminiGenerator`]
#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl GeminiSettings {
    /// Set the API key
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the model name (`gemini-2.5-flash` or `models/gemini-2.5-flash`)
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the REST endpoint
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the per-request HTTP timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Full `generateContent` URL
    #[must_use]
    pub fn url(&self) -> String {
        let model = self.model.strip_prefix("models/").unwrap_or(&self.model);
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            model
        )
    }
}

/// Internal failures of the Gemini backend
///
/// Always flattened into [`GenerationResult::Failure`] at the trait boundary.
#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    /// No credentials configured
    #[error("no API key configured")]
    MissingApiKey,

    /// HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Transport failure
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("Gemini API error {status}: {body}")]
    Status { status: u16, body: String },

    /// The prompt was blocked
    #[error("prompt blocked: {0}")]
    Blocked(String),

    /// The response carried no text
    #[error("completion contained no text (finish reason: {0})")]
    EmptyCompletion(String),
}

/// [`CodeGenerator`] backed by the Gemini REST API
#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    client: Client,
    settings: GeminiSettings,
}

impl GeminiGenerator {
    /// Create a generator
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built
    pub fn new(settings: GeminiSettings) -> Result<Self, GeminiError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(GeminiError::Client)?;
        Ok(Self { client, settings })
    }

    /// Connection settings
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &GeminiSettings {
        &self.settings
    }

    fn build_payload(prompt: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }]
        })
    }

    async fn request(&self, prompt: &str) -> Result<String, GeminiError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(GeminiError::MissingApiKey)?;

        let response = self
            .client
            .post(self.settings.url())
            .header("x-goog-api-key", api_key)
            .json(&Self::build_payload(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(GeminiError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let data: Value = response.json().await?;
        parse_completion(&data)
    }
}

/// Concatenate the text parts of the first candidate
fn parse_completion(data: &Value) -> Result<String, GeminiError> {
    if let Some(reason) = data["promptFeedback"]["blockReason"].as_str() {
        return Err(GeminiError::Blocked(reason.to_string()));
    }

    let candidate = &data["candidates"][0];
    let text: String = candidate["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate["finishReason"]
            .as_str()
            .unwrap_or("none")
            .to_string();
        return Err(GeminiError::EmptyCompletion(reason));
    }
    Ok(text)
}

#[async_trait]
impl CodeGenerator for GeminiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        debug!(
            target = %request.target,
            model = %self.settings.model,
            correction = request.is_correction(),
            "requesting artifact from Gemini"
        );
        match self.request(&request.prompt()).await {
            Ok(text) => GenerationResult::Source(text),
            Err(e) => {
                warn!(target = %request.target, error = %e, "Gemini generation failed");
                GenerationResult::Failure(e.to_string())
            }
        }
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
