//! Gemini client for receipt field structuring.
//!
//! Single-turn calls to the Google Generative Language API. Requires
//! GEMINI_API_KEY; absence is detected when the client is constructed,
//! not on first use.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors from the field structuring layer.
///
/// `Service` faults are transient transport/service problems and may be
/// retried by the caller; `Parse` faults are permanent for a given response
/// and carry the raw text so an operator can review it manually.
#[derive(Debug, Error)]
pub enum StructuringError {
    /// Transport or service fault (connect failure, timeout, HTTP error,
    /// API-reported error). Retryable.
    #[error("Structuring service error: {0}")]
    Service(String),

    /// The response could not be turned into candidate fields.
    /// Non-retryable; `raw` holds the response for manual review.
    #[error("Unparseable structuring response: {reason}")]
    Parse { reason: String, raw: String },

    /// Client misconfiguration, raised at construction time.
    #[error("Structuring configuration error: {0}")]
    Configuration(String),
}

impl StructuringError {
    /// Whether the caller may reasonably retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StructuringError::Service(_))
    }
}

/// Configuration for the Gemini client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API key. Populated from GEMINI_API_KEY, never read from config files.
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Model to use for extraction.
    #[serde(default = "default_model")]
    pub model: String,
    /// API base URL. Overridable for testing.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Request timeout in seconds. The model call is the only
    /// unbounded-latency step in the pipeline, so it is always bounded here.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens in response.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Maximum characters of OCR text to embed in the prompt.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_output_tokens() -> u32 {
    1024
}
fn default_max_content_chars() -> usize {
    12000
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl GeminiConfig {
    /// Create a config with the API key taken from GEMINI_API_KEY.
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("GEMINI_API_KEY").ok().filter(|s| !s.is_empty()),
            model: default_model(),
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            max_content_chars: default_max_content_chars(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Gemini API request format.
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

/// Gemini API response format.
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiApiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiApiError {
    message: String,
}

/// Client for single-turn Gemini generation.
#[derive(Debug)]
pub struct GeminiClient {
    config: GeminiConfig,
    api_key: String,
    client: Client,
}

impl GeminiClient {
    /// Create a new client. Fails fast when the API credential is absent.
    pub fn new(config: GeminiConfig) -> Result<Self, StructuringError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                StructuringError::Configuration(
                    "GEMINI_API_KEY not set. Get an API key from https://ai.google.dev/"
                        .to_string(),
                )
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                StructuringError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    /// Get the config.
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    /// Send a prompt and return the model's text response.
    pub async fn generate(&self, prompt: &str) -> Result<String, StructuringError> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.endpoint, self.config.model, self.api_key
        );

        debug!(
            "Calling {} ({} prompt chars)",
            self.config.model,
            prompt.len()
        );

        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StructuringError::Service(format!(
                        "request timed out after {}s",
                        self.config.timeout_secs
                    ))
                } else {
                    StructuringError::Service(format!("request failed: {}", e))
                }
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| StructuringError::Service(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(StructuringError::Service(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let response: GeminiResponse =
            serde_json::from_str(&body).map_err(|e| StructuringError::Parse {
                reason: format!("malformed API response: {}", e),
                raw: body.clone(),
            })?;

        if let Some(error) = response.error {
            return Err(StructuringError::Service(format!(
                "API error: {}",
                error.message
            )));
        }

        let text = response
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content.parts.into_iter().next())
            .and_then(|p| p.text)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(StructuringError::Parse {
                reason: "empty model response".to_string(),
                raw: body,
            });
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_fails_at_construction() {
        let config = GeminiConfig {
            api_key: None,
            ..GeminiConfig::from_env()
        };
        let err = GeminiClient::new(config).unwrap_err();
        assert!(matches!(err, StructuringError::Configuration(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(StructuringError::Service("503".to_string()).is_retryable());
        assert!(!StructuringError::Parse {
            reason: "no json".to_string(),
            raw: String::new(),
        }
        .is_retryable());
    }

    #[test]
    fn test_default_config() {
        let config = GeminiConfig {
            api_key: None,
            ..GeminiConfig::from_env()
        };
        assert!(config.model.contains("gemini"));
        assert_eq!(config.timeout_secs, 60);
        assert!(config.endpoint.starts_with("https://"));
    }
}
