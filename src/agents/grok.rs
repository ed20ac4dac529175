//! Grok API client
//!
//! Thin wrapper over xAI's OpenAI-compatible chat-completions endpoint, used
//! by the LLM trader and the headline enricher.

use crate::config::GrokSettings;
use crate::error::{ArenaError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Grok API message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrokMessage {
    pub role: String,
    pub content: String,
}

impl GrokMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct GrokRequest<'a> {
    model: &'a str,
    messages: &'a [GrokMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Deserialize)]
struct GrokResponse {
    choices: Vec<GrokChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct GrokChoice {
    message: GrokMessage,
}

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Ask for a JSON object response
    pub json: bool,
}

pub struct GrokClient {
    settings: GrokSettings,
    http: Client,
}

impl GrokClient {
    pub fn new(settings: GrokSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ArenaError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { settings, http })
    }

    /// Check if client is properly configured
    pub fn is_configured(&self) -> bool {
        self.settings
            .api_key
            .as_deref()
            .map(|k| !k.is_empty())
            .unwrap_or(false)
    }

    pub fn default_model(&self) -> &str {
        &self.settings.model
    }

    /// Send a conversation and return the first choice's content
    pub async fn chat(&self, messages: &[GrokMessage], opts: &ChatOptions) -> Result<String> {
        let api_key = match self.settings.api_key.as_deref() {
            Some(k) if !k.is_empty() => k,
            _ => return Err(ArenaError::Internal("Grok API key not configured".to_string())),
        };

        let model = opts.model.as_deref().unwrap_or(&self.settings.model);
        debug!(model, messages = messages.len(), "Sending request to Grok API");

        let request = GrokRequest {
            model,
            messages,
            temperature: opts.temperature,
            max_tokens: opts.max_tokens.or(Some(1000)),
            response_format: opts.json.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let url = format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Grok API error: {} - {}", status, body);
            return Err(ArenaError::Internal(format!(
                "Grok API error: {} - {}",
                status, body
            )));
        }

        let grok_response: GrokResponse = response
            .json()
            .await
            .map_err(|e| ArenaError::Internal(format!("Failed to parse Grok response: {}", e)))?;

        let content = grok_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        debug!("Grok response received: {} chars", content.len());
        Ok(content)
    }
}

/// Extract bullet points from a text response
pub fn extract_bullet_points(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| {
            let trimmed = line.trim();
            trimmed.starts_with('-')
                || trimmed.starts_with('•')
                || trimmed.starts_with('*')
                || (trimmed.len() > 2
                    && trimmed.chars().next().is_some_and(|c| c.is_ascii_digit())
                    && trimmed.chars().nth(1) == Some('.'))
        })
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| {
                    c == '-' || c == '•' || c == '*' || c.is_ascii_digit() || c == '.'
                })
                .trim()
                .to_string()
        })
        .filter(|s| !s.is_empty())
        .collect()
}
