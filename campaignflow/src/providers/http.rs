//! Streaming HTTP provider for the Anthropic messages API.

use super::{ModelProvider, TokenStream};
use crate::client::{FrameDecoder, SseFrame};
use crate::errors::ProviderError;
use async_trait::async_trait;
use futures::{future, stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error};

/// Configuration of [`AnthropicProvider`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Messages endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Value of the `anthropic-version` header.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Connect timeout in seconds. The stream itself is not bounded here;
    /// use the pipeline's stage timeout for that.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: f64,
    /// API key.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

fn default_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_model() -> String {
    "claude-3-5-sonnet-latest".to_string()
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

fn default_connect_timeout() -> f64 {
    10.0
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            model: default_model(),
            api_version: default_api_version(),
            connect_timeout_seconds: default_connect_timeout(),
            api_key: None,
        }
    }
}

impl ProviderConfig {
    /// Reads the key from `ANTHROPIC_API_KEY` and the model from
    /// `CAMPAIGNFLOW_MODEL`.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model: std::env::var("CAMPAIGNFLOW_MODEL").unwrap_or(defaults.model),
            api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            ..defaults
        }
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Gets the connect timeout as a Duration.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.connect_timeout_seconds.max(0.0))
    }
}

/// Streams completions from the Anthropic messages API.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Creates a provider.
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_none() {
            return Err(ProviderError::Request("no API key configured".to_string()));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        Ok(Self { config, client })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn request_body(&self, prompt: &str, max_tokens: u32) -> Value {
        json!({
            "model": self.config.model,
            "max_tokens": max_tokens,
            "stream": true,
            "messages": [{"role": "user", "content": prompt}],
        })
    }
}

/// Reads the text delta carried by one provider frame.
///
/// Frames other than text deltas and errors yield `Ok(None)`.
pub fn delta_from_frame(frame: &SseFrame) -> Result<Option<String>, ProviderError> {
    match frame.event.as_str() {
        "content_block_delta" => {
            let data: Value = serde_json::from_str(&frame.data)
                .map_err(|e| ProviderError::Stream(format!("bad delta frame: {e}")))?;
            let delta = &data["delta"];
            if delta["type"] != "text_delta" {
                return Ok(None);
            }
            Ok(delta["text"].as_str().map(str::to_string))
        }
        "error" => {
            let message = serde_json::from_str::<Value>(&frame.data)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or_else(|| frame.data.clone());
            Err(ProviderError::Stream(message))
        }
        _ => Ok(None),
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    async fn stream_completion(
        &self,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<TokenStream, ProviderError> {
        let api_key = self.config.api_key.as_deref().unwrap_or_default();
        debug!(model = %self.config.model, max_tokens, "Sending streaming request");

        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.config.api_version)
            .json(&self.request_body(prompt, max_tokens))
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body: String = response.text().await.unwrap_or_default().chars().take(500).collect();
            error!(status = status.as_u16(), "Model provider returned an error");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let deltas = response
            .bytes_stream()
            .scan(FrameDecoder::new(), |decoder, chunk| {
                let items: Vec<Result<String, ProviderError>> = match chunk {
                    Ok(bytes) => decoder
                        .feed(&bytes)
                        .iter()
                        .filter_map(|frame| delta_from_frame(frame).transpose())
                        .collect(),
                    Err(e) => vec![Err(ProviderError::Stream(e.to_string()))],
                };
                future::ready(Some(items))
            })
            .flat_map(stream::iter);

        Ok(Box::pin(deltas))
    }
}
