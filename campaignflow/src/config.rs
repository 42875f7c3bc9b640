//! Configuration types for the pipeline, the client and logging.
//!
//! Every struct deserializes with defaults for missing keys and can be
//! overlaid with `CAMPAIGNFLOW_*` environment variables via `from_env`.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Server-side pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Minimum time between two `agent_token` events of one stage.
    #[serde(default = "default_token_batch_interval_ms")]
    pub token_batch_interval_ms: u64,
    /// Upper bound for a single stage; `None` waits indefinitely.
    #[serde(default)]
    pub stage_timeout_ms: Option<u64>,
    /// Maximum characters of model output quoted in parse errors.
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
    /// Number of emails generated concurrently.
    #[serde(default = "default_email_batch_size")]
    pub email_batch_size: usize,
    /// Maximum number of leads requested from the lead finder.
    #[serde(default = "default_lead_limit")]
    pub lead_limit: usize,
    /// Maximum characters of scraped site content passed to prompts.
    #[serde(default = "default_scrape_char_limit")]
    pub scrape_char_limit: usize,
}

fn default_token_batch_interval_ms() -> u64 {
    100
}

fn default_excerpt_chars() -> usize {
    500
}

fn default_email_batch_size() -> usize {
    5
}

fn default_lead_limit() -> usize {
    10
}

fn default_scrape_char_limit() -> usize {
    12_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            token_batch_interval_ms: default_token_batch_interval_ms(),
            stage_timeout_ms: None,
            excerpt_chars: default_excerpt_chars(),
            email_batch_size: default_email_batch_size(),
            lead_limit: default_lead_limit(),
            scrape_char_limit: default_scrape_char_limit(),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads overrides from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            token_batch_interval_ms: env_or(
                "CAMPAIGNFLOW_TOKEN_BATCH_MS",
                defaults.token_batch_interval_ms,
            ),
            stage_timeout_ms: std::env::var("CAMPAIGNFLOW_STAGE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.trim().parse().ok()),
            excerpt_chars: env_or("CAMPAIGNFLOW_EXCERPT_CHARS", defaults.excerpt_chars),
            email_batch_size: env_or("CAMPAIGNFLOW_EMAIL_BATCH_SIZE", defaults.email_batch_size),
            lead_limit: env_or("CAMPAIGNFLOW_LEAD_LIMIT", defaults.lead_limit),
            scrape_char_limit: env_or("CAMPAIGNFLOW_SCRAPE_CHARS", defaults.scrape_char_limit),
        }
    }

    /// Sets the token batching interval.
    #[must_use]
    pub fn with_token_batch_interval_ms(mut self, ms: u64) -> Self {
        self.token_batch_interval_ms = ms;
        self
    }

    /// Sets the per-stage timeout.
    #[must_use]
    pub fn with_stage_timeout_ms(mut self, ms: u64) -> Self {
        self.stage_timeout_ms = Some(ms);
        self
    }

    /// Sets the email batch size.
    #[must_use]
    pub fn with_email_batch_size(mut self, size: usize) -> Self {
        self.email_batch_size = size;
        self
    }

    /// Sets the lead limit.
    #[must_use]
    pub fn with_lead_limit(mut self, limit: usize) -> Self {
        self.lead_limit = limit;
        self
    }

    /// Gets the token batching interval as a Duration.
    #[must_use]
    pub fn token_batch_interval(&self) -> Duration {
        Duration::from_millis(self.token_batch_interval_ms)
    }

    /// Gets the stage timeout as a Duration.
    #[must_use]
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_ms.map(Duration::from_millis)
    }
}

/// Client-side decoder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Minimum time between two field store notifications.
    #[serde(default = "default_frame_budget_ms")]
    pub frame_budget_ms: u64,
    /// Size of the network read buffer.
    #[serde(default = "default_read_buffer_bytes")]
    pub read_buffer_bytes: usize,
}

fn default_frame_budget_ms() -> u64 {
    16
}

fn default_read_buffer_bytes() -> usize {
    8192
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            frame_budget_ms: default_frame_budget_ms(),
            read_buffer_bytes: default_read_buffer_bytes(),
        }
    }
}

impl ClientConfig {
    /// Reads overrides from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            frame_budget_ms: env_or("CAMPAIGNFLOW_FRAME_BUDGET_MS", defaults.frame_budget_ms),
            read_buffer_bytes: env_or("CAMPAIGNFLOW_READ_BUFFER", defaults.read_buffer_bytes),
        }
    }

    /// Sets the frame budget.
    #[must_use]
    pub fn with_frame_budget_ms(mut self, ms: u64) -> Self {
        self.frame_budget_ms = ms;
        self
    }

    /// Gets the frame budget as a Duration.
    #[must_use]
    pub fn frame_budget(&self) -> Duration {
        Duration::from_millis(self.frame_budget_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Reads overrides from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            level: env_or("CAMPAIGNFLOW_LOG_LEVEL", default_level()),
            json: env_or("CAMPAIGNFLOW_LOG_JSON", false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.token_batch_interval(), Duration::from_millis(100));
        assert_eq!(config.stage_timeout(), None);
        assert_eq!(config.email_batch_size, 5);
        assert_eq!(config.lead_limit, 10);
    }

    #[test]
    fn test_pipeline_deserialize_partial() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"stage_timeout_ms": 30000, "email_batch_size": 3}"#).unwrap();
        assert_eq!(config.stage_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.email_batch_size, 3);
        assert_eq!(config.excerpt_chars, 500);
    }

    #[test]
    fn test_pipeline_builder() {
        let config = PipelineConfig::new()
            .with_token_batch_interval_ms(0)
            .with_stage_timeout_ms(50)
            .with_lead_limit(3);
        assert_eq!(config.token_batch_interval_ms, 0);
        assert_eq!(config.stage_timeout_ms, Some(50));
        assert_eq!(config.lead_limit, 3);
    }

    #[test]
    fn test_client_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.frame_budget(), Duration::from_millis(16));
        assert_eq!(config.read_buffer_bytes, 8192);
    }

    #[test]
    fn test_logging_deserialize_empty() {
        let config: LoggingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, LoggingConfig::default());
    }
}
