//! Tracing subscriber setup and stage timing.

use crate::config::LoggingConfig;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` overrides the configured level. Returns `Ok(false)` when a
/// global subscriber was already installed, so calling this twice is safe.
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<bool> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };
    Ok(installed)
}

/// Simple span timing helper.
///
/// Uses the tokio clock, so durations follow paused time in tests.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in whole milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span, logs it and returns the duration.
    pub fn finish(self) -> u64 {
        let duration_ms = self.elapsed_ms();
        ::tracing::debug!(span_name = %self.name, duration_ms, "Span finished");
        duration_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_span_timer() {
        let timer = SpanTimer::start("profile");
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(timer.name(), "profile");
        assert_eq!(timer.finish(), 250);
    }

    #[test]
    fn test_init_tracing_twice() {
        let config = LoggingConfig::default();
        let _ = init_tracing(&config).unwrap();
        assert!(!init_tracing(&config).unwrap());
    }

    #[test]
    fn test_init_tracing_bad_level() {
        if std::env::var("RUST_LOG").is_err() {
            let config = LoggingConfig {
                level: "campaignflow=loudest".to_string(),
                json: false,
            };
            assert!(init_tracing(&config).is_err());
        }
    }
}
