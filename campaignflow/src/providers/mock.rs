//! Scripted model provider for tests and demos.

use super::{ModelProvider, TokenStream};
use crate::errors::ProviderError;
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Mock model provider.
///
/// Responses are chosen in this order: forced failures, prompt patterns
/// (first substring match wins), the scripted queue, then the default
/// response. Each response is streamed in chunks of `chunk_chars`
/// characters.
#[derive(Debug)]
pub struct MockModelProvider {
    responses: Mutex<VecDeque<String>>,
    patterns: Vec<(String, String)>,
    failures: Vec<String>,
    stream_failures: Vec<String>,
    default_response: Option<String>,
    chunk_chars: usize,
    latency: Duration,
    call_count: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockModelProvider {
    /// Creates a new mock provider with scripted responses.
    #[must_use]
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            patterns: Vec::new(),
            failures: Vec::new(),
            stream_failures: Vec::new(),
            default_response: None,
            chunk_chars: 8,
            latency: Duration::ZERO,
            call_count: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answers prompts containing `needle` with `response`.
    #[must_use]
    pub fn with_pattern(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.patterns.push((needle.into(), response.into()));
        self
    }

    /// Rejects prompts containing `needle` before streaming starts.
    #[must_use]
    pub fn with_failure(mut self, needle: impl Into<String>) -> Self {
        self.failures.push(needle.into());
        self
    }

    /// Fails the stream halfway through for prompts containing `needle`.
    #[must_use]
    pub fn with_stream_failure(mut self, needle: impl Into<String>) -> Self {
        self.stream_failures.push(needle.into());
        self
    }

    /// Sets the response used when nothing else matches.
    #[must_use]
    pub fn with_default(mut self, response: impl Into<String>) -> Self {
        self.default_response = Some(response.into());
        self
    }

    /// Sets the chunk size in characters.
    #[must_use]
    pub fn with_chunk_chars(mut self, chars: usize) -> Self {
        self.chunk_chars = chars.max(1);
        self
    }

    /// Sets the delay before each chunk.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Returns the call count.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Returns every prompt received, in order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    /// Resets the call tracking.
    pub fn reset(&self) {
        self.call_count.store(0, Ordering::SeqCst);
        self.prompts.lock().clear();
    }

    fn pick_response(&self, prompt: &str) -> Result<String, ProviderError> {
        if self.failures.iter().any(|needle| prompt.contains(needle.as_str())) {
            return Err(ProviderError::Rejected("scripted failure".to_string()));
        }

        if let Some((_, response)) = self
            .patterns
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
        {
            return Ok(response.clone());
        }

        self.responses
            .lock()
            .pop_front()
            .or_else(|| self.default_response.clone())
            .ok_or_else(|| ProviderError::Rejected("no scripted response left".to_string()))
    }

    fn chunk(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars
            .chunks(self.chunk_chars)
            .map(|c| c.iter().collect())
            .collect()
    }
}

#[async_trait]
impl ModelProvider for MockModelProvider {
    async fn stream_completion(
        &self,
        prompt: &str,
        _max_tokens: u32,
    ) -> Result<TokenStream, ProviderError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());

        let response = self.pick_response(prompt)?;
        let mut items: Vec<Result<String, ProviderError>> =
            self.chunk(&response).into_iter().map(Ok).collect();

        if self
            .stream_failures
            .iter()
            .any(|needle| prompt.contains(needle.as_str()))
        {
            items.truncate(items.len() / 2);
            items.push(Err(ProviderError::Stream("scripted stream failure".to_string())));
        }

        let latency = self.latency;
        let stream = futures::stream::iter(items).then(move |item| async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            item
        });
        Ok(Box::pin(stream))
    }
}
