//! Language model provider collaborators.
//!
//! The pipeline only needs one capability from a model: stream the
//! completion of a prompt as text deltas. Everything provider-specific lives
//! behind [`ModelProvider`].

mod mock;

#[cfg(feature = "http-provider")]
mod http;

pub use mock::MockModelProvider;

#[cfg(feature = "http-provider")]
pub use http::{delta_from_frame, AnthropicProvider, ProviderConfig};

use crate::errors::ProviderError;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// A stream of text deltas produced by a model.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Trait for language model providers.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Starts streaming the completion of `prompt`.
    ///
    /// The returned stream ends naturally when the model is done. No
    /// recovery is attempted on failure; errors surface as they are.
    async fn stream_completion(
        &self,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<TokenStream, ProviderError>;
}

/// Streams a completion and collects it into one string.
pub async fn collect_completion(
    provider: &dyn ModelProvider,
    prompt: &str,
    max_tokens: u32,
) -> Result<String, ProviderError> {
    let mut stream = provider.stream_completion(prompt, max_tokens).await?;
    let mut text = String::new();
    while let Some(delta) = stream.next().await {
        text.push_str(&delta?);
    }
    Ok(text)
}
