//! Completion provider implementations

pub mod google;

use crate::{Error, Result, TextEventStream, stream::collect_text};
use async_trait::async_trait;

/// A prompt-in, text-out completion service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Stream a completion for a single flattened prompt
    async fn stream(&self, prompt: &str) -> Result<TextEventStream>;

    /// Generate the whole completion as one string
    async fn generate(&self, prompt: &str) -> Result<String> {
        let stream = self.stream(prompt).await?;
        collect_text(stream).await
    }
}

/// Get an API key from a provided value or the first set environment variable
pub fn get_api_key(provided: Option<&str>, env_vars: &[&str]) -> Result<String> {
    if let Some(key) = provided.filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }

    env_vars
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|k| !k.is_empty()))
        .ok_or(Error::InvalidApiKey)
}
