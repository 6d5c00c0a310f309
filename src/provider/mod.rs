//! The external reasoning service, seen from the engine.
//!
//! The engine only needs "prompt in, text and token usage out" plus a
//! classified error; wire details stay inside each implementation.

pub mod ollama;

pub use ollama::{OllamaConfig, OllamaProvider};

use crate::error::ProviderError;
use futures::future::BoxFuture;

/// Token accounting reported by the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    /// Both counts come from the service, so the sum saturates.
    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// One reply from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

/// A service that can judge a rendered prompt.
pub trait ReasoningProvider: Send + Sync {
    /// Send one prompt and wait for the full reply.
    fn complete(&self, prompt: String) -> BoxFuture<'_, Result<Completion, ProviderError>>;

    /// Identifier stamped into response metadata.
    fn model_version(&self) -> &str;
}
