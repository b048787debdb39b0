//! The chat model seam.
//!
//! Implementations translate [`ChatRequest`]/[`ChatResponse`] into
//! provider-specific calls. The retrieval chain and the agent only ever see
//! `dyn ChatModel`.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use super::message::{ChatRequest, ChatResponse};
use crate::config::ModelConfig;
use crate::error::LlmError;

/// A stream of text deltas.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// A constructed chat model client.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Provider name (e.g., `"openai"`).
    fn name(&self) -> &str;

    /// The resolved parameters this client was built with.
    fn config(&self) -> &ModelConfig;

    /// Executes a chat completion request.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] on API failures after any retries.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Executes a streaming chat completion request.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] if the stream cannot be opened. Failures while
    /// reading surface as stream items.
    async fn chat_stream(&self, request: &ChatRequest) -> Result<TextStream, LlmError>;

    /// Sends `prompt` as a single user message.
    async fn invoke(&self, prompt: &str) -> Result<ChatResponse, LlmError> {
        self.chat(&ChatRequest::from_prompt(prompt)).await
    }

    /// Streams the reply to `prompt`.
    async fn stream(&self, prompt: &str) -> Result<TextStream, LlmError> {
        self.chat_stream(&ChatRequest::from_prompt(prompt)).await
    }

    /// Invokes each prompt in order, stopping at the first failure.
    async fn batch(&self, prompts: &[String]) -> Result<Vec<ChatResponse>, LlmError> {
        let mut responses = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            responses.push(self.invoke(prompt).await?);
        }
        Ok(responses)
    }
}
