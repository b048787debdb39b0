//! An offline chat model that replays queued responses.
//!
//! Registered in [`ChatModelFactory`](crate::llm::ChatModelFactory) as
//! `scripted`: with an empty script it echoes the prompt, which gives a
//! network-free dry run of RAG chains and agents. Every request is recorded
//! so callers can inspect what was sent.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::ModelConfig;
use crate::error::LlmError;
use crate::llm::message::{ChatRequest, ChatResponse};
use crate::llm::provider::{ChatModel, TextStream};

/// Registry name of this provider.
pub const SCRIPTED_PROVIDER: &str = "scripted";

/// A chat model that returns pre-arranged replies in order.
///
/// When the queue runs dry it echoes the last user message, or fails if
/// built with [`ScriptedChatModel::strict`].
#[derive(Debug)]
pub struct ScriptedChatModel {
    config: ModelConfig,
    replies: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
    calls: AtomicUsize,
    strict: bool,
}

impl ScriptedChatModel {
    /// An empty script that echoes prompts.
    #[must_use]
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            strict: false,
        }
    }

    /// A script of text replies.
    #[must_use]
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let model = Self::new(ModelConfig::default());
        for reply in replies {
            model.push(ChatResponse::text(reply));
        }
        model
    }

    /// Fails instead of echoing once the script is exhausted.
    #[must_use]
    pub const fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Queues a response.
    pub fn push(&self, response: ChatResponse) {
        self.replies.lock().push_back(Ok(response));
    }

    /// Queues a failure.
    pub fn push_error(&self, error: LlmError) {
        self.replies.lock().push_back(Err(error));
    }

    /// Number of `chat`/`chat_stream` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    fn next_reply(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        if let Some(reply) = self.replies.lock().pop_front() {
            return reply;
        }
        if self.strict {
            return Err(LlmError::ApiRequest {
                message: "script exhausted".to_string(),
                status: None,
                retryable: false,
            });
        }
        let echo = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == crate::llm::Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(ChatResponse::text(echo))
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    fn name(&self) -> &str {
        SCRIPTED_PROVIDER
    }

    fn config(&self) -> &ModelConfig {
        &self.config
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.next_reply(request)
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<TextStream, LlmError> {
        let content = self.next_reply(request)?.content;
        // One delta per whitespace-separated word, spacing preserved
        let deltas: Vec<Result<String, LlmError>> = content
            .split_inclusive(' ')
            .map(|s| Ok(s.to_string()))
            .collect();
        Ok(Box::pin(futures_util::stream::iter(deltas)))
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    #[tokio::test]
    async fn test_replays_in_order_then_echoes() {
        let model = ScriptedChatModel::with_replies(["first", "second"]);
        assert_eq!(model.invoke("a").await.map(|r| r.content).ok(), Some("first".to_string()));
        assert_eq!(model.invoke("b").await.map(|r| r.content).ok(), Some("second".to_string()));
        assert_eq!(model.invoke("c").await.map(|r| r.content).ok(), Some("c".to_string()));
        assert_eq!(model.calls(), 3);
        assert_eq!(model.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_strict_fails_when_exhausted() {
        let model = ScriptedChatModel::with_replies(Vec::<String>::new()).strict();
        assert!(model.invoke("x").await.is_err());
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_stops_on_error() {
        let model = ScriptedChatModel::with_replies(["one", "two"]);
        let prompts = vec!["p1".to_string(), "p2".to_string()];
        let replies = model.batch(&prompts).await.unwrap_or_default();
        let texts: Vec<_> = replies.into_iter().map(|r| r.content).collect();
        assert_eq!(texts, vec!["one", "two"]);

        let failing = ScriptedChatModel::with_replies(["ok"]);
        failing.push_error(LlmError::Stream {
            message: "boom".to_string(),
        });
        failing.push(ChatResponse::text("unreached"));
        let prompts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert!(failing.batch(&prompts).await.is_err());
        assert_eq!(failing.calls(), 2);
    }

    #[tokio::test]
    async fn test_stream_yields_deltas() {
        let model = ScriptedChatModel::with_replies(["hello streaming world"]);
        let stream = model.stream("hi").await.unwrap_or_else(|_| unreachable!());
        let parts: Vec<String> = stream.filter_map(|r| async move { r.ok() }).collect().await;
        assert_eq!(parts.len(), 3);
        assert_eq!(parts.concat(), "hello streaming world");
    }
}
