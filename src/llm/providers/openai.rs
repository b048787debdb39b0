//! `OpenAI` chat model using the `async-openai` crate.
//!
//! Works with any `OpenAI`-compatible API (`OpenAI`, Azure, local proxies)
//! through the `api_base` override in [`ModelConfig`].

use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::{ApiError, OpenAIError};
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessage,
    ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestSystemMessageContent,
    ChatCompletionRequestToolMessage, ChatCompletionRequestToolMessageContent,
    ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent, ChatCompletionTool,
    ChatCompletionToolType, CreateChatCompletionRequest, CreateChatCompletionStreamResponse,
    FunctionCall, FunctionObject,
};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use futures_util::StreamExt;
use tracing::debug;

use crate::config::ModelConfig;
use crate::error::LlmError;
use crate::llm::message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage, ToolCall};
use crate::llm::provider::{ChatModel, TextStream};
use crate::retry::RetryPolicy;

/// Registry name of this provider.
pub const OPENAI_PROVIDER: &str = "openai";

/// API error `type`/`code` values for rate limiting and server-side
/// failures. `insufficient_quota` is absent: it never clears by waiting.
const TRANSIENT_API_ERRORS: &[&str] = &[
    "rate_limit_exceeded",
    "rate_limit_error",
    "requests",
    "tokens",
    "server_error",
    "service_unavailable",
    "overloaded_error",
    "engine_overloaded",
    "timeout",
];

/// `OpenAI`-compatible chat model.
///
/// Every API call runs under [`RetryPolicy::for_model`], retrying only
/// transient failures.
pub struct OpenAiChatModel {
    client: Client<OpenAIConfig>,
    config: ModelConfig,
    retry: RetryPolicy,
}

impl OpenAiChatModel {
    /// Creates a client from resolved model parameters.
    ///
    /// Without an `api_key`, `async-openai` falls back to `OPENAI_API_KEY`.
    pub fn new(config: ModelConfig) -> Result<Self, LlmError> {
        let client = openai_client(&config)?;
        Ok(Self {
            client,
            retry: RetryPolicy::for_model(&config),
            config,
        })
    }

    /// Replaces the retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Converts our message type to the `OpenAI` SDK type.
    fn convert_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
        match msg.role {
            Role::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(msg.content.clone()),
                    name: None,
                })
            }
            Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(msg.content.clone()),
                name: None,
            }),
            Role::Assistant => {
                let tool_calls = (!msg.tool_calls.is_empty()).then(|| {
                    msg.tool_calls
                        .iter()
                        .map(|tc| ChatCompletionMessageToolCall {
                            id: tc.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: FunctionCall {
                                name: tc.name.clone(),
                                arguments: tc.arguments.clone(),
                            },
                        })
                        .collect()
                });
                let content = (!msg.content.is_empty()).then(|| {
                    ChatCompletionRequestAssistantMessageContent::Text(msg.content.clone())
                });

                #[allow(deprecated)]
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content,
                    name: None,
                    tool_calls,
                    refusal: None,
                    audio: None,
                    function_call: None,
                })
            }
            Role::Tool => ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
                content: ChatCompletionRequestToolMessageContent::Text(msg.content.clone()),
                tool_call_id: msg.tool_call_id.clone().unwrap_or_default(),
            }),
        }
    }

    /// Builds the SDK request, filling unset parameters from the config.
    fn build_request(&self, request: &ChatRequest, stream: bool) -> CreateChatCompletionRequest {
        let messages: Vec<_> = request.messages.iter().map(Self::convert_message).collect();

        let tools = (!request.tools.is_empty()).then(|| {
            request
                .tools
                .iter()
                .map(|td| ChatCompletionTool {
                    r#type: ChatCompletionToolType::Function,
                    function: FunctionObject {
                        name: td.name.clone(),
                        description: Some(td.description.clone()),
                        parameters: Some(td.parameters.clone()),
                        strict: None,
                    },
                })
                .collect()
        });

        CreateChatCompletionRequest {
            model: self.config.model_name().to_string(),
            messages,
            temperature: Some(request.temperature.unwrap_or_else(|| self.config.temperature())),
            max_completion_tokens: Some(
                request.max_tokens.unwrap_or_else(|| self.config.max_tokens()),
            ),
            stream: stream.then_some(true),
            tools,
            ..Default::default()
        }
    }

    async fn send(&self, request: CreateChatCompletionRequest) -> Result<ChatResponse, LlmError> {
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(classify_error)?;

        let choice = response.choices.first();

        let content = choice
            .and_then(|c| c.message.content.as_ref())
            .cloned()
            .unwrap_or_default();

        let tool_calls = choice
            .and_then(|c| c.message.tool_calls.as_ref())
            .map(|tcs| {
                tcs.iter()
                    .map(|tc| ToolCall {
                        id: tc.id.clone(),
                        name: tc.function.name.clone(),
                        arguments: tc.function.arguments.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let finish_reason = choice
            .and_then(|c| c.finish_reason.as_ref())
            .and_then(|fr| serde_json::to_value(fr).ok())
            .and_then(|v| v.as_str().map(str::to_string));

        let usage = response
            .usage
            .map_or_else(TokenUsage::default, |u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            });

        Ok(ChatResponse {
            content,
            usage,
            tool_calls,
            finish_reason,
        })
    }
}

impl std::fmt::Debug for OpenAiChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatModel")
            .field("client", &"<async-openai::Client>")
            .field("config", &self.config)
            .field("retry", &self.retry)
            .finish()
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn name(&self) -> &str {
        OPENAI_PROVIDER
    }

    fn config(&self) -> &ModelConfig {
        &self.config
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let openai_request = self.build_request(request, false);
        debug!(
            model = self.config.model_name(),
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending chat completion"
        );
        let this = self;
        self.retry
            .run_async(
                "openai.chat",
                move || this.send(openai_request.clone()),
                LlmError::is_retryable,
            )
            .await
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<TextStream, LlmError> {
        let openai_request = self.build_request(request, true);
        let client = &self.client;

        let stream = self
            .retry
            .run_async(
                "openai.chat_stream",
                move || {
                    let request = openai_request.clone();
                    async move {
                        client
                            .chat()
                            .create_stream(request)
                            .await
                            .map_err(classify_error)
                    }
                },
                LlmError::is_retryable,
            )
            .await?;

        let mapped = stream.map(
            |result: Result<CreateChatCompletionStreamResponse, OpenAIError>| match result {
                Ok(response) => Ok(response
                    .choices
                    .first()
                    .and_then(|c| c.delta.content.as_ref())
                    .cloned()
                    .unwrap_or_default()),
                Err(e) => Err(LlmError::Stream {
                    message: e.to_string(),
                }),
            },
        );

        Ok(Box::pin(mapped))
    }
}

/// Builds an `async-openai` client whose HTTP layer enforces the request
/// timeout and which makes exactly one HTTP request per call.
pub(crate) fn openai_client(config: &ModelConfig) -> Result<Client<OpenAIConfig>, LlmError> {
    let mut openai_config = OpenAIConfig::new();
    if let Some(key) = config.api_key() {
        openai_config = openai_config.with_api_key(key);
    }
    if let Some(base) = config.api_base() {
        openai_config = openai_config.with_api_base(base);
    }

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| LlmError::ClientSetup {
            message: e.to_string(),
        })?;

    // One HTTP request per call; retries belong to RetryPolicy.
    let no_backoff = ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::ZERO))
        .build();

    Ok(Client::with_config(openai_config)
        .with_http_client(http)
        .with_backoff(no_backoff))
}

/// Maps an SDK error, marking timeouts, connection failures, rate limits
/// and server errors as retryable.
pub(crate) fn classify_error(err: OpenAIError) -> LlmError {
    match err {
        OpenAIError::Reqwest(e) => {
            let status = e.status().map(|s| s.as_u16());
            let retryable = e.is_timeout()
                || e.is_connect()
                || status.is_some_and(|s| s == 429 || (500..600).contains(&s));
            LlmError::ApiRequest {
                message: e.to_string(),
                status,
                retryable,
            }
        }
        OpenAIError::ApiError(api) => LlmError::ApiRequest {
            retryable: is_transient_api_error(&api),
            message: api.to_string(),
            status: None,
        },
        other => LlmError::ApiRequest {
            message: other.to_string(),
            status: None,
            retryable: false,
        },
    }
}

/// The SDK drops the HTTP status of error responses, so rate limits and
/// server errors are recognized by the error body instead.
fn is_transient_api_error(api: &ApiError) -> bool {
    [api.r#type.as_deref(), api.code.as_deref()]
        .into_iter()
        .flatten()
        .any(|value| TRANSIENT_API_ERRORS.contains(&value))
}
