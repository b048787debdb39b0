//! Provider-agnostic message types for chat model communication.
//!
//! These types decouple the retrieval chain and the agent from any specific
//! SDK; a [`ChatModel`](super::ChatModel) backend translates them.

use serde::{Deserialize, Serialize};

/// Author of a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
    /// Tool result.
    Tool,
}

/// A tool description sent to the model for function-calling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name, unique within a tool set.
    pub name: String,
    /// What the tool does, shown to the model.
    pub description: String,
    /// JSON Schema object describing the arguments.
    pub parameters: serde_json::Value,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier assigned by the provider.
    pub id: String,
    /// Which tool to run.
    pub name: String,
    /// JSON-encoded arguments.
    pub arguments: String,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who sent it.
    pub role: Role,
    /// Text of the turn.
    pub content: String,
    /// Calls the assistant asked for; empty except on assistant turns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// The call a `Role::Tool` message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// A chat completion request.
///
/// Model name and defaults come from the model's own configuration;
/// `temperature` and `max_tokens` override them for this request only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    /// Conversation so far, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Per-request temperature.
    pub temperature: Option<f32>,
    /// Per-request completion cap.
    pub max_tokens: Option<u32>,
    /// Tools the model may call.
    pub tools: Vec<ToolDefinition>,
}

impl ChatRequest {
    /// A request with the given messages and no tools.
    #[must_use]
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// A single user message.
    #[must_use]
    pub fn from_prompt(prompt: &str) -> Self {
        Self::new(vec![user_message(prompt)])
    }

    /// Attaches tool definitions.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Tokens billed for one or more completions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt side.
    pub prompt_tokens: u32,
    /// Completion side.
    pub completion_tokens: u32,
    /// Total tokens used.
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Adds `other` to this total.
    pub const fn accumulate(&mut self, other: Self) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// A chat completion response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatResponse {
    /// Assistant text; empty when only tools were requested.
    pub content: String,
    /// Tokens billed for this call.
    pub usage: TokenUsage,
    /// Calls the model wants executed.
    pub tool_calls: Vec<ToolCall>,
    /// Why generation stopped, as reported by the provider.
    pub finish_reason: Option<String>,
}

impl ChatResponse {
    /// A plain text response that finished normally.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: Some("stop".to_string()),
            ..Self::default()
        }
    }

    /// A response that only requests tool calls.
    #[must_use]
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            finish_reason: Some("tool_calls".to_string()),
            ..Self::default()
        }
    }
}

impl ChatMessage {
    /// A plain message from `role`.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// System instructions.
#[must_use]
pub fn system_message(content: &str) -> ChatMessage {
    ChatMessage::new(Role::System, content)
}

/// User input.
#[must_use]
pub fn user_message(content: &str) -> ChatMessage {
    ChatMessage::new(Role::User, content)
}

/// The assistant turn that requested `tool_calls`; its content is empty.
#[must_use]
pub fn assistant_tool_calls_message(tool_calls: Vec<ToolCall>) -> ChatMessage {
    ChatMessage {
        tool_calls,
        ..ChatMessage::new(Role::Assistant, String::new())
    }
}

/// The output of the tool call `tool_call_id`.
#[must_use]
pub fn tool_message(tool_call_id: &str, content: &str) -> ChatMessage {
    ChatMessage {
        tool_call_id: Some(tool_call_id.to_string()),
        ..ChatMessage::new(Role::Tool, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_prompt() {
        let request = ChatRequest::from_prompt("Hello");
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, Role::User);
        assert_eq!(request.messages[0].content, "Hello");
        assert!(request.tools.is_empty());
        assert!(request.temperature.is_none());
    }

    #[test]
    fn test_tool_message() {
        let msg = tool_message("call_123", "42");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_123"));
    }

    #[test]
    fn test_assistant_tool_calls_message() {
        let msg = assistant_tool_calls_message(vec![ToolCall {
            id: "call_1".to_string(),
            name: "calculator".to_string(),
            arguments: r#"{"input":"2+2"}"#.to_string(),
        }]);
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.content.is_empty());
        assert_eq!(msg.tool_calls[0].name, "calculator");
    }

    #[test]
    fn test_usage_accumulates() {
        let mut total = TokenUsage::default();
        total.accumulate(TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        });
        total.accumulate(TokenUsage {
            prompt_tokens: 1,
            completion_tokens: 1,
            total_tokens: 2,
        });
        assert_eq!(total.total_tokens, 17);
        assert_eq!(total.prompt_tokens, 11);
    }

    #[test]
    fn test_chat_message_serialization() {
        let json = serde_json::to_string(&system_message("be brief")).unwrap_or_default();
        assert!(json.contains("\"system\""));
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("tool_call_id"));
    }
}
