//! Chat model clients.
//!
//! [`ChatModelFactory`] resolves a provider name plus [`ModelOverrides`]
//! against the [`ConfigStore`] and returns an `Arc<dyn ChatModel>`.
//!
//! ```text
//! ConfigStore ──model()──▶ ModelConfig ──with_overrides──▶ constructor ──▶ dyn ChatModel
//! ```
//!
//! [`ModelOverrides`]: crate::config::ModelOverrides
//! [`ConfigStore`]: crate::config::ConfigStore

pub mod factory;
pub mod message;
pub mod provider;
pub mod providers;

pub use factory::{ChatModelBuilder, ChatModelFactory, ModelConstructor};
pub use message::{
    ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage, ToolCall, ToolDefinition,
};
pub use provider::{ChatModel, TextStream};
pub use providers::{OpenAiChatModel, ScriptedChatModel};
