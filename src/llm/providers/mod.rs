//! Chat model backends.

pub mod openai;
pub mod scripted;

pub use openai::{OPENAI_PROVIDER, OpenAiChatModel};
pub use scripted::{SCRIPTED_PROVIDER, ScriptedChatModel};
