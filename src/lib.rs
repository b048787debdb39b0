//! # wangchain
//!
//! Configuration-driven chat model clients, a retrieval-augmented
//! generation pipeline, and a tool-using agent.
//!
//! ## Modules
//!
//! - [`config`]: validated model, retrieval and agent records, and the
//!   [`ConfigStore`](config::ConfigStore) that owns them
//! - [`llm`]: the [`ChatModel`](llm::ChatModel) seam, the OpenAI backend,
//!   and the provider factory/builder
//! - [`retrieval`]: document loading, chunking, embedding, vector stores,
//!   and the question-answering chain
//! - [`agent`]: tools, the tool-calling loop, and the agent executor
//! - [`retry`]: bounded exponential backoff and error translation
//! - [`prompt`]: prompt templates and rendering
//! - [`logging`]: tracing subscriber setup
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use wangchain::config::ConfigStore;
//! use wangchain::llm::{ChatModel, ChatModelFactory};
//!
//! # async fn demo() -> wangchain::Result<()> {
//! let store = Arc::new(ConfigStore::from_env()?);
//! let model = ChatModelFactory::new(Arc::clone(&store)).create_default()?;
//! let reply = model.invoke("Explain retrieval-augmented generation.").await?;
//! println!("{}", reply.content);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod logging;
pub mod prompt;
pub mod retrieval;
pub mod retry;

pub use agent::{AgentBuilder, AgentExecutor, Tool};
pub use config::{AgentConfig, ConfigStore, ModelConfig, RetrievalConfig};
pub use error::{Error, Result};
pub use llm::{ChatModel, ChatModelFactory};
pub use retrieval::{RagChain, Retriever};
pub use retry::RetryPolicy;
