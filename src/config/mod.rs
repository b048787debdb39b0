//! Validated configuration records and the store that owns them.
//!
//! Three records exist: [`ModelConfig`] (chat model parameters),
//! [`RetrievalConfig`] (chunking, embedding, vector store) and
//! [`AgentConfig`] (agent kind, iteration cap, tool flags). Each is
//! validated on every construction path, so holding one means holding a
//! valid configuration.
//!
//! # Environment
//!
//! `from_env` constructors read `OPENAI_API_KEY`, `OPENAI_API_BASE` and
//! `WANGCHAIN_*` variables; [`ConfigStore::from_env`] also loads a `.env`
//! file from the working directory when one exists.

mod agent;
mod env;
mod model;
mod retrieval;
mod store;

pub use agent::{AgentConfig, AgentConfigBuilder, ToolFlags};
pub use env::ENV_PREFIX;
pub use model::{API_KEY_PREFIX, ModelConfig, ModelConfigBuilder, ModelOverrides};
pub use retrieval::{EmbeddingProvider, RetrievalConfig, RetrievalConfigBuilder, StoreKind};
pub use store::{ConfigKind, ConfigRecord, ConfigStore};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ConfigError;

/// A record that can round-trip through its raw field struct for patching.
pub(crate) trait RecordFields: Serialize + Sized {
    /// Unvalidated field set.
    type Fields: DeserializeOwned;

    /// Validates `fields` into a record.
    fn from_fields(fields: Self::Fields) -> Result<Self, ConfigError>;
}
