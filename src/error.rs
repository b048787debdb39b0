//! Error types for wangchain.
//!
//! Each subsystem has its own error enum; [`Error`] unifies them so callers
//! always learn which subsystem failed. Errors are raised at the boundary
//! where they are detected (construction, update, load) and are never
//! deferred.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level application error.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or unknown configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A provider, store, or agent kind that is not registered.
    #[error("unsupported {what}: {name}")]
    UnsupportedKind {
        /// What kind of identifier was rejected (e.g. `"model provider"`).
        what: &'static str,
        /// The rejected identifier.
        name: String,
    },

    /// Document loading failed.
    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    /// Vector store or embedding failure.
    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    /// Chat model API failure.
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    /// Agent execution failure.
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    /// An error from outside the taxonomy, wrapped by [`crate::retry::guard`].
    #[error("{operation} failed: {source}")]
    Unexpected {
        /// Name of the operation that failed.
        operation: String,
        /// The original cause.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl Error {
    /// Creates an [`Error::UnsupportedKind`].
    pub fn unsupported(what: &'static str, name: impl Into<String>) -> Self {
        Self::UnsupportedKind {
            what,
            name: name.into(),
        }
    }

    /// Returns `true` if retrying the failed operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Llm(e) => e.is_retryable(),
            Self::VectorStore(VectorStoreError::Embedding { retryable, .. }) => *retryable,
            _ => false,
        }
    }
}

/// Configuration validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A numeric field is outside its allowed range.
    #[error("{field} = {value} is out of range (expected {expected})")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Offending value, rendered.
        value: String,
        /// Human-readable allowed range.
        expected: &'static str,
    },

    /// API key does not carry the provider's prefix.
    #[error("API key must start with '{prefix}'")]
    InvalidApiKey {
        /// Required prefix.
        prefix: &'static str,
    },

    /// A field has an invalid value.
    #[error("invalid {field}: {message}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// The config kind passed to an update is not recognized.
    #[error("unknown config kind '{kind}' (expected model, retrieval, or agent)")]
    UnknownKind {
        /// The rejected kind.
        kind: String,
    },

    /// The patch or serialized record could not be decoded.
    #[error("invalid config record: {message}")]
    Malformed {
        /// Decoder message (includes unknown field names).
        message: String,
    },

    /// An environment variable holds an unparseable value.
    #[error("environment variable {var}: {message}")]
    Env {
        /// Variable name.
        var: String,
        /// Parse failure.
        message: String,
    },
}

/// Document loading errors.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// The file extension has no loader.
    #[error("unsupported file format: {extension}")]
    UnsupportedFormat {
        /// Extension as found on the path (may be empty).
        extension: String,
    },

    /// The path does not exist.
    #[error("file not found: {}", path.display())]
    NotFound {
        /// Missing path.
        path: PathBuf,
    },

    /// The loader could not read or decode the file.
    #[error("failed to load {}: {message}", path.display())]
    Load {
        /// Path being loaded.
        path: PathBuf,
        /// Loader message.
        message: String,
    },
}

/// Vector store and embedding errors.
#[derive(Error, Debug)]
pub enum VectorStoreError {
    /// Retrieval attempted before any documents were indexed.
    #[error("vector store not initialized; call load_and_index first")]
    NotIndexed,

    /// The loaded documents produced no text to index.
    #[error("no text chunks to index")]
    NothingToIndex,

    /// The embedding backend failed.
    #[error("embedding failed: {message}")]
    Embedding {
        /// Backend message.
        message: String,
        /// Whether the failure is transient.
        retryable: bool,
    },

    /// Embedding vectors of different sizes were mixed.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the store.
        expected: usize,
        /// Dimension supplied.
        actual: usize,
    },

    /// Chunk and embedding counts differ.
    #[error("{chunks} chunks but {embeddings} embeddings")]
    CountMismatch {
        /// Number of chunks.
        chunks: usize,
        /// Number of embeddings.
        embeddings: usize,
    },

    /// Storage backend failure.
    #[error("storage backend: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for VectorStoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Chat model API errors.
#[derive(Error, Debug)]
pub enum LlmError {
    /// Request to the provider failed.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
        /// Whether the failure is transient (timeout, connect, 429, 5xx).
        retryable: bool,
    },

    /// Streaming response failed mid-flight.
    #[error("stream error: {message}")]
    Stream {
        /// Error message.
        message: String,
    },

    /// The provider client could not be constructed.
    #[error("client setup failed: {message}")]
    ClientSetup {
        /// Error message.
        message: String,
    },
}

impl LlmError {
    /// Returns `true` for transient failures worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ApiRequest { retryable: true, .. })
    }
}

/// Agent execution errors.
#[derive(Error, Debug)]
pub enum AgentError {
    /// The task description was empty.
    #[error("task cannot be empty")]
    EmptyTask,

    /// The model kept requesting tools past the iteration cap.
    #[error("agent stopped after {max_iterations} iterations without a final answer")]
    IterationLimit {
        /// The configured cap.
        max_iterations: usize,
    },

    /// Two tools share a name.
    #[error("duplicate tool name: {name}")]
    DuplicateTool {
        /// The clashing name.
        name: String,
    },

    /// The prompt template could not be rendered.
    #[error("invalid prompt template: {message}")]
    Template {
        /// What is wrong.
        message: String,
    },
}

/// Errors raised by an individual tool. These are reported back to the
/// model as tool results rather than aborting the agent run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Tool arguments could not be decoded.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The tool ran and failed.
    #[error("{0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::OutOfRange {
            field: "temperature",
            value: "2.5".to_string(),
            expected: "0.0..=2.0",
        };
        assert_eq!(
            err.to_string(),
            "temperature = 2.5 is out of range (expected 0.0..=2.0)"
        );
    }

    #[test]
    fn test_error_from_subsystems() {
        let err: Error = ConfigError::InvalidApiKey { prefix: "sk-" }.into();
        assert!(matches!(err, Error::Config(_)));

        let err: Error = VectorStoreError::NotIndexed.into();
        assert!(err.to_string().contains("load_and_index"));
    }

    #[test]
    fn test_retryable_classification() {
        let transient: Error = LlmError::ApiRequest {
            message: "timed out".to_string(),
            status: None,
            retryable: true,
        }
        .into();
        assert!(transient.is_retryable());

        let fatal: Error = LlmError::ApiRequest {
            message: "bad request".to_string(),
            status: Some(400),
            retryable: false,
        }
        .into();
        assert!(!fatal.is_retryable());
        assert!(!Error::unsupported("model provider", "x").is_retryable());
    }
}
