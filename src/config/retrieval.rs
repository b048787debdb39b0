//! Retrieval pipeline configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::RecordFields;
use super::env::{EnvSource, process_env};
use crate::error::ConfigError;

const DEFAULT_COLLECTION_NAME: &str = "wangchain_docs";
const DEFAULT_PERSIST_PATH: &str = "./data/vector_store.db";
const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 200;
const DEFAULT_TOP_K: usize = 4;
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// Vector store backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// SQLite file at `persist_path`, one table per collection.
    #[default]
    Sqlite,
    /// Process-local, discarded on drop.
    Memory,
}

impl StoreKind {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown store kind '{other}' (expected sqlite or memory)")),
        }
    }
}

/// Embedding backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// OpenAI embeddings API, model = `embedding_model`.
    #[default]
    OpenAi,
    /// Deterministic local feature hashing.
    Hash,
}

impl EmbeddingProvider {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Hash => "hash",
        }
    }
}

impl fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbeddingProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "hash" => Ok(Self::Hash),
            other => Err(format!(
                "unknown embedding provider '{other}' (expected openai or hash)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct RetrievalFields {
    store_kind: StoreKind,
    collection_name: String,
    persist_path: PathBuf,
    chunk_size: usize,
    chunk_overlap: usize,
    top_k: usize,
    embedding_model: String,
    embedding_provider: EmbeddingProvider,
}

impl Default for RetrievalFields {
    fn default() -> Self {
        Self {
            store_kind: StoreKind::default(),
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            persist_path: PathBuf::from(DEFAULT_PERSIST_PATH),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_provider: EmbeddingProvider::default(),
        }
    }
}

impl RetrievalFields {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::OutOfRange {
                field: "chunk_size",
                value: "0".to_string(),
                expected: "> 0",
            });
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::OutOfRange {
                field: "chunk_overlap",
                value: self.chunk_overlap.to_string(),
                expected: "< chunk_size",
            });
        }
        if self.top_k == 0 {
            return Err(ConfigError::OutOfRange {
                field: "top_k",
                value: "0".to_string(),
                expected: "> 0",
            });
        }
        // Used verbatim as a SQLite table name
        if self.collection_name.is_empty()
            || !self
                .collection_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::InvalidValue {
                field: "collection_name",
                message: format!(
                    "'{}' must be non-empty and contain only ASCII letters, digits, '_' or '-'",
                    self.collection_name
                ),
            });
        }
        if self.persist_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "persist_path",
                message: "must not be empty".to_string(),
            });
        }
        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "embedding_model",
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Validated retrieval parameters.
///
/// Invariants: `chunk_size > 0`, `chunk_overlap < chunk_size`, `top_k > 0`,
/// and `collection_name` is a plain identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RetrievalFields", into = "RetrievalFields")]
pub struct RetrievalConfig {
    fields: RetrievalFields,
}

impl TryFrom<RetrievalFields> for RetrievalConfig {
    type Error = ConfigError;

    fn try_from(fields: RetrievalFields) -> Result<Self, Self::Error> {
        fields.validate()?;
        Ok(Self { fields })
    }
}

impl From<RetrievalConfig> for RetrievalFields {
    fn from(config: RetrievalConfig) -> Self {
        config.fields
    }
}

impl RecordFields for RetrievalConfig {
    type Fields = RetrievalFields;

    fn from_fields(fields: RetrievalFields) -> Result<Self, ConfigError> {
        Self::try_from(fields)
    }
}

impl RetrievalConfig {
    /// Creates a new builder for `RetrievalConfig`.
    #[must_use]
    pub fn builder() -> RetrievalConfigBuilder {
        RetrievalConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::builder().from_env()?.build()
    }

    /// Vector store backend.
    #[must_use]
    pub const fn store_kind(&self) -> StoreKind {
        self.fields.store_kind
    }

    /// Collection (table) name.
    #[must_use]
    pub fn collection_name(&self) -> &str {
        &self.fields.collection_name
    }

    /// Location of the persistent store.
    #[must_use]
    pub fn persist_path(&self) -> &Path {
        &self.fields.persist_path
    }

    /// Maximum characters per chunk.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.fields.chunk_size
    }

    /// Characters shared between adjacent chunks.
    #[must_use]
    pub const fn chunk_overlap(&self) -> usize {
        self.fields.chunk_overlap
    }

    /// Default number of matches returned by a query.
    #[must_use]
    pub const fn top_k(&self) -> usize {
        self.fields.top_k
    }

    /// Embedding model name.
    #[must_use]
    pub fn embedding_model(&self) -> &str {
        &self.fields.embedding_model
    }

    /// Embedding backend.
    #[must_use]
    pub const fn embedding_provider(&self) -> EmbeddingProvider {
        self.fields.embedding_provider
    }
}

/// Builder for [`RetrievalConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetrievalConfigBuilder {
    store_kind: Option<StoreKind>,
    collection_name: Option<String>,
    persist_path: Option<PathBuf>,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
    top_k: Option<usize>,
    embedding_model: Option<String>,
    embedding_provider: Option<EmbeddingProvider>,
}

impl RetrievalConfigBuilder {
    /// Populates unset fields from `WANGCHAIN_STORE_KIND`,
    /// `WANGCHAIN_COLLECTION_NAME`, `WANGCHAIN_PERSIST_PATH`,
    /// `WANGCHAIN_CHUNK_SIZE`, `WANGCHAIN_CHUNK_OVERLAP`, `WANGCHAIN_TOP_K`,
    /// `WANGCHAIN_EMBEDDING_MODEL` and `WANGCHAIN_EMBEDDING_PROVIDER`.
    pub fn from_env(self) -> Result<Self, ConfigError> {
        self.from_source(&EnvSource::new(&process_env))
    }

    pub(crate) fn from_source(mut self, env: &EnvSource<'_>) -> Result<Self, ConfigError> {
        if self.store_kind.is_none() {
            self.store_kind = env.parse("STORE_KIND")?;
        }
        if self.collection_name.is_none() {
            self.collection_name = env.prefixed("COLLECTION_NAME");
        }
        if self.persist_path.is_none() {
            self.persist_path = env.prefixed("PERSIST_PATH").map(PathBuf::from);
        }
        if self.chunk_size.is_none() {
            self.chunk_size = env.parse("CHUNK_SIZE")?;
        }
        if self.chunk_overlap.is_none() {
            self.chunk_overlap = env.parse("CHUNK_OVERLAP")?;
        }
        if self.top_k.is_none() {
            self.top_k = env.parse("TOP_K")?;
        }
        if self.embedding_model.is_none() {
            self.embedding_model = env.prefixed("EMBEDDING_MODEL");
        }
        if self.embedding_provider.is_none() {
            self.embedding_provider = env.parse("EMBEDDING_PROVIDER")?;
        }
        Ok(self)
    }

    /// Sets the store backend.
    #[must_use]
    pub const fn store_kind(mut self, kind: StoreKind) -> Self {
        self.store_kind = Some(kind);
        self
    }

    /// Sets the collection name.
    #[must_use]
    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection_name = Some(name.into());
        self
    }

    /// Sets the persistence path.
    #[must_use]
    pub fn persist_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_path = Some(path.into());
        self
    }

    /// Sets the chunk size.
    #[must_use]
    pub const fn chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = Some(n);
        self
    }

    /// Sets the chunk overlap.
    #[must_use]
    pub const fn chunk_overlap(mut self, n: usize) -> Self {
        self.chunk_overlap = Some(n);
        self
    }

    /// Sets the default result count.
    #[must_use]
    pub const fn top_k(mut self, n: usize) -> Self {
        self.top_k = Some(n);
        self
    }

    /// Sets the embedding model.
    #[must_use]
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    /// Sets the embedding backend.
    #[must_use]
    pub const fn embedding_provider(mut self, provider: EmbeddingProvider) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Builds and validates the [`RetrievalConfig`].
    pub fn build(self) -> Result<RetrievalConfig, ConfigError> {
        let defaults = RetrievalFields::default();
        RetrievalConfig::try_from(RetrievalFields {
            store_kind: self.store_kind.unwrap_or(defaults.store_kind),
            collection_name: self.collection_name.unwrap_or(defaults.collection_name),
            persist_path: self.persist_path.unwrap_or(defaults.persist_path),
            chunk_size: self.chunk_size.unwrap_or(defaults.chunk_size),
            chunk_overlap: self.chunk_overlap.unwrap_or(defaults.chunk_overlap),
            top_k: self.top_k.unwrap_or(defaults.top_k),
            embedding_model: self.embedding_model.unwrap_or(defaults.embedding_model),
            embedding_provider: self.embedding_provider.unwrap_or(defaults.embedding_provider),
        })
    }
}
