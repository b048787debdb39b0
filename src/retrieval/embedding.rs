//! Text embedding backends.

use std::sync::Arc;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::CreateEmbeddingRequestArgs;
use async_trait::async_trait;
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::{EmbeddingProvider, ModelConfig, RetrievalConfig};
use crate::error::{LlmError, VectorStoreError};
use crate::llm::providers::openai::{classify_error, openai_client};
use crate::retry::RetryPolicy;

/// Default dimensionality of [`HashEmbedder`].
pub const DEFAULT_HASH_DIMENSIONS: usize = 384;

/// Inputs per embeddings API request.
const OPENAI_BATCH_SIZE: usize = 256;

/// Turns text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Backend name.
    fn name(&self) -> &str;

    /// Vector length, when known before the first call.
    fn dimensions(&self) -> Option<usize>;

    /// Embeds a batch of texts, preserving order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VectorStoreError>;

    /// Embeds a single query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, VectorStoreError> {
        self.embed_documents(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| VectorStoreError::Embedding {
                message: "backend returned no vector".to_string(),
                retryable: false,
            })
    }
}

/// Builds the embedder selected by `retrieval.embedding_provider`.
///
/// The `OpenAI` backend reuses the credentials and timeout of `model`.
pub fn create_embedder(
    retrieval: &RetrievalConfig,
    model: &ModelConfig,
) -> Result<Arc<dyn Embedder>, LlmError> {
    match retrieval.embedding_provider() {
        EmbeddingProvider::OpenAi => Ok(Arc::new(OpenAiEmbedder::new(
            model,
            retrieval.embedding_model(),
        )?)),
        EmbeddingProvider::Hash => Ok(Arc::new(HashEmbedder::default())),
    }
}

/// Embeddings from the `OpenAI` embeddings API.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiEmbedder {
    /// Creates an embedder for `embedding_model` using `config`'s
    /// credentials, base URL, timeout, and retry count.
    pub fn new(config: &ModelConfig, embedding_model: &str) -> Result<Self, LlmError> {
        Ok(Self {
            client: openai_client(config)?,
            model: embedding_model.to_string(),
            retry: RetryPolicy::for_model(config),
        })
    }

    /// Replaces the retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, VectorStoreError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(batch.to_vec())
            .build()
            .map_err(|e| VectorStoreError::Embedding {
                message: e.to_string(),
                retryable: false,
            })?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| match classify_error(e) {
                LlmError::ApiRequest {
                    message, retryable, ..
                } => VectorStoreError::Embedding { message, retryable },
                other => VectorStoreError::Embedding {
                    message: other.to_string(),
                    retryable: false,
                },
            })?;

        let mut data = response.data;
        data.sort_by_key(|e| e.index);
        if data.len() != batch.len() {
            return Err(VectorStoreError::CountMismatch {
                chunks: batch.len(),
                embeddings: data.len(),
            });
        }
        Ok(data.into_iter().map(|e| e.embedding).collect())
    }
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("client", &"<async-openai::Client>")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimensions(&self) -> Option<usize> {
        None
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VectorStoreError> {
        let this = self;
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(OPENAI_BATCH_SIZE) {
            debug!(model = %self.model, inputs = batch.len(), "Requesting embeddings");
            let embedded = self
                .retry
                .run_async(
                    "openai.embeddings",
                    move || this.embed_batch(batch),
                    |e: &VectorStoreError| {
                        matches!(e, VectorStoreError::Embedding { retryable: true, .. })
                    },
                )
                .await?;
            vectors.extend(embedded);
        }
        Ok(vectors)
    }
}

/// Deterministic local embeddings by signed feature hashing.
///
/// Lowercased words are hashed (FNV-1a) into a fixed number of buckets and
/// the vector is L2-normalized, so texts sharing words score high under
/// cosine similarity. Needs no network and yields identical vectors across
/// runs, which keeps persisted stores usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_HASH_DIMENSIONS,
        }
    }
}

impl HashEmbedder {
    /// Creates an embedder with `dimensions` buckets (at least 1).
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Embeds one text synchronously.
    #[must_use]
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text.unicode_words() {
            let hash = fnv1a(word.to_lowercase().as_bytes());
            #[allow(clippy::cast_possible_truncation)]
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    fn dimensions(&self) -> Option<usize> {
        Some(self.dimensions)
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VectorStoreError> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, &b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}
