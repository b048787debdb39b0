//! Load, split, embed, and index documents; answer similarity queries.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::embedding::Embedder;
use super::loader::{Document, load_documents};
use super::splitter::RecursiveTextSplitter;
use super::store::{ScoredChunk, VectorStore, create_vector_store};
use crate::config::{RetrievalConfig, StoreKind};
use crate::error::{Result, VectorStoreError};

/// Counts from a completed indexing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSummary {
    /// Documents loaded (a paged PDF counts once per page).
    pub documents: usize,
    /// Chunks embedded and stored.
    pub chunks: usize,
}

/// The retrieval façade.
///
/// Holds no store until [`Retriever::load_and_index`] succeeds (or an
/// existing persisted collection is attached with
/// [`Retriever::from_persisted`]).
pub struct Retriever {
    config: RetrievalConfig,
    splitter: RecursiveTextSplitter,
    embedder: Arc<dyn Embedder>,
    store: RwLock<Option<Arc<dyn VectorStore>>>,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("config", &self.config)
            .field("embedder", &self.embedder.name())
            .field("indexed", &self.is_indexed())
            .finish()
    }
}

impl Retriever {
    /// Creates an empty retriever for a validated config snapshot.
    #[must_use]
    pub fn new(config: &RetrievalConfig, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            splitter: RecursiveTextSplitter::from_config(config),
            config: config.clone(),
            embedder,
            store: RwLock::new(None),
        }
    }

    /// Creates a retriever and, for SQLite stores, attaches the collection
    /// already persisted at `persist_path` when it holds chunks.
    pub fn from_persisted(
        config: &RetrievalConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, VectorStoreError> {
        let retriever = Self::new(config, embedder);
        if config.store_kind() == StoreKind::Sqlite && config.persist_path().exists() {
            let store = create_vector_store(config)?;
            let chunks = store.len()?;
            if chunks > 0 {
                info!(
                    collection = config.collection_name(),
                    chunks, "Attached persisted collection"
                );
                *retriever.store.write() = Some(store);
            }
        }
        Ok(retriever)
    }

    /// The config snapshot this retriever was built with.
    #[must_use]
    pub const fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Whether a store is available for queries.
    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.store.read().is_some()
    }

    /// Loads every path, splits the text, embeds the chunks, and stores
    /// them, replacing any previous index.
    ///
    /// Nothing changes if any step fails: the previous index stays
    /// queryable.
    pub async fn load_and_index<P: AsRef<Path>>(&self, paths: &[P]) -> Result<IndexSummary> {
        let documents = load_documents(paths)?;
        self.index_documents(&documents).await
    }

    /// Splits, embeds, and stores already-loaded documents, replacing any
    /// previous index.
    pub async fn index_documents(&self, documents: &[Document]) -> Result<IndexSummary> {
        let chunks = self.splitter.split_documents(documents);
        if chunks.is_empty() {
            warn!(documents = documents.len(), "Documents produced no chunks");
            return Err(VectorStoreError::NothingToIndex.into());
        }
        debug!(
            documents = documents.len(),
            chunks = chunks.len(),
            chunk_size = self.config.chunk_size(),
            chunk_overlap = self.config.chunk_overlap(),
            "Split documents"
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_documents(&texts).await?;

        let store = create_vector_store(&self.config)?;
        store.replace(&chunks, &embeddings)?;
        *self.store.write() = Some(store);

        info!(
            documents = documents.len(),
            chunks = chunks.len(),
            store = self.config.store_kind().as_str(),
            collection = self.config.collection_name(),
            "Indexed documents"
        );
        Ok(IndexSummary {
            documents: documents.len(),
            chunks: chunks.len(),
        })
    }

    /// Returns up to `top_k` chunks most similar to `query`, best first.
    /// `None` or `Some(0)` uses the configured `top_k`.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<ScoredChunk>, VectorStoreError> {
        let store = self.store()?;
        let k = top_k.filter(|&k| k > 0).unwrap_or(self.config.top_k());
        let embedding = self.embedder.embed_query(query).await?;
        let hits = store.similarity_search(&embedding, k)?;
        debug!(k, hits = hits.len(), "Retrieved chunks");
        Ok(hits)
    }

    /// The current store handle, for callers that search directly.
    pub fn store(&self) -> Result<Arc<dyn VectorStore>, VectorStoreError> {
        self.store.read().clone().ok_or(VectorStoreError::NotIndexed)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::config::EmbeddingProvider;
    use crate::error::{DocumentError, Error};
    use crate::retrieval::embedding::HashEmbedder;

    fn memory_config() -> RetrievalConfig {
        RetrievalConfig::builder()
            .store_kind(StoreKind::Memory)
            .embedding_provider(EmbeddingProvider::Hash)
            .chunk_size(80)
            .chunk_overlap(10)
            .top_k(2)
            .build()
            .unwrap_or_else(|_| unreachable!())
    }

    fn write(dir: &Path, name: &str, text: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap_or_else(|_| unreachable!());
        path
    }

    /// Fails every call after the first `ok_calls`.
    struct FlakyEmbedder {
        inner: HashEmbedder,
        ok_calls: usize,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        fn name(&self) -> &str {
            "flaky"
        }

        fn dimensions(&self) -> Option<usize> {
            self.inner.dimensions()
        }

        async fn embed_documents(
            &self,
            texts: &[String],
        ) -> Result<Vec<Vec<f32>>, VectorStoreError> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n >= self.ok_calls {
                return Err(VectorStoreError::Embedding {
                    message: "quota exceeded".to_string(),
                    retryable: false,
                });
            }
            self.inner.embed_documents(texts).await
        }
    }

    #[tokio::test]
    async fn test_retrieve_before_index_fails() {
        let retriever = Retriever::new(&memory_config(), Arc::new(HashEmbedder::default()));
        assert!(!retriever.is_indexed());
        assert!(matches!(
            retriever.retrieve("anything", None).await,
            Err(VectorStoreError::NotIndexed)
        ));
    }

    #[tokio::test]
    async fn test_index_then_retrieve() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let rust = write(
            dir.path(),
            "rust.txt",
            "Rust guarantees memory safety through ownership and borrowing.",
        );
        let bread = write(
            dir.path(),
            "bread.md",
            "Sourdough bread needs a starter, flour, water and salt.",
        );

        let retriever = Retriever::new(&memory_config(), Arc::new(HashEmbedder::default()));
        let summary = retriever
            .load_and_index(&[rust, bread])
            .await
            .unwrap_or_else(|e| panic!("index failed: {e}"));
        assert_eq!(summary.documents, 2);
        assert!(summary.chunks >= 2);
        assert!(retriever.is_indexed());

        let hits = retriever
            .retrieve("memory safety ownership", Some(1))
            .await
            .unwrap_or_default();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].document.source().is_some_and(|s| s.ends_with("rust.txt")));

        // Default k comes from the config
        let hits = retriever.retrieve("bread", None).await.unwrap_or_default();
        assert_eq!(hits.len(), 2);

        // Zero falls back to the config too
        let hits = retriever.retrieve("bread", Some(0)).await.unwrap_or_default();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_format_keeps_previous_index() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let good = write(dir.path(), "a.txt", "alpha beta gamma");
        let bad = write(dir.path(), "b.csv", "x,y");

        let retriever = Retriever::new(&memory_config(), Arc::new(HashEmbedder::default()));
        retriever
            .load_and_index(&[good.clone()])
            .await
            .unwrap_or_else(|e| panic!("index failed: {e}"));

        let err = retriever.load_and_index(&[good, bad]).await;
        assert!(matches!(
            err,
            Err(Error::Document(DocumentError::UnsupportedFormat { .. }))
        ));
        assert!(retriever.is_indexed());
        let hits = retriever.retrieve("alpha", None).await.unwrap_or_default();
        assert_eq!(hits[0].document.text, "alpha beta gamma");
    }

    #[tokio::test]
    async fn test_embedding_failure_keeps_previous_index() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let first = write(dir.path(), "first.txt", "first document");
        let second = write(dir.path(), "second.txt", "second document");

        let embedder = Arc::new(FlakyEmbedder {
            inner: HashEmbedder::new(16),
            ok_calls: 2,
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let retriever = Retriever::new(&memory_config(), embedder);
        retriever
            .load_and_index(&[first])
            .await
            .unwrap_or_else(|e| panic!("index failed: {e}"));
        // Query embedding uses the second successful call
        assert_eq!(retriever.retrieve("first", None).await.unwrap_or_default().len(), 1);

        assert!(retriever.load_and_index(&[second]).await.is_err());
        assert!(retriever.is_indexed());
    }

    #[tokio::test]
    async fn test_empty_documents_rejected() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let empty = write(dir.path(), "empty.txt", "  \n\n ");
        let retriever = Retriever::new(&memory_config(), Arc::new(HashEmbedder::default()));
        assert!(matches!(
            retriever.load_and_index(&[empty]).await,
            Err(Error::VectorStore(VectorStoreError::NothingToIndex))
        ));
        assert!(!retriever.is_indexed());
    }

    #[tokio::test]
    async fn test_sqlite_reattach() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let doc = write(dir.path(), "doc.txt", "persisted knowledge about lighthouses");
        let config = RetrievalConfig::builder()
            .persist_path(dir.path().join("db/store.db"))
            .embedding_provider(EmbeddingProvider::Hash)
            .build()
            .unwrap_or_else(|_| unreachable!());

        let retriever = Retriever::new(&config, Arc::new(HashEmbedder::default()));
        retriever
            .load_and_index(&[doc])
            .await
            .unwrap_or_else(|e| panic!("index failed: {e}"));
        drop(retriever);

        let reopened = Retriever::from_persisted(&config, Arc::new(HashEmbedder::default()))
            .unwrap_or_else(|e| panic!("reopen failed: {e}"));
        assert!(reopened.is_indexed());
        let hits = reopened.retrieve("lighthouses", None).await.unwrap_or_default();
        assert_eq!(hits.len(), 1);
    }
}
