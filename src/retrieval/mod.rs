//! Retrieval-augmented generation.
//!
//! ```text
//! paths ──load──▶ Document ──split──▶ chunks ──embed──▶ VectorStore
//!                                                         │
//! question ──embed──▶ similarity_search ◀─────────────────┘
//!                          │
//!                          ▼
//!               RagChain: {context} + {question} ──▶ ChatModel
//! ```

pub mod chain;
pub mod embedding;
pub mod loader;
pub mod retriever;
pub mod splitter;
pub mod store;

pub use chain::{RagAnswer, RagChain};
pub use embedding::{
    DEFAULT_HASH_DIMENSIONS, Embedder, HashEmbedder, OpenAiEmbedder, create_embedder,
};
pub use loader::{Document, FileFormat, Metadata, load_document, load_documents};
pub use retriever::{IndexSummary, Retriever};
pub use splitter::RecursiveTextSplitter;
pub use store::{
    MemoryStore, ScoredChunk, SqliteStore, VectorStore, cosine_similarity, create_vector_store,
};
