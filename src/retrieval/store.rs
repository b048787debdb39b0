//! Vector stores: flat cosine-similarity scans over stored embeddings.

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use super::loader::{Document, Metadata};
use crate::config::{RetrievalConfig, StoreKind};
use crate::error::VectorStoreError;

/// A stored chunk with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// The chunk.
    pub document: Document,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

/// Storage and similarity search for embedded chunks.
pub trait VectorStore: Send + Sync {
    /// Backend name.
    fn name(&self) -> &'static str;

    /// Appends chunks with their embeddings. Returns the number added.
    fn add(&self, chunks: &[Document], embeddings: &[Vec<f32>]) -> Result<usize, VectorStoreError>;

    /// Atomically replaces all contents. On error the previous contents
    /// remain.
    fn replace(
        &self,
        chunks: &[Document],
        embeddings: &[Vec<f32>],
    ) -> Result<usize, VectorStoreError>;

    /// Up to `k` chunks ordered by descending cosine similarity.
    fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, VectorStoreError>;

    /// Number of stored chunks.
    fn len(&self) -> Result<usize, VectorStoreError>;

    /// Whether the store holds no chunks.
    fn is_empty(&self) -> Result<bool, VectorStoreError> {
        Ok(self.len()? == 0)
    }
}

/// Opens the backend selected by `config.store_kind`.
///
/// SQLite stores open (or create) `persist_path` and use the table named by
/// `collection_name`.
pub fn create_vector_store(
    config: &RetrievalConfig,
) -> Result<Arc<dyn VectorStore>, VectorStoreError> {
    match config.store_kind() {
        StoreKind::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreKind::Sqlite => Ok(Arc::new(SqliteStore::open(
            config.persist_path(),
            config.collection_name(),
        )?)),
    }
}

/// Cosine similarity; zero for empty, mismatched, or zero-norm inputs.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;
    if denom <= f32::EPSILON { 0.0 } else { dot / denom }
}

/// Checks counts and dimensions; returns the batch dimension.
fn check_batch(
    chunks: &[Document],
    embeddings: &[Vec<f32>],
    expected: Option<usize>,
) -> Result<Option<usize>, VectorStoreError> {
    if chunks.len() != embeddings.len() {
        return Err(VectorStoreError::CountMismatch {
            chunks: chunks.len(),
            embeddings: embeddings.len(),
        });
    }
    let mut dim = expected;
    for embedding in embeddings {
        match dim {
            Some(d) if d != embedding.len() => {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: d,
                    actual: embedding.len(),
                });
            }
            Some(_) => {}
            None => dim = Some(embedding.len()),
        }
    }
    Ok(dim)
}

fn rank(mut scored: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(k);
    scored
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<Vec<(Document, Vec<f32>)>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn dimension(entries: &[(Document, Vec<f32>)]) -> Option<usize> {
        entries.first().map(|(_, e)| e.len())
    }
}

impl VectorStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn add(&self, chunks: &[Document], embeddings: &[Vec<f32>]) -> Result<usize, VectorStoreError> {
        let mut entries = self.entries.write();
        check_batch(chunks, embeddings, Self::dimension(&entries))?;
        entries.extend(chunks.iter().cloned().zip(embeddings.iter().cloned()));
        Ok(chunks.len())
    }

    fn replace(
        &self,
        chunks: &[Document],
        embeddings: &[Vec<f32>],
    ) -> Result<usize, VectorStoreError> {
        check_batch(chunks, embeddings, None)?;
        let fresh: Vec<_> = chunks.iter().cloned().zip(embeddings.iter().cloned()).collect();
        *self.entries.write() = fresh;
        Ok(chunks.len())
    }

    fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, VectorStoreError> {
        let entries = self.entries.read();
        if let Some(dim) = Self::dimension(&entries)
            && dim != query.len()
        {
            return Err(VectorStoreError::DimensionMismatch {
                expected: dim,
                actual: query.len(),
            });
        }
        let scored = entries
            .iter()
            .map(|(doc, embedding)| ScoredChunk {
                document: doc.clone(),
                score: cosine_similarity(query, embedding),
            })
            .collect();
        Ok(rank(scored, k))
    }

    fn len(&self) -> Result<usize, VectorStoreError> {
        Ok(self.entries.read().len())
    }
}

/// SQLite-backed store; one table per collection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    table: String,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens or creates the database at `path`, creating parent
    /// directories as needed.
    ///
    /// `collection` must be a plain identifier (letters, digits, `_`, `-`).
    pub fn open(path: &Path, collection: &str) -> Result<Self, VectorStoreError> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .map_err(|e| VectorStoreError::Backend(format!("{}: {e}", dir.display())))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        let store = Self::with_connection(conn, collection)?;
        info!(
            path = %path.display(),
            collection,
            chunks = store.len()?,
            "SQLite vector store opened"
        );
        Ok(store)
    }

    /// A store that lives only as long as this value.
    pub fn in_memory(collection: &str) -> Result<Self, VectorStoreError> {
        Self::with_connection(Connection::open_in_memory()?, collection)
    }

    fn with_connection(conn: Connection, collection: &str) -> Result<Self, VectorStoreError> {
        if collection.is_empty()
            || !collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(VectorStoreError::Backend(format!(
                "invalid collection name '{collection}'"
            )));
        }
        let table = format!("\"{collection}\"");
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                text TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{{}}',
                embedding BLOB NOT NULL
            )"
        ))?;
        Ok(Self {
            conn: Mutex::new(conn),
            table,
        })
    }

    fn stored_dimension(&self, conn: &Connection) -> Result<Option<usize>, VectorStoreError> {
        let bytes: Option<i64> = conn
            .query_row(
                &format!("SELECT length(embedding) FROM {} LIMIT 1", self.table),
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(bytes.and_then(|b| usize::try_from(b).ok()).map(|b| b / 4))
    }

    fn insert_all(
        &self,
        tx: &rusqlite::Transaction<'_>,
        chunks: &[Document],
        embeddings: &[Vec<f32>],
    ) -> Result<(), VectorStoreError> {
        let mut stmt = tx.prepare_cached(&format!(
            "INSERT INTO {} (text, metadata, embedding) VALUES (?1, ?2, ?3)",
            self.table
        ))?;
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let metadata = serde_json::to_string(&chunk.metadata)
                .map_err(|e| VectorStoreError::Backend(e.to_string()))?;
            stmt.execute(params![chunk.text, metadata, serialize_embedding(embedding)])?;
        }
        Ok(())
    }
}

impl VectorStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn add(&self, chunks: &[Document], embeddings: &[Vec<f32>]) -> Result<usize, VectorStoreError> {
        let mut conn = self.conn.lock();
        let existing = self.stored_dimension(&conn)?;
        check_batch(chunks, embeddings, existing)?;
        let tx = conn.transaction()?;
        self.insert_all(&tx, chunks, embeddings)?;
        tx.commit()?;
        debug!(table = %self.table, added = chunks.len(), "Chunks added");
        Ok(chunks.len())
    }

    fn replace(
        &self,
        chunks: &[Document],
        embeddings: &[Vec<f32>],
    ) -> Result<usize, VectorStoreError> {
        check_batch(chunks, embeddings, None)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(&format!("DELETE FROM {}", self.table), [])?;
        self.insert_all(&tx, chunks, embeddings)?;
        tx.commit()?;
        debug!(table = %self.table, stored = chunks.len(), "Collection replaced");
        Ok(chunks.len())
    }

    fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, VectorStoreError> {
        let conn = self.conn.lock();
        if let Some(dim) = self.stored_dimension(&conn)?
            && dim != query.len()
        {
            return Err(VectorStoreError::DimensionMismatch {
                expected: dim,
                actual: query.len(),
            });
        }
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT text, metadata, embedding FROM {} ORDER BY id",
            self.table
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
            ))
        })?;

        let mut scored = Vec::new();
        for row in rows {
            let (text, metadata, blob) = row?;
            let metadata: Metadata = serde_json::from_str(&metadata).unwrap_or_default();
            scored.push(ScoredChunk {
                score: cosine_similarity(query, &deserialize_embedding(&blob)),
                document: Document { text, metadata },
            });
        }
        Ok(rank(scored, k))
    }

    fn len(&self) -> Result<usize, VectorStoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
