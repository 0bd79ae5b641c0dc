//! Vector store abstraction built around immutable snapshots.
//!
//! A rebuild hands the complete set of embedded chunks to [`VectorStore::replace_all`], which
//! writes a new generation next to the current one and publishes it only once it is complete.
//! The returned [`VectorSnapshot`] is never mutated, so readers holding an older snapshot keep a
//! consistent view while the next generation is built.
//!
//! [`LocalVectorStore`] keeps generations as embedded LanceDB tables; [`QdrantVectorStore`]
//! keeps them as Qdrant collections behind an alias.

pub mod local;
pub mod qdrant;

use crate::{
    config::{Config, VectorStoreBackend},
    knowledge::Chunk,
    qdrant::QdrantError,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use local::LocalVectorStore;
pub use qdrant::QdrantVectorStore;

/// Errors raised by vector store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem access failed.
    #[error("Vector store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// Embedded LanceDB operation failed.
    #[error("LanceDB operation failed: {0}")]
    Lance(#[from] lancedb::Error),
    /// Arrow record batch could not be built.
    #[error("Arrow batch is invalid: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),
    /// Stored table does not have the expected columns.
    #[error("Vector table is malformed: {0}")]
    MalformedTable(String),
    /// A generation must contain at least one chunk.
    #[error("Refusing to publish an empty generation")]
    EmptyGeneration,
    /// Qdrant request failed.
    #[error("Qdrant request failed: {0}")]
    Qdrant(#[from] QdrantError),
    /// Vectors of different lengths were mixed in one snapshot or query.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the stored vectors.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// Backend could not be constructed from configuration.
    #[error("Vector store misconfigured: {0}")]
    Misconfigured(String),
}

/// Chunk paired with its content hash and embedding, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    /// Chunk text.
    pub text: String,
    /// Identifier of the originating document.
    pub source: String,
    /// Page the chunk was cut from.
    pub page: usize,
    /// Position of the chunk within its page.
    pub index: usize,
    /// SHA-256 of the chunk text.
    pub chunk_hash: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
}

impl EmbeddedChunk {
    /// Attach an embedding to a chunk.
    pub fn new(chunk: Chunk, vector: Vec<f32>) -> Self {
        let chunk_hash = crate::qdrant::compute_chunk_hash(&chunk.text);
        Self {
            text: chunk.text,
            source: chunk.source,
            page: chunk.page,
            index: chunk.index,
            chunk_hash,
            vector,
        }
    }
}

/// Search hit returned from a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Chunk text.
    pub text: String,
    /// Identifier of the originating document.
    pub source: String,
    /// Page the chunk was cut from.
    pub page: usize,
    /// Similarity score; higher is closer.
    pub score: f32,
}

/// Immutable, published collection of embedded chunks.
#[async_trait]
pub trait VectorSnapshot: Send + Sync {
    /// Generation identifier.
    fn id(&self) -> &str;

    /// Number of stored chunks.
    fn len(&self) -> usize;

    /// Whether the snapshot holds no chunks.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return up to `limit` chunks closest to `vector`, restricted to `source` when given.
    async fn similarity_search(
        &self,
        vector: &[f32],
        limit: usize,
        source: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, StoreError>;
}

/// Backend that builds and publishes snapshots.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Build a new generation from `chunks`, publish it, and return it.
    ///
    /// The previously published generation stays current until this call succeeds.
    async fn replace_all(
        &self,
        chunks: Vec<EmbeddedChunk>,
    ) -> Result<Arc<dyn VectorSnapshot>, StoreError>;

    /// Reopen the most recently published generation, if any.
    async fn open_current(&self) -> Result<Option<Arc<dyn VectorSnapshot>>, StoreError>;
}

/// Construct the backend selected by configuration.
pub fn open_store(config: &Config) -> Result<Arc<dyn VectorStore>, StoreError> {
    match config.vector_store {
        VectorStoreBackend::Local => Ok(Arc::new(LocalVectorStore::new(
            config.vector_store_dir.clone(),
        ))),
        VectorStoreBackend::Qdrant => {
            let url = config.qdrant_url.as_deref().ok_or_else(|| {
                StoreError::Misconfigured("QDRANT_URL is required for the qdrant backend".into())
            })?;
            let service = crate::qdrant::QdrantService::new(url, config.qdrant_api_key.clone())?;
            Ok(Arc::new(QdrantVectorStore::new(
                service,
                config.qdrant_collection_prefix.clone(),
                config.embedding_dimension as u64,
            )))
        }
    }
}

/// Generate a sortable generation identifier.
pub(crate) fn new_generation_id() -> String {
    let now = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{now:024}-{}", &suffix[..8])
}
