//! Core data types and error definitions for the knowledge base.

use crate::{embedding::EmbeddingClientError, store::StoreError};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

/// Supported document formats, decided by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Portable Document Format, split page by page.
    Pdf,
    /// UTF-8 plain text, loaded as a single page.
    Text,
}

impl DocumentKind {
    /// Classify a path by its (case-insensitive) extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Text),
            _ => None,
        }
    }

    /// Classify a bare filename.
    pub fn from_filename(filename: &str) -> Option<Self> {
        Self::from_path(Path::new(filename))
    }
}

/// One unit of extracted text: a PDF page, or a whole text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Extracted text.
    pub text: String,
    /// Identifier of the originating document.
    pub source: String,
    /// Zero-based page index within the document.
    pub page: usize,
}

/// Bounded text window derived from a page; the unit that gets embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Chunk text.
    pub text: String,
    /// Identifier of the originating document.
    pub source: String,
    /// Page the chunk was cut from.
    pub page: usize,
    /// Position of the chunk within its page.
    pub index: usize,
}

/// Errors produced while cutting pages into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible chunk budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Errors emitted by knowledge-base operations.
#[derive(Debug, Error)]
pub enum KnowledgeBaseError {
    /// Uploaded file does not carry a `.pdf` or `.txt` extension.
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),
    /// Uploaded filename has no usable final path component.
    #[error("Invalid filename: {0:?}")]
    InvalidFilename(String),
    /// The knowledge-base directory holds no supported documents.
    #[error("No supported documents found in the knowledge base")]
    NoSupportedDocuments,
    /// Documents were found but no text could be extracted from them.
    #[error("No text could be extracted from {documents} document(s)")]
    NoChunks {
        /// Number of documents scanned.
        documents: usize,
    },
    /// Filesystem access failed.
    #[error("Knowledge base I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// Chunking step failed to segment a document.
    #[error("Failed to chunk documents: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Vector store rejected the new snapshot.
    #[error("Vector store update failed: {0}")]
    Store(#[from] StoreError),
    /// Background worker panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result of a successful rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildSummary {
    /// Number of documents that contributed to the new snapshot.
    pub documents: usize,
    /// Number of chunks embedded into the new snapshot.
    pub chunks: usize,
    /// Identifier of the published snapshot.
    pub snapshot_id: String,
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Name the document was stored under.
    pub filename: String,
    /// Rebuild triggered by the upload.
    pub rebuild: RebuildSummary,
}

/// Directory listing entry for an uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    /// Path relative to the knowledge-base directory.
    pub name: String,
    /// File size in bytes.
    pub size: u64,
    /// Last modification time, RFC 3339.
    pub last_modified: String,
}
