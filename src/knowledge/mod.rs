//! Document ingestion: loading files, chunking text, and publishing vector snapshots.

pub mod chunking;
pub mod loader;
pub mod manager;
pub mod types;

pub use chunking::chunk_pages;
pub use loader::load_document;
pub use manager::KnowledgeBase;
pub use types::{
    Chunk, ChunkingError, DocumentInfo, DocumentKind, KnowledgeBaseError, Page, RebuildSummary,
    UploadOutcome,
};
