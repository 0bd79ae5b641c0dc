#![deny(missing_docs)]

//! Core library for the document question-answering server.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Document loading, chunking, and knowledge-base lifecycle.
pub mod knowledge;
/// Chat-completion client used for answer synthesis.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Qdrant REST integration.
pub mod qdrant;
/// Retrieval-augmented question answering.
pub mod rag;
/// Snapshot-based vector store backends.
pub mod store;
