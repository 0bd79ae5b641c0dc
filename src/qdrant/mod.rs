//! Qdrant integration over its REST API.

pub mod client;
pub mod filters;
pub mod payload;
pub mod types;

pub use client::QdrantService;
pub use filters::build_source_filter;
pub use payload::compute_chunk_hash;
pub use types::{AliasDescription, QdrantError, ScoredPoint};
