//! Helpers for constructing, reading, and hashing Qdrant payloads.

use crate::store::{EmbeddedChunk, ScoredChunk};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

use super::types::ScoredPoint;

/// Build the payload object stored alongside each indexed chunk.
pub(crate) fn build_payload(chunk: &EmbeddedChunk, timestamp_rfc3339: &str) -> Value {
    json!({
        "text": chunk.text,
        "source": chunk.source,
        "page": chunk.page,
        "chunk_index": chunk.index,
        "chunk_hash": chunk.chunk_hash,
        "indexed_at": timestamp_rfc3339,
    })
}

/// Turn a scored point back into a search hit; points without text are dropped.
pub(crate) fn scored_chunk_from_point(point: ScoredPoint) -> Option<ScoredChunk> {
    let ScoredPoint { score, payload, .. } = point;
    let payload = payload?;
    let text = string_field(&payload, "text")?;
    Some(ScoredChunk {
        text,
        source: string_field(&payload, "source").unwrap_or_default(),
        page: payload
            .get("page")
            .and_then(Value::as_u64)
            .map(|page| page as usize)
            .unwrap_or_default(),
        score,
    })
}

fn string_field(payload: &Map<String, Value>, key: &str) -> Option<String> {
    match payload.get(key) {
        Some(Value::String(value)) => Some(value.clone()),
        _ => None,
    }
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Construct an identifier suitable for Qdrant points.
pub(crate) fn generate_point_id() -> String {
    Uuid::new_v4().to_string()
}
