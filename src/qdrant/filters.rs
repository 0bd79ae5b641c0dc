//! Filter helpers for Qdrant search queries.

use serde_json::{Value, json};

/// Exact-match filter on the `source` payload field; `None` for a blank or absent source.
pub fn build_source_filter(source: Option<&str>) -> Option<Value> {
    let source = source.map(str::trim).filter(|value| !value.is_empty())?;
    Some(json!({
        "must": [
            {
                "key": "source",
                "match": { "value": source }
            }
        ]
    }))
}
