//! Character-budget chunking with overlap.
//!
//! Pages are cut with `semchunk-rs`, which splits recursively on the largest natural boundary
//! available (blank lines, then newlines, then other whitespace, then punctuation, then single
//! characters) until every piece fits the budget. Length is measured in characters.
//!
//! Overlap is added afterwards: every chunk after the first on a page is prefixed with the last
//! `overlap` characters of its predecessor. The semantic split runs with `chunk_size - overlap - 1`
//! so that the prefixed chunk (tail, one joining space, body) still fits in `chunk_size`; a final
//! trim enforces the bound in every case.

use super::types::{Chunk, ChunkingError, Page};
use semchunk_rs::Chunker;

/// Cut every page into chunks of at most `chunk_size` characters.
///
/// Returns an empty vector when the combined text of all pages is blank.
pub fn chunk_pages(
    pages: &[Page],
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if pages.iter().all(|page| page.text.trim().is_empty()) {
        return Ok(Vec::new());
    }

    let mut chunks = Vec::new();
    for page in pages {
        for (index, text) in chunk_text(&page.text, chunk_size, overlap)?
            .into_iter()
            .enumerate()
        {
            chunks.push(Chunk {
                text,
                source: page.source.clone(),
                page: page.page,
                index,
            });
        }
    }
    Ok(chunks)
}

/// Chunk a single text into overlapping windows bounded by `chunk_size` characters.
pub(crate) fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let effective_overlap = overlap.min(chunk_size.saturating_sub(1));
    let base_size = if effective_overlap == 0 {
        chunk_size
    } else {
        chunk_size.saturating_sub(effective_overlap + 1).max(1)
    };

    let chunker = Chunker::new(base_size, Box::new(|segment: &str| segment.chars().count()));
    let base_chunks: Vec<String> = chunker
        .chunk(text)
        .into_iter()
        .filter(|chunk| !chunk.trim().is_empty())
        .collect();

    Ok(apply_overlap(base_chunks, chunk_size, effective_overlap))
}

/// Prefix each chunk with the tail of its predecessor, keeping the result within `chunk_size`.
fn apply_overlap(chunks: Vec<String>, chunk_size: usize, overlap: usize) -> Vec<String> {
    if overlap == 0 || chunks.len() < 2 {
        return chunks
            .into_iter()
            .map(|chunk| last_chars(&chunk, chunk_size).to_string())
            .collect();
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut previous: Option<String> = None;

    for current in chunks {
        let chunk = match previous.as_deref() {
            Some(prev) => build_overlapped_chunk(prev, &current, overlap, chunk_size),
            None => last_chars(&current, chunk_size).to_string(),
        };
        overlapped.push(chunk);
        previous = Some(current);
    }

    overlapped
}

fn build_overlapped_chunk(
    previous: &str,
    current: &str,
    overlap: usize,
    chunk_size: usize,
) -> String {
    let tail = last_chars(previous, overlap);
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);

    if !tail.is_empty() {
        combined.push_str(tail);
        if !ends_with_whitespace(tail) && !starts_with_whitespace(current) {
            combined.push(' ');
        }
    }

    combined.push_str(current);
    last_chars(&combined, chunk_size).to_string()
}

/// The final `limit` characters of `text`, or all of it when shorter.
///
/// Used both for the overlap tail and to enforce the chunk budget; whitespace is kept so the tail
/// is always exactly `limit` characters when the predecessor is long enough.
fn last_chars(text: &str, limit: usize) -> &str {
    if limit == 0 {
        return "";
    }
    match text.char_indices().rev().nth(limit - 1) {
        Some((offset, _)) => &text[offset..],
        None => text,
    }
}

fn starts_with_whitespace(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_whitespace)
}

fn ends_with_whitespace(text: &str) -> bool {
    text.chars().next_back().is_some_and(char::is_whitespace)
}
