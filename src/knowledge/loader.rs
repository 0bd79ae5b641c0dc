//! File loading: turn a stored document into page records.
//!
//! Loading never fails outward. Unsupported files and read or parse errors are logged and
//! produce no pages, which the caller counts as "nothing extracted".

use super::types::{DocumentKind, Page};
use lopdf::Document;
use std::path::Path;

/// Load `path` into pages attributed to `source`.
pub async fn load_document(path: &Path, source: &str) -> Vec<Page> {
    let Some(kind) = DocumentKind::from_path(path) else {
        tracing::warn!(path = %path.display(), "Skipping file with unsupported extension");
        return Vec::new();
    };

    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::error!(path = %path.display(), error = %error, "Failed to read document");
            return Vec::new();
        }
    };

    let pages = match kind {
        DocumentKind::Text => load_text(bytes, source),
        DocumentKind::Pdf => load_pdf(bytes, source).await,
    };
    tracing::debug!(source, pages = pages.len(), "Document loaded");
    pages
}

fn load_text(bytes: Vec<u8>, source: &str) -> Vec<Page> {
    match String::from_utf8(bytes) {
        Ok(text) => vec![Page {
            text,
            source: source.to_string(),
            page: 0,
        }],
        Err(error) => {
            tracing::error!(source, error = %error, "Text document is not valid UTF-8");
            Vec::new()
        }
    }
}

/// Parse the PDF off the async executor and extract text page by page.
async fn load_pdf(bytes: Vec<u8>, source: &str) -> Vec<Page> {
    let owned_source = source.to_string();
    let extraction = tokio::task::spawn_blocking(move || extract_pdf_pages(&bytes, &owned_source))
        .await;

    match extraction {
        Ok(Ok(pages)) => pages,
        Ok(Err(error)) => {
            tracing::error!(source, error = %error, "Failed to parse PDF");
            Vec::new()
        }
        Err(error) => {
            tracing::error!(source, error = %error, "PDF extraction task failed");
            Vec::new()
        }
    }
}

fn extract_pdf_pages(bytes: &[u8], source: &str) -> Result<Vec<Page>, lopdf::Error> {
    let document = Document::load_mem(bytes)?;
    let mut page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    page_numbers.sort_unstable();

    let mut pages = Vec::with_capacity(page_numbers.len());
    for (index, number) in page_numbers.into_iter().enumerate() {
        match document.extract_text(&[number]) {
            Ok(text) => pages.push(Page {
                text,
                source: source.to_string(),
                page: index,
            }),
            Err(error) => {
                tracing::warn!(source, page = number, error = %error, "Skipping unreadable PDF page");
            }
        }
    }
    Ok(pages)
}
