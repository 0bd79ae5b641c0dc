//! Outcome and error types for question answering.

use crate::{embedding::EmbeddingClientError, llm::ChatClientError, store::StoreError};
use thiserror::Error;

/// Message returned when no snapshot has been published yet.
pub const NOT_READY_MESSAGE: &str =
    "The knowledge base has not been loaded yet. Please upload a document first.";

/// Message returned when a document-filtered search finds nothing.
pub const NO_RELEVANT_CONTENT_MESSAGE: &str = "No relevant content found in the selected document.";

/// Errors raised while answering a question or assembling the service.
#[derive(Debug, Error)]
pub enum RagError {
    /// Embedding provider failed to produce a query vector.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Embedding provider returned no vector for the query.
    #[error("Embedding provider returned no vectors for the query")]
    EmptyEmbedding,
    /// Similarity search failed.
    #[error("Vector search failed: {0}")]
    Store(#[from] StoreError),
    /// Chat model call failed.
    #[error("Chat completion failed: {0}")]
    Chat(#[from] ChatClientError),
}

/// Result of answering one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// The model produced an answer.
    Answered(String),
    /// A document filter matched no chunks.
    NoRelevantContent,
    /// No snapshot has been published.
    NotReady,
    /// Embedding, search, or generation failed; holds the error text.
    Failed(String),
}

impl AnswerOutcome {
    /// Only [`AnswerOutcome::Answered`] counts as success.
    pub fn success(&self) -> bool {
        matches!(self, Self::Answered(_))
    }

    /// Text shown to the caller.
    pub fn message(&self) -> String {
        match self {
            Self::Answered(answer) => answer.clone(),
            Self::NoRelevantContent => NO_RELEVANT_CONTENT_MESSAGE.to_string(),
            Self::NotReady => NOT_READY_MESSAGE.to_string(),
            Self::Failed(error) => {
                format!("An error occurred while processing your query: {error}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_answered_is_success() {
        assert!(AnswerOutcome::Answered("Paris".into()).success());
        assert!(!AnswerOutcome::NoRelevantContent.success());
        assert!(!AnswerOutcome::NotReady.success());
        assert!(!AnswerOutcome::Failed("boom".into()).success());
    }

    #[test]
    fn failure_message_wraps_error_text() {
        let outcome = AnswerOutcome::Failed("quota exceeded".into());
        assert_eq!(
            outcome.message(),
            "An error occurred while processing your query: quota exceeded"
        );
        assert_eq!(AnswerOutcome::NotReady.message(), NOT_READY_MESSAGE);
    }
}
