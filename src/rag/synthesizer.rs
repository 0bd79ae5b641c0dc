//! Retrieval and answer generation over a published snapshot.

use super::{
    prompt::{filtered_prompt, qa_prompt},
    types::{AnswerOutcome, RagError},
};
use crate::{
    embedding::EmbeddingClient,
    llm::ChatClient,
    store::{ScoredChunk, VectorSnapshot},
};
use std::sync::Arc;

/// Turns a question into an answer using retrieved chunks as context.
pub struct AnswerSynthesizer {
    chat: Arc<dyn ChatClient>,
    embedder: Arc<dyn EmbeddingClient>,
    top_k: usize,
    filtered_top_k: usize,
}

impl AnswerSynthesizer {
    /// `top_k` bounds retrieval for open questions, `filtered_top_k` for single-document ones.
    pub fn new(
        chat: Arc<dyn ChatClient>,
        embedder: Arc<dyn EmbeddingClient>,
        top_k: usize,
        filtered_top_k: usize,
    ) -> Self {
        Self {
            chat,
            embedder,
            top_k,
            filtered_top_k,
        }
    }

    /// Answer `query` against `snapshot`, optionally restricted to one document.
    ///
    /// Never fails outward: errors are logged and reported as [`AnswerOutcome::Failed`].
    pub async fn answer(
        &self,
        snapshot: Option<Arc<dyn VectorSnapshot>>,
        query: &str,
        document_filter: Option<&str>,
    ) -> AnswerOutcome {
        let Some(snapshot) = snapshot else {
            tracing::warn!("Question received before the knowledge base was loaded");
            return AnswerOutcome::NotReady;
        };
        let filter = document_filter
            .map(str::trim)
            .filter(|filter| !filter.is_empty());

        match self.try_answer(snapshot.as_ref(), query, filter).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!(error = %error, filter, "Failed to answer question");
                AnswerOutcome::Failed(error.to_string())
            }
        }
    }

    async fn try_answer(
        &self,
        snapshot: &dyn VectorSnapshot,
        query: &str,
        filter: Option<&str>,
    ) -> Result<AnswerOutcome, RagError> {
        let vector = self.embed_query(query).await?;

        let prompt = match filter {
            None => {
                let hits = snapshot.similarity_search(&vector, self.top_k, None).await?;
                tracing::debug!(snapshot = snapshot.id(), hits = hits.len(), "Retrieved context");
                qa_prompt(&join_context(&hits), query)
            }
            Some(source) => {
                let hits = snapshot
                    .similarity_search(&vector, self.filtered_top_k, Some(source))
                    .await?;
                tracing::debug!(
                    snapshot = snapshot.id(),
                    source,
                    hits = hits.len(),
                    "Retrieved filtered context"
                );
                if hits.is_empty() {
                    return Ok(AnswerOutcome::NoRelevantContent);
                }
                filtered_prompt(&join_context(&hits), query)
            }
        };

        let answer = self.chat.complete(&prompt).await?;
        Ok(AnswerOutcome::Answered(answer))
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RagError> {
        self.embedder
            .generate_embeddings(vec![query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or(RagError::EmptyEmbedding)
    }
}

fn join_context(hits: &[ScoredChunk]) -> String {
    hits.iter()
        .map(|hit| hit.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
