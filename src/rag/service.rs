//! Service facade shared by the HTTP surface: ingestion plus question answering.

use super::{
    synthesizer::AnswerSynthesizer,
    types::{AnswerOutcome, RagError},
};
use crate::{
    config::Config,
    embedding::build_embedding_client,
    knowledge::{DocumentInfo, KnowledgeBase, KnowledgeBaseError, UploadOutcome},
    llm::build_chat_client,
    store::open_store,
};
use async_trait::async_trait;

/// Operations exposed to external surfaces.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Store an uploaded document and rebuild the knowledge base.
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<UploadOutcome, KnowledgeBaseError>;

    /// Answer a question, optionally restricted to one document.
    async fn answer(&self, question: &str, document_id: Option<&str>) -> AnswerOutcome;

    /// Enumerate stored documents.
    async fn list_documents(&self) -> Result<Vec<DocumentInfo>, KnowledgeBaseError>;

    /// Whether a snapshot is available for queries.
    fn is_ready(&self) -> bool;
}

/// Default [`RagApi`] implementation backed by a [`KnowledgeBase`] and an [`AnswerSynthesizer`].
///
/// Construct it once in `main` and share it through an `Arc`.
pub struct RagService {
    knowledge: KnowledgeBase,
    synthesizer: AnswerSynthesizer,
}

impl RagService {
    /// Assemble a service from prebuilt parts.
    pub fn new(knowledge: KnowledgeBase, synthesizer: AnswerSynthesizer) -> Self {
        Self {
            knowledge,
            synthesizer,
        }
    }

    /// Build every component selected by `config`.
    pub fn from_config(config: &Config) -> Result<Self, RagError> {
        tracing::info!(provider = ?config.embedding_provider, "Initializing embedding client");
        let embedder = build_embedding_client(config)?;
        tracing::info!(model = %config.chat_model, "Initializing chat client");
        let chat = build_chat_client(config)?;
        tracing::info!(backend = ?config.vector_store, "Opening vector store");
        let store = open_store(config)?;

        let knowledge = KnowledgeBase::new(
            config.knowledge_base_dir.clone(),
            config.chunk_size,
            config.chunk_overlap,
            embedder.clone(),
            store,
        );
        let synthesizer = AnswerSynthesizer::new(
            chat,
            embedder,
            config.retrieval_top_k,
            config.filtered_top_k,
        );
        Ok(Self::new(knowledge, synthesizer))
    }

    /// Restore or build the knowledge base at startup.
    pub async fn bootstrap(&self) {
        self.knowledge.bootstrap().await;
    }

    /// Underlying knowledge-base manager.
    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<UploadOutcome, KnowledgeBaseError> {
        self.knowledge.upload(&bytes, filename).await
    }

    async fn answer(&self, question: &str, document_id: Option<&str>) -> AnswerOutcome {
        tracing::info!(question, document_id, "Received question");
        self.synthesizer
            .answer(self.knowledge.snapshot(), question, document_id)
            .await
    }

    async fn list_documents(&self) -> Result<Vec<DocumentInfo>, KnowledgeBaseError> {
        self.knowledge.list().await
    }

    fn is_ready(&self) -> bool {
        self.knowledge.is_ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn hashing_config(dir: &TempDir) -> Config {
        let root = dir.path().display().to_string();
        let vars: HashMap<&str, String> = HashMap::from([
            ("GOOGLE_API_KEY", "test-key".to_string()),
            ("EMBEDDING_PROVIDER", "hashing".to_string()),
            ("EMBEDDING_DIMENSION", "32".to_string()),
            ("KNOWLEDGE_BASE_DIR", format!("{root}/kb")),
            ("VECTOR_STORE_DIR", format!("{root}/store")),
        ]);
        Config::from_lookup(|key| vars.get(key).cloned()).expect("config")
    }

    #[tokio::test]
    async fn from_config_starts_unloaded_and_lists_nothing() {
        let dir = TempDir::new().expect("tempdir");
        let service = RagService::from_config(&hashing_config(&dir)).expect("service");

        service.bootstrap().await;

        assert!(!service.is_ready());
        assert!(service.list_documents().await.expect("list").is_empty());
        assert_eq!(
            service.answer("Anything?", None).await,
            AnswerOutcome::NotReady
        );
    }

    #[tokio::test]
    async fn upload_makes_service_ready() {
        let dir = TempDir::new().expect("tempdir");
        let service = RagService::from_config(&hashing_config(&dir)).expect("service");

        let outcome = service
            .upload(b"Paris is the capital of France.".to_vec(), "notes.txt")
            .await
            .expect("upload");

        assert_eq!(outcome.filename, "notes.txt");
        assert!(service.is_ready());
        assert_eq!(
            service.knowledge().documents_dir(),
            dir.path().join("kb").as_path()
        );
    }
}
