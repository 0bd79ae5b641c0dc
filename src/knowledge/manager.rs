//! Knowledge-base manager: owns the document directory and the published vector snapshot.

use super::{
    chunking::chunk_pages,
    loader::load_document,
    types::{DocumentInfo, DocumentKind, KnowledgeBaseError, RebuildSummary, UploadOutcome},
};
use crate::{
    embedding::EmbeddingClient,
    store::{EmbeddedChunk, VectorSnapshot, VectorStore},
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use walkdir::WalkDir;

/// Coordinates uploads and full rebuilds of the vector snapshot.
///
/// Readers obtain the current snapshot through [`KnowledgeBase::snapshot`], which clones an
/// `Arc` under a short read lock. Rebuilds construct and publish the next snapshot completely
/// before swapping that pointer, so a query always sees one whole generation.
pub struct KnowledgeBase {
    documents_dir: PathBuf,
    chunk_size: usize,
    chunk_overlap: usize,
    embedding_client: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    active: RwLock<Option<Arc<dyn VectorSnapshot>>>,
    rebuild_lock: Mutex<()>,
}

impl KnowledgeBase {
    /// Create a manager over `documents_dir`; no snapshot is loaded until [`Self::bootstrap`]
    /// or a rebuild runs.
    pub fn new(
        documents_dir: PathBuf,
        chunk_size: usize,
        chunk_overlap: usize,
        embedding_client: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            documents_dir,
            chunk_size,
            chunk_overlap,
            embedding_client,
            store,
            active: RwLock::new(None),
            rebuild_lock: Mutex::new(()),
        }
    }

    /// Directory holding uploaded documents.
    pub fn documents_dir(&self) -> &Path {
        &self.documents_dir
    }

    /// Currently published snapshot, if any.
    pub fn snapshot(&self) -> Option<Arc<dyn VectorSnapshot>> {
        match self.active.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Whether a snapshot has been published.
    pub fn is_ready(&self) -> bool {
        self.snapshot().is_some()
    }

    fn install(&self, snapshot: Arc<dyn VectorSnapshot>) {
        let mut guard = match self.active.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(snapshot);
    }

    /// Restore the last published snapshot, or build one from documents already on disk.
    ///
    /// Failures are logged and leave the knowledge base unloaded.
    pub async fn bootstrap(&self) {
        match self.store.open_current().await {
            Ok(Some(snapshot)) => {
                tracing::info!(
                    snapshot = snapshot.id(),
                    chunks = snapshot.len(),
                    "Loaded existing vector snapshot"
                );
                self.install(snapshot);
                return;
            }
            Ok(None) => tracing::info!("No published vector snapshot found"),
            Err(error) => {
                tracing::error!(error = %error, "Failed to open existing vector snapshot");
            }
        }

        match self.rebuild().await {
            Ok(summary) => tracing::info!(
                documents = summary.documents,
                chunks = summary.chunks,
                "Indexed documents found at startup"
            ),
            Err(KnowledgeBaseError::NoSupportedDocuments) => {
                tracing::info!(dir = %self.documents_dir.display(), "Knowledge base is empty");
            }
            Err(error) => tracing::error!(error = %error, "Startup indexing failed"),
        }
    }

    /// Store an uploaded document and rebuild the snapshot.
    ///
    /// Unsupported or unusable filenames are rejected before anything is written.
    pub async fn upload(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<UploadOutcome, KnowledgeBaseError> {
        let filename = sanitize_filename(filename)?;
        if DocumentKind::from_filename(&filename).is_none() {
            return Err(KnowledgeBaseError::UnsupportedFileType(filename));
        }

        tokio::fs::create_dir_all(&self.documents_dir).await?;
        let path = self.documents_dir.join(&filename);
        tokio::fs::write(&path, bytes).await?;
        tracing::info!(
            filename = %filename,
            bytes = bytes.len(),
            "Stored uploaded document"
        );

        let rebuild = self.rebuild().await?;
        Ok(UploadOutcome { filename, rebuild })
    }

    /// Re-embed every supported document and publish the result as the new snapshot.
    ///
    /// The current snapshot is left in place when no documents are found, nothing can be
    /// extracted, or embedding/storage fails.
    pub async fn rebuild(&self) -> Result<RebuildSummary, KnowledgeBaseError> {
        let _guard = self.rebuild_lock.lock().await;

        let result = self.rebuild_locked().await;
        if let Err(error) = &result {
            tracing::error!(error = %error, "Knowledge base rebuild failed");
        }
        result
    }

    async fn rebuild_locked(&self) -> Result<RebuildSummary, KnowledgeBaseError> {
        let documents = scan_documents(self.documents_dir.clone()).await?;
        if documents.is_empty() {
            return Err(KnowledgeBaseError::NoSupportedDocuments);
        }
        tracing::info!(
            documents = documents.len(),
            dir = %self.documents_dir.display(),
            "Rebuilding knowledge base"
        );

        let mut pages = Vec::new();
        for (path, source) in &documents {
            pages.extend(load_document(path, source).await);
        }

        let chunks = chunk_pages(&pages, self.chunk_size, self.chunk_overlap)?;
        if chunks.is_empty() {
            return Err(KnowledgeBaseError::NoChunks {
                documents: documents.len(),
            });
        }
        tracing::info!(
            pages = pages.len(),
            chunks = chunks.len(),
            "Extracted document chunks"
        );

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedding_client.generate_embeddings(texts).await?;
        if vectors.len() != chunks.len() {
            return Err(KnowledgeBaseError::Embedding(
                crate::embedding::EmbeddingClientError::GenerationFailed(format!(
                    "expected {} embeddings, received {}",
                    chunks.len(),
                    vectors.len()
                )),
            ));
        }

        let embedded: Vec<EmbeddedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedChunk::new(chunk, vector))
            .collect();
        let chunk_count = embedded.len();

        let snapshot = self.store.replace_all(embedded).await?;
        let summary = RebuildSummary {
            documents: documents.len(),
            chunks: chunk_count,
            snapshot_id: snapshot.id().to_string(),
        };
        self.install(snapshot);
        tracing::info!(
            documents = summary.documents,
            chunks = summary.chunks,
            snapshot = %summary.snapshot_id,
            "Knowledge base rebuilt"
        );
        Ok(summary)
    }

    /// Enumerate stored files with size and modification time.
    pub async fn list(&self) -> Result<Vec<DocumentInfo>, KnowledgeBaseError> {
        let root = self.documents_dir.clone();
        Ok(tokio::task::spawn_blocking(move || list_files(&root)).await??)
    }
}

/// Keep only the final path component of a client-supplied filename.
fn sanitize_filename(filename: &str) -> Result<String, KnowledgeBaseError> {
    let candidate = filename
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .unwrap_or_default();
    if candidate.is_empty() || candidate == "." || candidate == ".." {
        return Err(KnowledgeBaseError::InvalidFilename(filename.to_string()));
    }
    Ok(candidate.to_string())
}

/// Identifier stored as chunk `source`: the path relative to `root`, `/`-separated.
fn source_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Collect supported documents under `root` as `(path, source)` pairs in a stable order.
async fn scan_documents(root: PathBuf) -> Result<Vec<(PathBuf, String)>, KnowledgeBaseError> {
    Ok(tokio::task::spawn_blocking(move || {
        if !root.exists() {
            return Vec::new();
        }
        WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(error) => {
                    tracing::warn!(error = %error, "Skipping unreadable directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| DocumentKind::from_path(entry.path()).is_some())
            .map(|entry| {
                let source = source_name(&root, entry.path());
                (entry.into_path(), source)
            })
            .collect()
    })
    .await?)
}

fn list_files(root: &Path) -> Result<Vec<DocumentInfo>, std::io::Error> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = entry.metadata().map_err(std::io::Error::other)?;
        let last_modified = metadata
            .modified()
            .ok()
            .map(OffsetDateTime::from)
            .and_then(|timestamp| {
                timestamp
                    .format(&time::format_description::well_known::Rfc3339)
                    .ok()
            })
            .unwrap_or_default();
        documents.push(DocumentInfo {
            name: source_name(root, entry.path()),
            size: metadata.len(),
            last_modified,
        });
    }
    Ok(documents)
}
