//! Qdrant-backed snapshots: one collection per generation, published through an alias.
//!
//! A rebuild creates `<prefix>-<generation>`, uploads every chunk, and then repoints the alias
//! `<prefix>` at it with a single alias operation. The generation that was current before the
//! switch is kept so in-flight queries against it still succeed; anything older is deleted.

use super::{
    EmbeddedChunk, ScoredChunk, StoreError, VectorSnapshot, VectorStore, new_generation_id,
};
use crate::qdrant::{
    QdrantService, build_source_filter, payload::scored_chunk_from_point,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Snapshot stored as a Qdrant collection.
pub struct QdrantSnapshot {
    service: Arc<QdrantService>,
    collection: String,
    len: usize,
}

#[async_trait]
impl VectorSnapshot for QdrantSnapshot {
    fn id(&self) -> &str {
        &self.collection
    }

    fn len(&self) -> usize {
        self.len
    }

    async fn similarity_search(
        &self,
        vector: &[f32],
        limit: usize,
        source: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let points = self
            .service
            .search_points(&self.collection, vector, build_source_filter(source), limit)
            .await?;
        Ok(points
            .into_iter()
            .filter_map(scored_chunk_from_point)
            .collect())
    }
}

/// Vector store that keeps each generation in its own Qdrant collection.
pub struct QdrantVectorStore {
    service: Arc<QdrantService>,
    alias: String,
    vector_size: u64,
}

impl QdrantVectorStore {
    /// Build a store publishing generations under the alias `prefix`.
    pub fn new(service: QdrantService, prefix: String, vector_size: u64) -> Self {
        Self {
            service: Arc::new(service),
            alias: prefix,
            vector_size,
        }
    }

    fn generation_prefix(&self) -> String {
        format!("{}-", self.alias)
    }

    async fn current_collection(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .service
            .list_aliases()
            .await?
            .into_iter()
            .find(|alias| alias.alias_name == self.alias)
            .map(|alias| alias.collection_name))
    }

    /// Delete generations older than `previous`, never touching `current`.
    async fn prune(&self, current: &str, previous: Option<&str>) {
        let collections = match self.service.list_collections().await {
            Ok(collections) => collections,
            Err(error) => {
                tracing::warn!(error = %error, "Skipping prune; failed to list collections");
                return;
            }
        };
        let prefix = self.generation_prefix();
        for name in collections {
            if !name.starts_with(&prefix) || name == current || Some(name.as_str()) == previous {
                continue;
            }
            if let Err(error) = self.service.delete_collection(&name).await {
                tracing::warn!(collection = %name, error = %error, "Failed to delete stale generation");
            }
        }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn replace_all(
        &self,
        chunks: Vec<EmbeddedChunk>,
    ) -> Result<Arc<dyn VectorSnapshot>, StoreError> {
        for chunk in &chunks {
            if chunk.vector.len() as u64 != self.vector_size {
                return Err(StoreError::DimensionMismatch {
                    expected: self.vector_size as usize,
                    actual: chunk.vector.len(),
                });
            }
        }

        let collection = format!("{}{}", self.generation_prefix(), new_generation_id());
        self.service
            .create_collection(&collection, self.vector_size)
            .await?;

        let populated = async {
            self.service
                .ensure_keyword_index(&collection, "source")
                .await?;
            self.service.upsert_chunks(&collection, &chunks).await
        }
        .await;
        let len = match populated {
            Ok(len) => len,
            Err(error) => {
                if let Err(cleanup) = self.service.delete_collection(&collection).await {
                    tracing::warn!(collection = %collection, error = %cleanup, "Failed to remove incomplete generation");
                }
                return Err(error.into());
            }
        };

        let previous = self.current_collection().await?;
        self.service
            .switch_alias(&self.alias, &collection, previous.is_some())
            .await?;
        tracing::info!(
            alias = %self.alias,
            collection = %collection,
            chunks = len,
            "Published Qdrant generation"
        );
        self.prune(&collection, previous.as_deref()).await;

        Ok(Arc::new(QdrantSnapshot {
            service: self.service.clone(),
            collection,
            len,
        }))
    }

    async fn open_current(&self) -> Result<Option<Arc<dyn VectorSnapshot>>, StoreError> {
        let Some(collection) = self.current_collection().await? else {
            return Ok(None);
        };
        let len = self.service.count_points(&collection).await?;
        tracing::info!(alias = %self.alias, collection = %collection, chunks = len, "Reopened Qdrant generation");
        Ok(Some(Arc::new(QdrantSnapshot {
            service: self.service.clone(),
            collection,
            len,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{DELETE, GET, POST, PUT},
        MockServer,
    };
    use regex::Regex;
    use serde_json::json;

    fn store_for(server: &MockServer) -> QdrantVectorStore {
        let service = QdrantService::new(&server.base_url(), None).expect("client");
        QdrantVectorStore::new(service, "docqa".into(), 2)
    }

    fn chunk(text: &str) -> EmbeddedChunk {
        EmbeddedChunk {
            text: text.into(),
            source: "notes.txt".into(),
            page: 0,
            index: 0,
            chunk_hash: crate::qdrant::compute_chunk_hash(text),
            vector: vec![1.0, 0.0],
        }
    }

    #[tokio::test]
    async fn replace_all_creates_generation_and_switches_alias() {
        let server = MockServer::start_async().await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path_matches(Regex::new(r"^/collections/docqa-[^/]+$").expect("regex"));
                then.status(200).json_body(json!({ "status": "ok", "result": true }));
            })
            .await;
        let index = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path_matches(Regex::new(r"^/collections/docqa-[^/]+/index$").expect("regex"));
                then.status(200).json_body(json!({ "status": "ok", "result": {} }));
            })
            .await;
        let upsert = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path_matches(Regex::new(r"^/collections/docqa-[^/]+/points$").expect("regex"));
                then.status(200).json_body(json!({ "status": "ok", "result": {} }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/aliases");
                then.status(200).json_body(json!({
                    "status": "ok",
                    "result": { "aliases": [ { "alias_name": "docqa", "collection_name": "docqa-old" } ] }
                }));
            })
            .await;
        let alias = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/aliases")
                    .body_contains("delete_alias")
                    .body_contains("create_alias");
                then.status(200).json_body(json!({ "status": "ok", "result": true }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections");
                then.status(200).json_body(json!({
                    "status": "ok",
                    "result": { "collections": [ { "name": "docqa-old" }, { "name": "unrelated" } ] }
                }));
            })
            .await;
        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE);
                then.status(200).json_body(json!({ "status": "ok", "result": true }));
            })
            .await;

        let snapshot = store_for(&server)
            .replace_all(vec![chunk("Paris"), chunk("Berlin")])
            .await
            .expect("published");

        assert!(snapshot.id().starts_with("docqa-"));
        assert_eq!(snapshot.len(), 2);
        create.assert_async().await;
        index.assert_async().await;
        upsert.assert_async().await;
        alias.assert_async().await;
        assert_eq!(delete.hits_async().await, 0);
    }

    #[tokio::test]
    async fn replace_all_rejects_wrong_dimension_before_any_request() {
        let server = MockServer::start_async().await;
        let mut bad = chunk("Paris");
        bad.vector = vec![1.0, 0.0, 0.0];

        let error = store_for(&server).replace_all(vec![bad]).await.err().expect("error");
        assert!(matches!(
            error,
            StoreError::DimensionMismatch { expected: 2, actual: 3 }
        ));
    }

    #[tokio::test]
    async fn open_current_without_alias_is_none() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/aliases");
                then.status(200).json_body(json!({ "status": "ok", "result": { "aliases": [] } }));
            })
            .await;

        let snapshot = store_for(&server).open_current().await.expect("lookup");
        assert!(snapshot.is_none());
    }

    #[tokio::test]
    async fn open_current_resolves_alias_and_counts_points() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/aliases");
                then.status(200).json_body(json!({
                    "status": "ok",
                    "result": { "aliases": [ { "alias_name": "docqa", "collection_name": "docqa-7" } ] }
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/docqa-7/points/count");
                then.status(200).json_body(json!({ "status": "ok", "result": { "count": 12 } }));
            })
            .await;

        let snapshot = store_for(&server)
            .open_current()
            .await
            .expect("lookup")
            .expect("snapshot");
        assert_eq!(snapshot.id(), "docqa-7");
        assert_eq!(snapshot.len(), 12);
    }
}
