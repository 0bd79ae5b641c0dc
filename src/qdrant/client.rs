//! HTTP client wrapper for interacting with Qdrant.

use crate::qdrant::{
    payload::{build_payload, current_timestamp_rfc3339, generate_point_id},
    types::{
        AliasDescription, CountResponse, ListAliasesResponse, ListCollectionsResponse,
        QdrantError, QueryResponse, QueryResponseResult, ScoredPoint,
    },
};
use crate::store::EmbeddedChunk;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};

/// Points uploaded per upsert request.
const UPSERT_BATCH_SIZE: usize = 256;

/// Lightweight HTTP client for Qdrant operations.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl QdrantService {
    /// Construct a client for the instance at `url`.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("docqa/0.1").build()?;

        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Create a collection with cosine distance and the given vector size.
    pub async fn create_collection(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))?
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, vector_size, "Collection created");
        })
        .await
    }

    /// Delete a collection; a missing collection is not an error.
    pub async fn delete_collection(&self, collection_name: &str) -> Result<(), QdrantError> {
        let response = self
            .request(Method::DELETE, &format!("collections/{collection_name}"))?
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Collection deleted");
        })
        .await
    }

    /// Retrieve the names of all collections present in Qdrant.
    pub async fn list_collections(&self) -> Result<Vec<String>, QdrantError> {
        let response = self.request(Method::GET, "collections")?.send().await?;

        if response.status().is_success() {
            let payload: ListCollectionsResponse = response.json().await?;
            Ok(payload
                .result
                .collections
                .into_iter()
                .map(|collection| collection.name)
                .collect())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Failed to list collections");
            Err(error)
        }
    }

    /// Ensure a keyword payload index exists for `field`.
    pub async fn ensure_keyword_index(
        &self,
        collection_name: &str,
        field: &str,
    ) -> Result<(), QdrantError> {
        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}/index"))?
            .query(&[("wait", true)])
            .json(&json!({
                "field_name": field,
                "field_schema": "keyword",
            }))
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            tracing::debug!(collection = collection_name, field, "Payload index already exists");
            return Ok(());
        }
        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, field, "Payload index ensured");
        })
        .await
    }

    /// Upload embedded chunks to the given collection, waiting until they are searchable.
    pub async fn upsert_chunks(
        &self,
        collection_name: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<usize, QdrantError> {
        let now = current_timestamp_rfc3339();
        let mut uploaded = 0;

        for batch in chunks.chunks(UPSERT_BATCH_SIZE) {
            let points: Vec<Value> = batch
                .iter()
                .map(|chunk| {
                    json!({
                        "id": generate_point_id(),
                        "vector": chunk.vector,
                        "payload": build_payload(chunk, &now),
                    })
                })
                .collect();

            let response = self
                .request(
                    Method::PUT,
                    &format!("collections/{collection_name}/points"),
                )?
                .query(&[("wait", true)])
                .json(&json!({ "points": points }))
                .send()
                .await?;

            self.ensure_success(response, || {
                tracing::debug!(
                    collection = collection_name,
                    points = batch.len(),
                    "Points indexed"
                );
            })
            .await?;
            uploaded += batch.len();
        }

        Ok(uploaded)
    }

    /// Perform a similarity search against a collection, returning scored payloads.
    pub async fn search_points(
        &self,
        collection_name: &str,
        vector: &[f32],
        filter: Option<Value>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, QdrantError> {
        let mut body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let (Some(filter_value), Some(obj)) = (filter, body.as_object_mut()) {
            obj.insert("filter".into(), filter_value);
        }

        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/query"),
            )?
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = collection_name, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points
            .into_iter()
            .map(|point| ScoredPoint {
                id: stringify_point_id(point.id),
                score: point.score,
                payload: point.payload,
            })
            .collect())
    }

    /// Exact number of points stored in a collection.
    pub async fn count_points(&self, collection_name: &str) -> Result<usize, QdrantError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/count"),
            )?
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(QdrantError::UnexpectedStatus { status, body });
        }
        let payload: CountResponse = response.json().await?;
        Ok(payload.result.count)
    }

    /// Enumerate every alias known to the instance.
    pub async fn list_aliases(&self) -> Result<Vec<AliasDescription>, QdrantError> {
        let response = self.request(Method::GET, "aliases")?.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(QdrantError::UnexpectedStatus { status, body });
        }
        let payload: ListAliasesResponse = response.json().await?;
        Ok(payload.result.aliases)
    }

    /// Point `alias` at `collection_name` in a single atomic alias operation.
    pub async fn switch_alias(
        &self,
        alias: &str,
        collection_name: &str,
        replace_existing: bool,
    ) -> Result<(), QdrantError> {
        let mut actions = Vec::with_capacity(2);
        if replace_existing {
            actions.push(json!({ "delete_alias": { "alias_name": alias } }));
        }
        actions.push(json!({
            "create_alias": {
                "collection_name": collection_name,
                "alias_name": alias,
            }
        }));

        let response = self
            .request(Method::POST, "collections/aliases")?
            .json(&json!({ "actions": actions }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(alias, collection = collection_name, "Alias switched");
        })
        .await
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, QdrantError> {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        Ok(req)
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
