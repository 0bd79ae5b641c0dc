use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use docqa::{
    api::create_router,
    config::Config,
    rag::{NO_RELEVANT_CONTENT_MESSAGE, NOT_READY_MESSAGE, RagService},
};
use httpmock::{Method::POST, MockServer};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "docqa-integration-boundary";
const NOTES: &str = "Paris is the capital of France.";

struct Harness {
    dir: TempDir,
    app: Router,
}

impl Harness {
    fn new(server: &MockServer) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().display().to_string();
        let vars: HashMap<&str, String> = HashMap::from([
            ("GOOGLE_API_KEY", "test-key".to_string()),
            ("LLM_BASE_URL", server.base_url()),
            ("KNOWLEDGE_BASE_DIR", format!("{root}/knowledge_base")),
            ("VECTOR_STORE_DIR", format!("{root}/chroma_db")),
        ]);
        let config = Config::from_lookup(|key| vars.get(key).cloned()).expect("config");
        let service = RagService::from_config(&config).expect("service");
        let app = create_router(Arc::new(service), config.max_upload_bytes);
        Self { dir, app }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        (status, serde_json::from_slice(&body).expect("json body"))
    }

    async fn upload(&self, filename: &str, contents: &str) -> (StatusCode, Value) {
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\
             \r\n\
             {contents}\r\n\
             --{BOUNDARY}--\r\n"
        );
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri("/upload")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .expect("request"),
        )
        .await
    }

    async fn ask(&self, payload: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri("/ask")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .expect("request"),
        )
        .await
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).expect("request"))
            .await
    }
}

async fn mock_embeddings(server: &MockServer) -> httpmock::Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/embeddings")
                .header("authorization", "Bearer test-key");
            then.status(200).json_body(json!({
                "object": "list",
                "data": [ { "object": "embedding", "index": 0, "embedding": [0.6, 0.8, 0.0] } ]
            }));
        })
        .await
}

#[tokio::test]
async fn uploaded_notes_answer_capital_question() {
    let server = MockServer::start_async().await;
    mock_embeddings(&server).await;
    let chat = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("Answer the question based ONLY on the provided context.")
                .body_contains(NOTES)
                .body_contains("What is the capital of France?");
            then.status(200).json_body(json!({
                "choices": [
                    { "index": 0, "message": { "role": "assistant", "content": "The capital of France is Paris." } }
                ]
            }));
        })
        .await;
    let harness = Harness::new(&server);

    let (status, body) = harness.upload("notes.txt", NOTES).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["filename"], "notes.txt");
    assert!(harness.dir.path().join("knowledge_base/notes.txt").exists());

    let (status, body) = harness
        .ask(json!({ "question": "What is the capital of France?" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["response"].as_str().expect("text").contains("Paris"));
    chat.assert_async().await;

    let (_, health) = harness.get("/health").await;
    assert_eq!(health["knowledge_base_ready"], true);

    let (status, listing) = harness.get("/documents").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["documents"][0]["name"], "notes.txt");
    assert_eq!(listing["documents"][0]["size"], NOTES.len());
}

#[tokio::test]
async fn filter_for_unknown_document_reports_no_relevant_content() {
    let server = MockServer::start_async().await;
    mock_embeddings(&server).await;
    let chat = server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({
                "choices": [ { "message": { "content": "unused" } } ]
            }));
        })
        .await;
    let harness = Harness::new(&server);
    harness.upload("notes.txt", NOTES).await;

    let (status, body) = harness
        .ask(json!({
            "question": "What is the capital of France?",
            "document_id": "other.pdf"
        }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["response"], NO_RELEVANT_CONTENT_MESSAGE);
    assert_eq!(chat.hits_async().await, 0);
}

#[tokio::test]
async fn question_before_any_upload_is_not_ready() {
    let server = MockServer::start_async().await;
    let harness = Harness::new(&server);

    let (status, body) = harness.ask(json!({ "question": "Anything?" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["response"], NOT_READY_MESSAGE);

    let (_, health) = harness.get("/health").await;
    assert_eq!(health["knowledge_base_ready"], false);
}

#[tokio::test]
async fn unsupported_upload_leaves_disk_untouched() {
    let server = MockServer::start_async().await;
    let embeddings = mock_embeddings(&server).await;
    let harness = Harness::new(&server);

    let (status, body) = harness.upload("slides.pptx", "binary").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Only PDF and TXT files are allowed");
    assert!(!harness.dir.path().join("knowledge_base").exists());
    assert!(!harness.dir.path().join("chroma_db").exists());
    assert_eq!(embeddings.hits_async().await, 0);
}

#[tokio::test]
async fn embedding_outage_fails_upload_and_keeps_service_unloaded() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(503).body("unavailable");
        })
        .await;
    let harness = Harness::new(&server);

    let (status, body) = harness.upload("notes.txt", NOTES).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({
            "message": "Failed to process notes.txt",
            "success": false,
            "filename": "notes.txt"
        })
    );
    let (_, health) = harness.get("/health").await;
    assert_eq!(health["knowledge_base_ready"], false);
}

#[tokio::test]
async fn restarted_service_reuses_published_snapshot() {
    let server = MockServer::start_async().await;
    mock_embeddings(&server).await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({
                "choices": [ { "message": { "content": "Paris." } } ]
            }));
        })
        .await;
    let harness = Harness::new(&server);
    harness.upload("notes.txt", NOTES).await;

    let root = harness.dir.path().display().to_string();
    let vars: HashMap<&str, String> = HashMap::from([
        ("GOOGLE_API_KEY", "test-key".to_string()),
        ("LLM_BASE_URL", server.base_url()),
        ("KNOWLEDGE_BASE_DIR", format!("{root}/knowledge_base")),
        ("VECTOR_STORE_DIR", format!("{root}/chroma_db")),
    ]);
    let config = Config::from_lookup(|key| vars.get(key).cloned()).expect("config");
    let restarted = RagService::from_config(&config).expect("service");
    restarted.bootstrap().await;

    assert!(restarted.knowledge().is_ready());
}
