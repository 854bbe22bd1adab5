//! Chroma adapter against an in-process stub of the `/api/v1` REST API.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use simload_backends::ChromaBackend;
use simload_core::{ChromaConfig, CollectionHandle, CoreError, SimilaritySearchBackend};
use simload_embedding::MockEmbeddingProvider;
use tokio::net::TcpListener;

#[derive(Default)]
struct Stub {
    authorization: Mutex<Option<String>>,
    last_body: Mutex<Option<Value>>,
}

fn record_auth(stub: &Stub, headers: &HeaderMap) {
    *stub.authorization.lock() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
}

async fn heartbeat() -> Json<Value> {
    Json(json!({"nanosecond heartbeat": 1}))
}

async fn list_collections(State(stub): State<Arc<Stub>>, headers: HeaderMap) -> Json<Value> {
    record_auth(&stub, &headers);
    Json(json!([
        {"id": "c-1", "name": "dhh", "metadata": null},
        {"id": "c-2", "name": "other", "metadata": null}
    ]))
}

async fn get_collection(Path(id): Path<String>) -> (StatusCode, Json<Value>) {
    match id.as_str() {
        "dhh" => (StatusCode::OK, Json(json!({"id": "c-1", "name": "dhh"}))),
        "gone" => (StatusCode::NOT_FOUND, Json(json!({"error": "NotFoundError"}))),
        "broken" => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "disk full"}))),
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": format!("ValueError('Collection {other} does not exist.')")})),
        ),
    }
}

async fn count(Path(id): Path<String>) -> (StatusCode, Json<Value>) {
    if id == "c-1" {
        (StatusCode::OK, Json(json!(42)))
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "no such id"})))
    }
}

async fn get_records(State(stub): State<Arc<Stub>>, Json(body): Json<Value>) -> Json<Value> {
    *stub.last_body.lock() = Some(body);
    Json(json!({
        "ids": ["a1", "a2", "a3"],
        "documents": ["web-frontend-01", null, "billing-db-primary"],
        "metadatas": null
    }))
}

async fn query(State(stub): State<Arc<Stub>>, Json(body): Json<Value>) -> Json<Value> {
    *stub.last_body.lock() = Some(body);
    Json(json!({
        "ids": [["a1", "a2"], ["b1", "b2"]],
        "distances": [[0.02, 0.45], [0.25, 0.3]],
        "documents": [["web-frontend-01", "web-frontend-02"], ["billing-db-primary", "billing-db-replica"]],
        "metadatas": [[{"object_type": "assets"}, {"object_type": "assets"}], [null, {"object_type": "assets"}]],
        "embeddings": null
    }))
}

async fn spawn_stub() -> (u16, Arc<Stub>) {
    let stub = Arc::new(Stub::default());
    let app = Router::new()
        .route("/api/v1/heartbeat", get(heartbeat))
        .route("/api/v1/collections", get(list_collections))
        .route("/api/v1/collections/:id", get(get_collection))
        .route("/api/v1/collections/:id/count", get(count))
        .route("/api/v1/collections/:id/get", post(get_records))
        .route("/api/v1/collections/:id/query", post(query))
        .with_state(stub.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (port, stub)
}

fn backend(port: u16) -> ChromaBackend {
    let config = ChromaConfig {
        host: "127.0.0.1".to_string(),
        port,
        user: "chroma".to_string(),
        password: "secret".to_string(),
        use_ssl: false,
        timeout_secs: 5,
    };
    ChromaBackend::new(
        &config,
        Arc::new(MockEmbeddingProvider::with_dimension(8)),
        "mock-embed-8",
    )
    .unwrap()
}

#[tokio::test]
async fn connect_and_list_collections_with_basic_auth() {
    let (port, stub) = spawn_stub().await;
    let backend = backend(port);

    backend.connect().await.unwrap();
    let names = backend.list_collections().await.unwrap();

    assert_eq!(names, vec!["dhh", "other"]);
    assert_eq!(
        stub.authorization.lock().as_deref(),
        Some("Basic Y2hyb21hOnNlY3JldA==")
    );
    assert_eq!(backend.request_type(), "chroma");
}

#[tokio::test]
async fn get_collection_resolves_or_reports_absence() {
    let (port, _) = spawn_stub().await;
    let backend = backend(port);

    assert_eq!(
        backend.get_collection("dhh").await.unwrap(),
        Some(CollectionHandle::new("dhh", "c-1"))
    );
    assert_eq!(backend.get_collection("missing").await.unwrap(), None);
    assert_eq!(backend.get_collection("gone").await.unwrap(), None);
    assert!(matches!(
        backend.get_collection("broken").await,
        Err(CoreError::UnexpectedStatus { status: 500, .. })
    ));
}

#[tokio::test]
async fn object_count_and_asset_names() {
    let (port, stub) = spawn_stub().await;
    let backend = backend(port);
    let collection = CollectionHandle::new("dhh", "c-1");

    assert_eq!(backend.object_count(&collection).await.unwrap(), 42);
    assert!(backend
        .object_count(&CollectionHandle::new("x", "c-9"))
        .await
        .is_err());

    let names = backend.asset_names(&collection).await.unwrap();
    assert_eq!(names, vec!["web-frontend-01", "billing-db-primary"]);

    let body = stub.last_body.lock().clone().unwrap();
    assert_eq!(body["where"], json!({"object_type": "assets"}));
    assert_eq!(body["limit"], 10_000);
}

#[tokio::test]
async fn search_embeds_queries_and_filters_by_distance() {
    let (port, stub) = spawn_stub().await;
    let backend = backend(port);
    let collection = CollectionHandle::new("dhh", "c-1");
    let batch = vec!["web-frontXnd-01".to_string(), "billing-dQ-primary".to_string()];

    let matches = backend.search(&collection, &batch, 0.3, 3).await.unwrap();

    let ids: Vec<_> = matches.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "b1", "b2"]);
    assert_eq!(matches[0].document.as_deref(), Some("web-frontend-01"));
    assert!(matches[1].metadata.is_none());

    let body = stub.last_body.lock().clone().unwrap();
    assert_eq!(body["n_results"], 3);
    assert_eq!(body["where"], json!({"object_type": "assets"}));
    let embeddings = body["query_embeddings"].as_array().unwrap();
    assert_eq!(embeddings.len(), 2);
    assert_eq!(embeddings[0].as_array().unwrap().len(), 8);
}

#[tokio::test]
async fn unreachable_server_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let backend = backend(port);
    assert!(matches!(backend.connect().await, Err(CoreError::Transport(_))));
}
