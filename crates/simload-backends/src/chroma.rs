//! Chroma adapter over the `/api/v1` REST API.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use simload_core::types::within_distance;
use simload_core::{
    ChromaConfig, CollectionHandle, CoreError, CoreResult, SimilarEntity, SimilaritySearchBackend,
};
use simload_embedding::{BatchEmbeddingRequest, EmbeddingProvider};
use tracing::debug;

use crate::http::{check_status, read_json, transport};
use crate::ASSET_FETCH_LIMIT;

/// Value of the `object_type` metadata key on asset records.
pub const ASSET_FILTER_VALUE: &str = "assets";

const REQUEST_TYPE: &str = "chroma";

#[derive(Debug, Deserialize)]
struct CollectionModel {
    id: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query_embeddings: &'a [Vec<f32>],
    n_results: usize,
    #[serde(rename = "where")]
    filter: JsonValue,
    include: [&'static str; 3],
}

#[derive(Debug, Serialize)]
struct GetRequest {
    #[serde(rename = "where")]
    filter: JsonValue,
    limit: usize,
    include: [&'static str; 1],
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(default)]
    documents: Option<Vec<Option<String>>>,
}

/// Body of a Chroma `query` call: one group per query embedding.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResponse {
    pub ids: Vec<Vec<String>>,
    #[serde(default)]
    pub distances: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    pub documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    pub metadatas: Option<Vec<Vec<Option<JsonValue>>>>,
}

/// Flattens per-query result groups into one ordered list and drops matches
/// farther than `max_distance`.
///
/// Groups and entries are paired positionally; a group or entry missing from
/// one of the parallel arrays ends the pairing at the shorter length.
///
/// # Errors
///
/// Returns [`CoreError::MalformedResponse`] when distances were not returned.
pub fn flatten_query_response(
    response: QueryResponse,
    max_distance: f32,
) -> CoreResult<Vec<SimilarEntity>> {
    let distances = response.distances.ok_or_else(|| {
        CoreError::MalformedResponse("query response carries no distances".to_string())
    })?;
    let documents = response.documents.unwrap_or_default();
    let metadatas = response.metadatas.unwrap_or_default();

    let mut flattened = Vec::new();
    for (group, (ids, distances)) in response.ids.into_iter().zip(distances).enumerate() {
        let docs = documents.get(group);
        let metas = metadatas.get(group);
        for (i, (id, distance)) in ids.into_iter().zip(distances).enumerate() {
            flattened.push(SimilarEntity {
                id,
                document: docs.and_then(|d| d.get(i).cloned().flatten()),
                distance,
                metadata: metas.and_then(|m| m.get(i).cloned().flatten()),
            });
        }
    }

    Ok(within_distance(flattened, max_distance))
}

/// Chroma backend. Query texts are embedded through an [`EmbeddingProvider`]
/// before reaching the server.
pub struct ChromaBackend {
    client: reqwest::Client,
    base_url: String,
    user: String,
    password: String,
    embedder: Arc<dyn EmbeddingProvider>,
    model: String,
}

impl ChromaBackend {
    /// Builds a client for `config`, embedding queries with `embedder` under
    /// the model name `model`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Transport`] if the HTTP client cannot be built.
    pub fn new(
        config: &ChromaConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        model: impl Into<String>,
    ) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(transport)?;

        Ok(Self {
            client,
            base_url: format!("{}/api/v1", config.base_url()),
            user: config.user.clone(),
            password: config.password.clone(),
            embedder,
            model: model.into(),
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authorized(self.client.get(format!("{}{path}", self.base_url)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.authorized(self.client.post(format!("{}{path}", self.base_url)))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.user, Some(&self.password))
    }

    fn asset_filter() -> JsonValue {
        json!({ "object_type": ASSET_FILTER_VALUE })
    }

    async fn embed(&self, batch: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        let response = self
            .embedder
            .embed_batch(BatchEmbeddingRequest::new(&self.model, batch.to_vec()))
            .await
            .map_err(|e| CoreError::Embedding(e.to_string()))?;
        Ok(response.embeddings)
    }
}

#[async_trait]
impl SimilaritySearchBackend for ChromaBackend {
    fn request_type(&self) -> &'static str {
        REQUEST_TYPE
    }

    async fn connect(&self) -> CoreResult<()> {
        let response = self.get("/heartbeat").send().await.map_err(transport)?;
        check_status(response).await?;
        Ok(())
    }

    async fn list_collections(&self) -> CoreResult<Vec<String>> {
        let response = self.get("/collections").send().await.map_err(transport)?;
        let collections: Vec<CollectionModel> = read_json(response).await?;
        Ok(collections.into_iter().map(|c| c.name).collect())
    }

    async fn get_collection(&self, name: &str) -> CoreResult<Option<CollectionHandle>> {
        let response = self
            .get(&format!("/collections/{name}"))
            .send()
            .await
            .map_err(transport)?;

        match read_json::<CollectionModel>(response).await {
            Ok(collection) => Ok(Some(CollectionHandle::new(collection.name, collection.id))),
            Err(CoreError::UnexpectedStatus { status, body })
                if status == StatusCode::NOT_FOUND.as_u16() || body.contains("does not exist") =>
            {
                debug!(collection = name, "collection not found");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn object_count(&self, collection: &CollectionHandle) -> CoreResult<u64> {
        let response = self
            .get(&format!("/collections/{}/count", collection.id))
            .send()
            .await
            .map_err(transport)?;
        read_json(response).await
    }

    async fn asset_names(&self, collection: &CollectionHandle) -> CoreResult<Vec<String>> {
        let request = GetRequest {
            filter: Self::asset_filter(),
            limit: ASSET_FETCH_LIMIT,
            include: ["documents"],
        };
        let response = self
            .post(&format!("/collections/{}/get", collection.id))
            .json(&request)
            .send()
            .await
            .map_err(transport)?;
        let body: GetResponse = read_json(response).await?;
        Ok(body
            .documents
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .collect())
    }

    async fn search(
        &self,
        collection: &CollectionHandle,
        batch: &[String],
        max_distance: f32,
        limit: usize,
    ) -> CoreResult<Vec<SimilarEntity>> {
        let embeddings = self.embed(batch).await?;
        let request = QueryRequest {
            query_embeddings: &embeddings,
            n_results: limit,
            filter: Self::asset_filter(),
            include: ["documents", "metadatas", "distances"],
        };
        let response = self
            .post(&format!("/collections/{}/query", collection.id))
            .json(&request)
            .send()
            .await
            .map_err(transport)?;
        flatten_query_response(read_json(response).await?, max_distance)
    }
}
