//! Weaviate adapter over the `/v1` REST and GraphQL APIs.
//!
//! Queries are vectorized server-side by the collection's `text2vec` module;
//! the Azure OpenAI key travels in the `X-Azure-Api-Key` header.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};
use simload_core::types::within_distance;
use simload_core::{
    CollectionHandle, CoreError, CoreResult, SimilarEntity, SimilaritySearchBackend,
    WeaviateConfig,
};
use tracing::debug;

use crate::http::{check_status, read_json, transport};
use crate::ASSET_FETCH_LIMIT;

const REQUEST_TYPE: &str = "weaviate";

/// Property holding the object's document text.
const DOCUMENT_PROPERTY: &str = "document";
/// Property tagging the object kind.
const OBJECT_TYPE_PROPERTY: &str = "meta_object_type";
const ASSET_OBJECT_TYPE: &str = "assets";

/// Weaviate class name for a collection: first letter upper-cased.
pub fn class_name(collection: &str) -> String {
    let mut chars = collection.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Quotes `value` as a GraphQL string literal.
fn literal(value: &str) -> String {
    JsonValue::String(value.to_string()).to_string()
}

/// GraphQL `nearText` search over `class` for all `concepts` at once.
pub fn near_text_query(class: &str, concepts: &[String], distance: f32, limit: usize) -> String {
    let concepts: Vec<String> = concepts.iter().map(|c| literal(c)).collect();
    format!(
        "{{ Get {{ {class}(nearText: {{concepts: [{}], distance: {distance}}}, limit: {limit}) \
         {{ {DOCUMENT_PROPERTY} {OBJECT_TYPE_PROPERTY} _additional {{ id distance }} }} }} }}",
        concepts.join(", ")
    )
}

fn asset_names_query(class: &str) -> String {
    format!(
        "{{ Get {{ {class}(where: {{path: [{}], operator: Equal, valueText: {}}}, \
         limit: {ASSET_FETCH_LIMIT}) {{ {DOCUMENT_PROPERTY} }} }} }}",
        literal(OBJECT_TYPE_PROPERTY),
        literal(ASSET_OBJECT_TYPE)
    )
}

fn count_query(class: &str) -> String {
    format!("{{ Aggregate {{ {class} {{ meta {{ count }} }} }} }}")
}

#[derive(Debug, Deserialize)]
struct Schema {
    #[serde(default)]
    classes: Vec<SchemaClass>,
}

#[derive(Debug, Deserialize)]
struct SchemaClass {
    class: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<JsonValue>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

fn malformed(message: impl Into<String>) -> CoreError {
    CoreError::MalformedResponse(message.into())
}

/// Maps one `Get` result object into the normalized match shape.
fn to_entity(object: &JsonValue) -> CoreResult<SimilarEntity> {
    let fields = object
        .as_object()
        .ok_or_else(|| malformed("result object is not a JSON object"))?;
    let additional = fields
        .get("_additional")
        .ok_or_else(|| malformed("result object has no _additional"))?;
    let id = additional["id"]
        .as_str()
        .ok_or_else(|| malformed("result object has no id"))?
        .to_string();
    let distance = additional["distance"]
        .as_f64()
        .ok_or_else(|| malformed(format!("result {id} has no distance")))? as f32;
    let document = fields
        .get(DOCUMENT_PROPERTY)
        .and_then(JsonValue::as_str)
        .map(str::to_string);

    let metadata: Map<String, JsonValue> = fields
        .iter()
        .filter(|(key, _)| *key != "_additional" && *key != DOCUMENT_PROPERTY)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(SimilarEntity {
        id,
        document,
        distance,
        metadata: (!metadata.is_empty()).then(|| JsonValue::Object(metadata)),
    })
}

/// Weaviate backend.
pub struct WeaviateBackend {
    client: reqwest::Client,
    base_url: String,
    init_timeout: Duration,
}

impl WeaviateBackend {
    /// Builds a client for `config`. `vectorizer_key` is forwarded to the
    /// server's Azure OpenAI vectorizer.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for keys that are not valid
    /// header values and [`CoreError::Transport`] if the client cannot be built.
    pub fn new(config: &WeaviateConfig, vectorizer_key: Option<&str>) -> CoreResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = config.api_key() {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| CoreError::invalid_argument(format!("invalid Weaviate API key: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        if let Some(key) = vectorizer_key.filter(|key| !key.is_empty()) {
            let value = HeaderValue::from_str(key)
                .map_err(|e| CoreError::invalid_argument(format!("invalid Azure API key: {e}")))?;
            headers.insert("x-azure-api-key", value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.init_timeout())
            .timeout(config.query_timeout())
            .build()
            .map_err(transport)?;

        Ok(Self {
            client,
            base_url: format!("{}/v1", config.base_url()),
            init_timeout: config.init_timeout(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Runs a GraphQL query and returns its `data` member.
    async fn graphql(&self, query: String) -> CoreResult<JsonValue> {
        let response = self
            .client
            .post(self.url("/graphql"))
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(transport)?;
        let body: GraphQlResponse = read_json(response).await?;

        if let Some(errors) = body.errors.filter(|errors| !errors.is_empty()) {
            let messages: Vec<_> = errors.into_iter().map(|e| e.message).collect();
            return Err(malformed(format!("GraphQL errors: {}", messages.join("; "))));
        }
        body.data.ok_or_else(|| malformed("GraphQL response has no data"))
    }

    /// Runs a `Get` query and returns the result objects of `class`.
    async fn get_objects(&self, class: &str, query: String) -> CoreResult<Vec<JsonValue>> {
        let data = self.graphql(query).await?;
        match &data["Get"][class] {
            JsonValue::Array(objects) => Ok(objects.clone()),
            JsonValue::Null => Ok(Vec::new()),
            other => Err(malformed(format!("unexpected Get result for {class}: {other}"))),
        }
    }
}

#[async_trait]
impl SimilaritySearchBackend for WeaviateBackend {
    fn request_type(&self) -> &'static str {
        REQUEST_TYPE
    }

    async fn connect(&self) -> CoreResult<()> {
        let response = self
            .client
            .get(self.url("/.well-known/ready"))
            .timeout(self.init_timeout)
            .send()
            .await
            .map_err(transport)?;
        check_status(response).await.map_err(|err| match err {
            CoreError::UnexpectedStatus { status, .. } => {
                CoreError::Transport(format!("Weaviate is not ready (HTTP {status})"))
            }
            other => other,
        })?;
        Ok(())
    }

    async fn list_collections(&self) -> CoreResult<Vec<String>> {
        let response = self
            .client
            .get(self.url("/schema"))
            .send()
            .await
            .map_err(transport)?;
        let schema: Schema = read_json(response).await?;
        Ok(schema.classes.into_iter().map(|c| c.class).collect())
    }

    async fn get_collection(&self, name: &str) -> CoreResult<Option<CollectionHandle>> {
        let class = class_name(name);
        let response = self
            .client
            .get(self.url(&format!("/schema/{class}")))
            .send()
            .await
            .map_err(transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(collection = name, "class not found");
            return Ok(None);
        }
        check_status(response).await?;
        Ok(Some(CollectionHandle::new(name, class)))
    }

    async fn object_count(&self, collection: &CollectionHandle) -> CoreResult<u64> {
        let data = self.graphql(count_query(&collection.id)).await?;
        data["Aggregate"][collection.id.as_str()][0]["meta"]["count"]
            .as_u64()
            .ok_or_else(|| malformed(format!("no count returned for {}", collection.id)))
    }

    async fn asset_names(&self, collection: &CollectionHandle) -> CoreResult<Vec<String>> {
        let objects = self
            .get_objects(&collection.id, asset_names_query(&collection.id))
            .await?;
        Ok(objects
            .iter()
            .filter_map(|object| object[DOCUMENT_PROPERTY].as_str().map(str::to_string))
            .collect())
    }

    async fn search(
        &self,
        collection: &CollectionHandle,
        batch: &[String],
        max_distance: f32,
        limit: usize,
    ) -> CoreResult<Vec<SimilarEntity>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let concepts: Vec<String> = batch.iter().map(|query| query.to_lowercase()).collect();
        let query = near_text_query(
            &collection.id,
            &concepts,
            max_distance,
            limit * concepts.len(),
        );

        let objects = self.get_objects(&collection.id, query).await?;
        let matches = objects.iter().map(to_entity).collect::<CoreResult<Vec<_>>>()?;
        Ok(within_distance(matches, max_distance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_name() {
        assert_eq!(class_name("dhh"), "Dhh");
        assert_eq!(class_name("Guardicore_59742320"), "Guardicore_59742320");
        assert_eq!(class_name(""), "");
    }

    #[test]
    fn test_near_text_query_escapes_concepts() {
        let query = near_text_query(
            "Dhh",
            &["web-01".to_string(), "a\"b".to_string()],
            0.3,
            6,
        );
        assert!(query.contains(r#"concepts: ["web-01", "a\"b"]"#));
        assert!(query.contains("distance: 0.3"));
        assert!(query.contains("limit: 6"));
        assert!(query.contains("_additional { id distance }"));
    }

    #[test]
    fn test_asset_and_count_queries() {
        let query = asset_names_query("Dhh");
        assert!(query.contains(r#"path: ["meta_object_type"]"#));
        assert!(query.contains(r#"valueText: "assets""#));
        assert!(query.contains("limit: 10000"));
        assert_eq!(count_query("Dhh"), "{ Aggregate { Dhh { meta { count } } } }");
    }

    #[test]
    fn test_to_entity() {
        let entity = to_entity(&json!({
            "document": "web-01",
            "meta_object_type": "assets",
            "_additional": {"id": "u-1", "distance": 0.125}
        }))
        .unwrap();

        assert_eq!(entity.id, "u-1");
        assert_eq!(entity.document.as_deref(), Some("web-01"));
        assert_eq!(entity.distance, 0.125);
        assert_eq!(entity.metadata, Some(json!({"meta_object_type": "assets"})));
    }

    #[test]
    fn test_to_entity_requires_distance() {
        let result = to_entity(&json!({"document": "x", "_additional": {"id": "u-1"}}));
        assert!(matches!(result, Err(CoreError::MalformedResponse(_))));
    }
}
