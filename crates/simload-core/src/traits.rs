use async_trait::async_trait;

use crate::error::CoreResult;
use crate::types::{CollectionHandle, SimilarEntity};

/// Capability interface every vector-database adapter implements.
///
/// Adapters return plain `CoreResult`s; timing, logging and event emission
/// happen in [`crate::InstrumentedClient`].
#[async_trait]
pub trait SimilaritySearchBackend: Send + Sync {
    /// Tag attached to every outcome event (`"chroma"`, `"weaviate"`).
    fn request_type(&self) -> &'static str;

    /// Probes backend readiness.
    async fn connect(&self) -> CoreResult<()>;

    /// Lists collection names.
    async fn list_collections(&self) -> CoreResult<Vec<String>>;

    /// Resolves a collection by name; `None` when it does not exist.
    async fn get_collection(&self, name: &str) -> CoreResult<Option<CollectionHandle>>;

    /// Counts objects stored in a collection.
    async fn object_count(&self, collection: &CollectionHandle) -> CoreResult<u64>;

    /// Returns the documents of all objects tagged as assets.
    async fn asset_names(&self, collection: &CollectionHandle) -> CoreResult<Vec<String>>;

    /// Finds entities similar to each query in `batch`.
    ///
    /// Matches farther than `max_distance` are dropped; backend order is kept.
    /// `limit` is the number of results requested per query.
    async fn search(
        &self,
        collection: &CollectionHandle,
        batch: &[String],
        max_distance: f32,
        limit: usize,
    ) -> CoreResult<Vec<SimilarEntity>>;

    /// Releases client resources.
    async fn close(&self) {}
}
