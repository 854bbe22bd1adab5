//! Backend client whose every call is timed and reported.

use std::sync::Arc;

use tracing::{error, info};

use crate::event::EventSink;
use crate::timed::{run_timed, Outcome};
use crate::traits::SimilaritySearchBackend;
use crate::types::{CollectionHandle, SimilarEntity};
use crate::{CoreError, CoreResult};

/// Operation name reported for similarity searches.
pub const FIND_SIMILAR: &str = "find_similar_environment_entities";

/// Wraps a backend so each operation emits exactly one outcome event.
#[derive(Clone)]
pub struct InstrumentedClient {
    backend: Arc<dyn SimilaritySearchBackend>,
    sink: Arc<dyn EventSink>,
}

impl InstrumentedClient {
    /// Creates a client reporting to `sink`.
    pub fn new(backend: Arc<dyn SimilaritySearchBackend>, sink: Arc<dyn EventSink>) -> Self {
        Self { backend, sink }
    }

    /// Backend tag used on every event.
    pub fn request_type(&self) -> &'static str {
        self.backend.request_type()
    }

    /// Event sink this client reports to.
    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    /// Probes readiness. Not timed; a failure is logged and returned.
    pub async fn connect(&self) -> CoreResult<()> {
        match self.backend.connect().await {
            Ok(()) => {
                info!("Successfully connected to {}", self.request_type());
                Ok(())
            }
            Err(err) => {
                error!("Failed to connect to {}: {}", self.request_type(), err);
                Err(err)
            }
        }
    }

    /// Timed `list_collections`.
    pub async fn list_collections(&self) -> Outcome<Vec<String>> {
        run_timed(
            self.request_type(),
            "list_collections",
            self.backend.list_collections(),
            self.sink.as_ref(),
        )
        .await
    }

    /// Timed `get_collection_{name}`.
    pub async fn get_collection(&self, name: &str) -> Outcome<Option<CollectionHandle>> {
        run_timed(
            self.request_type(),
            &format!("get_collection_{name}"),
            self.backend.get_collection(name),
            self.sink.as_ref(),
        )
        .await
    }

    /// Timed `get_object_count_{name}`.
    pub async fn object_count(&self, collection: &CollectionHandle) -> Outcome<u64> {
        run_timed(
            self.request_type(),
            &format!("get_object_count_{}", collection.name),
            self.backend.object_count(collection),
            self.sink.as_ref(),
        )
        .await
    }

    /// Timed `get_asset_names_{name}`.
    pub async fn asset_names(&self, collection: &CollectionHandle) -> Outcome<Vec<String>> {
        run_timed(
            self.request_type(),
            &format!("get_asset_names_{}", collection.name),
            self.backend.asset_names(collection),
            self.sink.as_ref(),
        )
        .await
    }

    /// Timed similarity search. An empty batch yields an empty result
    /// without reaching the backend.
    pub async fn find_similar_environment_entities(
        &self,
        collection: &CollectionHandle,
        batch: &[String],
        max_distance: f32,
        n_results: usize,
    ) -> Outcome<Vec<SimilarEntity>> {
        let backend = Arc::clone(&self.backend);
        let search = async move {
            if batch.is_empty() {
                return Ok::<_, CoreError>(Vec::new());
            }
            backend.search(collection, batch, max_distance, n_results).await
        };
        run_timed(self.request_type(), FIND_SIMILAR, search, self.sink.as_ref()).await
    }

    /// Closes the underlying backend client.
    pub async fn close(&self) {
        self.backend.close().await;
        info!("Connection to {} closed.", self.request_type());
    }
}
