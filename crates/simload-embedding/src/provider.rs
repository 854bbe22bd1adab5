use async_trait::async_trait;

use crate::types::{BatchEmbeddingRequest, BatchEmbeddingResponse, EmbeddingResult, ModelInfo};

/// Trait for embedding model providers.
///
/// Implementations may call a hosted deployment or compute vectors locally
/// while providing a consistent interface to the backends.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of text inputs, one vector per input
    /// in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The requested model is not served by this provider
    /// - The batch is empty
    /// - The remote service fails or answers with an unexpected payload
    async fn embed_batch(
        &self,
        request: BatchEmbeddingRequest,
    ) -> EmbeddingResult<BatchEmbeddingResponse>;

    /// Get model information (dimension, limits).
    async fn model_info(&self) -> EmbeddingResult<ModelInfo>;

    /// Health check for the embedding service.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is unreachable or misconfigured.
    async fn health_check(&self) -> EmbeddingResult<()>;
}
