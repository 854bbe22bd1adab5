use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::provider::EmbeddingProvider;
use crate::types::{
    normalize, BatchEmbeddingRequest, BatchEmbeddingResponse, EmbeddingError, EmbeddingResult,
    ModelInfo, Usage,
};

/// Mock embedding provider for testing.
///
/// Each input is embedded as a hashed bag of character trigrams, so strings
/// that differ in a few positions land close together. Output is
/// deterministic for a given build.
pub struct MockEmbeddingProvider {
    model: String,
    dimension: u32,
    latency_ms: u64,
}

impl MockEmbeddingProvider {
    /// Default model name for mock provider.
    pub const DEFAULT_MODEL: &'static str = "mock-embed-256";
    /// Default dimension (256).
    pub const DEFAULT_DIMENSION: u32 = 256;

    /// Creates a new mock provider with default parameters and no latency.
    #[must_use]
    pub fn new() -> Self {
        Self::with_model(Self::DEFAULT_MODEL, Self::DEFAULT_DIMENSION)
    }

    /// Creates a mock provider with custom dimension.
    #[must_use]
    pub fn with_dimension(dimension: u32) -> Self {
        Self::with_model(format!("mock-embed-{dimension}"), dimension)
    }

    /// Creates a mock provider with custom model and dimension.
    #[must_use]
    pub fn with_model(model: impl Into<String>, dimension: u32) -> Self {
        Self {
            model: model.into(),
            dimension: dimension.max(1),
            latency_ms: 0,
        }
    }

    /// Sets the simulated latency.
    #[must_use]
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Model name requests must carry.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn generate_embedding(&self, text: &str, unit_length: bool) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension as usize];
        let padded: Vec<char> = format!("  {}  ", text.to_lowercase()).chars().collect();

        for window in padded.windows(3) {
            let mut hasher = DefaultHasher::new();
            window.hash(&mut hasher);
            let bucket = (hasher.finish() % u64::from(self.dimension)) as usize;
            embedding[bucket] += 1.0;
        }

        if unit_length {
            normalize(&mut embedding);
        }
        embedding
    }

    fn estimate_tokens(text: &str) -> usize {
        text.split_whitespace().count().max(1)
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(
        &self,
        request: BatchEmbeddingRequest,
    ) -> EmbeddingResult<BatchEmbeddingResponse> {
        let start = Instant::now();

        if request.inputs.is_empty() {
            return Err(EmbeddingError::InvalidInput("empty input batch".to_string()));
        }

        if request.model != self.model {
            return Err(EmbeddingError::ModelNotFound(format!(
                "expected model '{}', got '{}'",
                self.model, request.model
            )));
        }

        if self.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;
        }

        let embeddings = request
            .inputs
            .iter()
            .map(|text| self.generate_embedding(text, request.normalize))
            .collect();
        let total_tokens = request
            .inputs
            .iter()
            .map(|text| Self::estimate_tokens(text))
            .sum();

        Ok(BatchEmbeddingResponse {
            model: self.model.clone(),
            embeddings,
            usage: Usage {
                total_tokens,
                duration_ms: start.elapsed().as_millis() as u64,
            },
        })
    }

    async fn model_info(&self) -> EmbeddingResult<ModelInfo> {
        Ok(ModelInfo {
            model: self.model.clone(),
            dimension: self.dimension,
            max_tokens: 8191,
        })
    }

    async fn health_check(&self) -> EmbeddingResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        dot / (na * nb)
    }

    fn request(inputs: &[&str]) -> BatchEmbeddingRequest {
        BatchEmbeddingRequest::new(
            MockEmbeddingProvider::DEFAULT_MODEL,
            inputs.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn test_mock_provider_deterministic() {
        let provider = MockEmbeddingProvider::new();

        let first = provider.embed_batch(request(&["web-frontend-01"])).await.unwrap();
        let second = provider.embed_batch(request(&["web-frontend-01"])).await.unwrap();

        assert_eq!(first.embeddings, second.embeddings);
    }

    #[tokio::test]
    async fn test_near_miss_is_closer_than_unrelated() {
        let provider = MockEmbeddingProvider::new();
        let response = provider
            .embed_batch(request(&[
                "billing-db-primary",
                "billing-dX-prima7y",
                "k8s-worker-node-07",
            ]))
            .await
            .unwrap();

        let e = &response.embeddings;
        assert!(cosine(&e[0], &e[1]) > cosine(&e[0], &e[2]));
    }

    #[tokio::test]
    async fn test_mock_provider_dimension_and_order() {
        let provider = MockEmbeddingProvider::with_dimension(64);
        let response = provider
            .embed_batch(BatchEmbeddingRequest::new(
                "mock-embed-64",
                vec!["a".to_string(), "b".to_string()],
            ))
            .await
            .unwrap();

        assert_eq!(response.embeddings.len(), 2);
        assert_eq!(response.embeddings[0].len(), 64);
        assert_ne!(response.embeddings[0], response.embeddings[1]);
    }

    #[tokio::test]
    async fn test_mock_provider_normalize() {
        let provider = MockEmbeddingProvider::new();
        let mut req = request(&["normalize me"]);
        req.normalize = true;

        let response = provider.embed_batch(req).await.unwrap();
        let magnitude: f32 = response.embeddings[0]
            .iter()
            .map(|x| x * x)
            .sum::<f32>()
            .sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_mock_provider_rejects_bad_requests() {
        let provider = MockEmbeddingProvider::new();
        assert!(matches!(
            provider.embed_batch(request(&[])).await,
            Err(EmbeddingError::InvalidInput(_))
        ));
        assert!(matches!(
            provider
                .embed_batch(BatchEmbeddingRequest::new("other", vec!["x".to_string()]))
                .await,
            Err(EmbeddingError::ModelNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_provider_model_info() {
        let provider = MockEmbeddingProvider::with_dimension(128);
        let info = provider.model_info().await.unwrap();
        assert_eq!(info.dimension, 128);
        assert_eq!(info.model, "mock-embed-128");
        assert!(provider.health_check().await.is_ok());
    }
}
