//! Backend selection and per-user client construction.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::ValueEnum;
use simload_backends::{ChromaBackend, WeaviateBackend};
use simload_core::{CoreResult, SimilaritySearchBackend, SimloadConfig};
use simload_embedding::{
    AzureOpenAiConfig, AzureOpenAiEmbeddingProvider, BatchEmbeddingRequest,
    BatchEmbeddingResponse, EmbeddingError, EmbeddingProvider, EmbeddingResult, ModelInfo,
};
use tracing::{info, warn};

use crate::orchestrator::BackendFactory;

/// Vector database under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    Chroma,
    Weaviate,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chroma => "chroma",
            Self::Weaviate => "weaviate",
        }
    }
}

/// Logs the resolved endpoint for `kind`. Credentials are never logged.
pub fn log_endpoints(kind: BackendKind, config: &SimloadConfig) {
    match kind {
        BackendKind::Chroma => info!(
            host = %config.chroma.host,
            port = config.chroma.port,
            ssl = config.chroma.use_ssl,
            user = %config.chroma.user,
            "Chroma endpoint"
        ),
        BackendKind::Weaviate => info!(
            http = %config.weaviate.base_url(),
            grpc = %config.weaviate.grpc_endpoint(),
            grpc_secure = config.weaviate.grpc_secure,
            api_key_set = config.weaviate.api_key().is_some(),
            "Weaviate endpoint"
        ),
    }
}

/// Stand-in used when Azure OpenAI credentials are missing. Every call fails,
/// so searches report failures while other operations still work.
struct UnconfiguredEmbedder {
    reason: String,
}

#[async_trait]
impl EmbeddingProvider for UnconfiguredEmbedder {
    async fn embed_batch(
        &self,
        _request: BatchEmbeddingRequest,
    ) -> EmbeddingResult<BatchEmbeddingResponse> {
        Err(EmbeddingError::NotConfigured(self.reason.clone()))
    }

    async fn model_info(&self) -> EmbeddingResult<ModelInfo> {
        Err(EmbeddingError::NotConfigured(self.reason.clone()))
    }

    async fn health_check(&self) -> EmbeddingResult<()> {
        Err(EmbeddingError::NotConfigured(self.reason.clone()))
    }
}

fn azure_embedder(config: &SimloadConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let embedding = &config.embedding;
    let azure = AzureOpenAiConfig {
        deployment: embedding.deployment.clone(),
        api_version: embedding.api_version.clone(),
        dimension: embedding.dimension,
        ..AzureOpenAiConfig::new(
            embedding.endpoint.clone(),
            embedding.api_key().unwrap_or_default(),
        )
    };

    match AzureOpenAiEmbeddingProvider::new(azure) {
        Ok(provider) => Ok(Arc::new(provider)),
        Err(EmbeddingError::NotConfigured(reason)) => {
            warn!("{}; Chroma searches will fail", reason);
            Ok(Arc::new(UnconfiguredEmbedder { reason }))
        }
        Err(err) => Err(err).context("failed to build Azure OpenAI client"),
    }
}

/// Builds the factory that gives each virtual user its own backend client.
///
/// Chroma users share one embedding client.
pub fn backend_factory(kind: BackendKind, config: &SimloadConfig) -> anyhow::Result<BackendFactory> {
    match kind {
        BackendKind::Chroma => {
            let chroma = config.chroma.clone();
            let embedder = azure_embedder(config)?;
            let model = config.embedding.deployment.clone();
            Ok(Arc::new(move |_index: usize| -> CoreResult<Arc<dyn SimilaritySearchBackend>> {
                let backend = ChromaBackend::new(&chroma, Arc::clone(&embedder), model.clone())?;
                Ok(Arc::new(backend))
            }))
        }
        BackendKind::Weaviate => {
            let weaviate = config.weaviate.clone();
            let vectorizer_key = config.embedding.api_key().map(str::to_string);
            Ok(Arc::new(move |_index: usize| -> CoreResult<Arc<dyn SimilaritySearchBackend>> {
                let backend = WeaviateBackend::new(&weaviate, vectorizer_key.as_deref())?;
                Ok(Arc::new(backend))
            }))
        }
    }
}
