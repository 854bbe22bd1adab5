//! Azure OpenAI embeddings over REST.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::provider::EmbeddingProvider;
use crate::types::{
    normalize, BatchEmbeddingRequest, BatchEmbeddingResponse, EmbeddingError, EmbeddingResult,
    ModelInfo, Usage,
};

/// Connection settings for one Azure OpenAI embedding deployment.
#[derive(Debug, Clone)]
pub struct AzureOpenAiConfig {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`.
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
    pub dimension: u32,
    pub timeout: Duration,
}

impl AzureOpenAiConfig {
    pub const DEFAULT_DEPLOYMENT: &'static str = "text-embedding-ada-002";
    pub const DEFAULT_API_VERSION: &'static str = "2024-02-15-preview";
    pub const DEFAULT_DIMENSION: u32 = 1536;

    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            deployment: Self::DEFAULT_DEPLOYMENT.to_string(),
            api_version: Self::DEFAULT_API_VERSION.to_string(),
            dimension: Self::DEFAULT_DIMENSION,
            timeout: Duration::from_secs(60),
        }
    }

    /// Embeddings URL for the configured deployment.
    pub fn embeddings_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/embeddings?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.deployment,
            self.api_version
        )
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<EmbeddingsUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsUsage {
    total_tokens: usize,
}

/// Embedding provider backed by an Azure OpenAI deployment.
pub struct AzureOpenAiEmbeddingProvider {
    client: reqwest::Client,
    config: AzureOpenAiConfig,
}

impl AzureOpenAiEmbeddingProvider {
    /// Creates a provider.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::NotConfigured`] when the endpoint or key is
    /// empty, and [`EmbeddingError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: AzureOpenAiConfig) -> EmbeddingResult<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(EmbeddingError::NotConfigured(
                "Azure OpenAI endpoint is empty".to_string(),
            ));
        }
        if config.api_key.is_empty() {
            return Err(EmbeddingError::NotConfigured(
                "Azure OpenAI API key is empty".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| EmbeddingError::NotConfigured(format!("invalid API key: {e}")))?;
        headers.insert("api-key", key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| EmbeddingError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &AzureOpenAiConfig {
        &self.config
    }

    async fn request_embeddings(&self, inputs: &[String]) -> EmbeddingResult<EmbeddingsResponse> {
        let response = self
            .client
            .post(self.config.embeddings_url())
            .json(&EmbeddingsRequest { input: inputs })
            .send()
            .await
            .map_err(|e| EmbeddingError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<EmbeddingsResponse>()
            .await
            .map_err(|e| EmbeddingError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for AzureOpenAiEmbeddingProvider {
    async fn embed_batch(
        &self,
        request: BatchEmbeddingRequest,
    ) -> EmbeddingResult<BatchEmbeddingResponse> {
        let start = Instant::now();

        if request.inputs.is_empty() {
            return Err(EmbeddingError::InvalidInput("empty input batch".to_string()));
        }
        if !request.model.is_empty() && request.model != self.config.deployment {
            return Err(EmbeddingError::ModelNotFound(format!(
                "deployment '{}' cannot serve model '{}'",
                self.config.deployment, request.model
            )));
        }

        let mut response = self.request_embeddings(&request.inputs).await?;
        if response.data.len() != request.inputs.len() {
            return Err(EmbeddingError::MalformedResponse(format!(
                "expected {} embeddings, got {}",
                request.inputs.len(),
                response.data.len()
            )));
        }

        response.data.sort_by_key(|item| item.index);
        let embeddings = response
            .data
            .into_iter()
            .map(|item| {
                let mut embedding = item.embedding;
                if request.normalize {
                    normalize(&mut embedding);
                }
                embedding
            })
            .collect();

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(
            deployment = %self.config.deployment,
            inputs = request.inputs.len(),
            duration_ms,
            "embedded batch"
        );

        Ok(BatchEmbeddingResponse {
            model: self.config.deployment.clone(),
            embeddings,
            usage: Usage {
                total_tokens: response.usage.map_or(0, |usage| usage.total_tokens),
                duration_ms,
            },
        })
    }

    async fn model_info(&self) -> EmbeddingResult<ModelInfo> {
        Ok(ModelInfo {
            model: self.config.deployment.clone(),
            dimension: self.config.dimension,
            max_tokens: 8191,
        })
    }

    async fn health_check(&self) -> EmbeddingResult<()> {
        self.request_embeddings(&["health".to_string()])
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embeddings_url() {
        let mut config = AzureOpenAiConfig::new("https://example.openai.azure.com/", "key");
        assert_eq!(
            config.embeddings_url(),
            "https://example.openai.azure.com/openai/deployments/text-embedding-ada-002/embeddings?api-version=2024-02-15-preview"
        );

        config.deployment = "small".to_string();
        config.api_version = "2024-06-01".to_string();
        assert!(config
            .embeddings_url()
            .ends_with("/deployments/small/embeddings?api-version=2024-06-01"));
    }

    #[test]
    fn test_missing_settings_rejected() {
        assert!(matches!(
            AzureOpenAiEmbeddingProvider::new(AzureOpenAiConfig::new("", "key")),
            Err(EmbeddingError::NotConfigured(_))
        ));
        assert!(matches!(
            AzureOpenAiEmbeddingProvider::new(AzureOpenAiConfig::new("https://x", "")),
            Err(EmbeddingError::NotConfigured(_))
        ));
    }
}
