use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Model not served by this provider.
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Invalid input (empty batch, etc.).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider is missing credentials or an endpoint.
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// Request never produced a response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Service answered with a non-success status.
    #[error("Service returned HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// Service answered with a payload we could not interpret.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Request for batch embedding generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEmbeddingRequest {
    /// Model or deployment identifier (e.g., "text-embedding-ada-002").
    pub model: String,
    /// Text inputs to embed.
    pub inputs: Vec<String>,
    /// Whether to L2 normalize the output vectors.
    #[serde(default)]
    pub normalize: bool,
}

impl BatchEmbeddingRequest {
    pub fn new(model: impl Into<String>, inputs: Vec<String>) -> Self {
        Self {
            model: model.into(),
            inputs,
            normalize: false,
        }
    }
}

/// Response from batch embedding generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEmbeddingResponse {
    /// Model identifier that generated the embeddings.
    pub model: String,
    /// Generated embeddings (one per input).
    pub embeddings: Vec<Vec<f32>>,
    /// Usage statistics.
    pub usage: Usage,
}

/// Usage statistics for embedding requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    /// Total number of tokens processed.
    pub total_tokens: usize,
    /// Duration in milliseconds.
    pub duration_ms: u64,
}

/// Model information and capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub model: String,
    /// Output dimension of embeddings.
    pub dimension: u32,
    /// Maximum input tokens supported.
    pub max_tokens: usize,
}

/// L2-normalizes `embedding` in place. Zero vectors are left untouched.
pub(crate) fn normalize(embedding: &mut [f32]) {
    let magnitude = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in embedding {
            *value /= magnitude;
        }
    }
}
