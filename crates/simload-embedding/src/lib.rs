//! Text embedding for similarity-search backends that embed client-side.
//!
//! Providers implement [`EmbeddingProvider`]. The Azure OpenAI provider talks
//! to a hosted deployment; the mock provider produces deterministic vectors
//! for tests.

mod azure;
mod mock;
mod provider;
mod types;

pub use azure::{AzureOpenAiConfig, AzureOpenAiEmbeddingProvider};
pub use mock::MockEmbeddingProvider;
pub use provider::EmbeddingProvider;
pub use types::{
    BatchEmbeddingRequest, BatchEmbeddingResponse, EmbeddingError, EmbeddingResult, ModelInfo,
    Usage,
};
