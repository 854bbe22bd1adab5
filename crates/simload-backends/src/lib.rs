//! Similarity-search backends for the simload harness.
//!
//! Both adapters implement [`simload_core::SimilaritySearchBackend`] and
//! return matches in the normalized [`simload_core::SimilarEntity`] shape:
//! - [`ChromaBackend`]: Chroma REST API, query vectors embedded client-side
//! - [`WeaviateBackend`]: Weaviate REST and GraphQL, vectorized server-side

mod chroma;
mod http;
mod weaviate;

pub use chroma::{flatten_query_response, ChromaBackend, QueryResponse, ASSET_FILTER_VALUE};
pub use weaviate::{class_name, near_text_query, WeaviateBackend};

/// Upper bound on objects fetched by `asset_names`.
pub const ASSET_FETCH_LIMIT: usize = 10_000;
