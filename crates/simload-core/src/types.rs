//! Backend-neutral result types.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Handle to a collection resolved on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionHandle {
    /// Name the collection was requested by.
    pub name: String,
    /// Backend identifier (Chroma collection UUID, Weaviate class name).
    pub id: String,
}

impl CollectionHandle {
    /// Creates a handle.
    #[must_use]
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

/// One similarity match, normalized across backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarEntity {
    /// Backend object identifier.
    pub id: String,
    /// Stored document text (the asset name).
    pub document: Option<String>,
    /// Distance to the query; lower is closer.
    pub distance: f32,
    /// Stored metadata payload.
    pub metadata: Option<JsonValue>,
}

/// Keeps matches within `max_distance`, preserving backend order.
#[must_use]
pub fn within_distance(matches: Vec<SimilarEntity>, max_distance: f32) -> Vec<SimilarEntity> {
    matches
        .into_iter()
        .filter(|entity| entity.distance <= max_distance)
        .collect()
}
