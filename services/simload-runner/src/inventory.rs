//! Per-collection inventory printed by the `collections` subcommand.

use std::fmt::Write as _;

use simload_core::{InstrumentedClient, OperationFailure};

/// What the backend reported for one listed collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionStatus {
    /// Listed, but the lookup came back empty.
    Missing,
    /// Counts are `None` when the corresponding call failed.
    Found {
        objects: Option<u64>,
        assets: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRow {
    pub name: String,
    pub status: CollectionStatus,
}

/// Lists every collection with its object and asset counts.
///
/// Every backend call goes through `client`, so each one is timed and
/// reported. Only a failed listing aborts; per-collection failures end up
/// in the row.
pub async fn collection_overview(
    client: &InstrumentedClient,
) -> Result<Vec<CollectionRow>, OperationFailure> {
    let names = client.list_collections().await.into_result()?;

    let mut rows = Vec::with_capacity(names.len());
    for name in names {
        let status = match client.get_collection(&name).await.ok().flatten() {
            Some(collection) => CollectionStatus::Found {
                objects: client.object_count(&collection).await.ok(),
                assets: client.asset_names(&collection).await.ok().map(|a| a.len()),
            },
            None => CollectionStatus::Missing,
        };
        rows.push(CollectionRow { name, status });
    }
    Ok(rows)
}

/// Renders rows as a fixed-width table with a header line.
pub fn format_overview(rows: &[CollectionRow]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<40} {:>12} {:>12}", "Collection", "Objects", "Assets");
    for row in rows {
        let (objects, assets) = match &row.status {
            CollectionStatus::Missing => ("missing".to_string(), "missing".to_string()),
            CollectionStatus::Found { objects, assets } => (count_cell(*objects), count_cell(*assets)),
        };
        let _ = writeln!(out, "{:<40} {:>12} {:>12}", row.name, objects, assets);
    }
    out
}

fn count_cell<N: ToString>(count: Option<N>) -> String {
    count.map_or_else(|| "error".to_string(), |n| n.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use simload_core::{
        CollectionHandle, CoreError, CoreResult, MemorySink, SimilarEntity,
        SimilaritySearchBackend,
    };
    use std::sync::Arc;

    struct InventoryBackend {
        fail_listing: bool,
    }

    #[async_trait]
    impl SimilaritySearchBackend for InventoryBackend {
        fn request_type(&self) -> &'static str {
            "weaviate"
        }

        async fn connect(&self) -> CoreResult<()> {
            Ok(())
        }

        async fn list_collections(&self) -> CoreResult<Vec<String>> {
            if self.fail_listing {
                return Err(CoreError::Transport("connection refused".to_string()));
            }
            Ok(vec!["Dhh".to_string(), "Stale".to_string(), "Broken".to_string()])
        }

        async fn get_collection(&self, name: &str) -> CoreResult<Option<CollectionHandle>> {
            Ok((name != "Stale").then(|| CollectionHandle::new(name, name)))
        }

        async fn object_count(&self, _collection: &CollectionHandle) -> CoreResult<u64> {
            Ok(8)
        }

        async fn asset_names(&self, collection: &CollectionHandle) -> CoreResult<Vec<String>> {
            if collection.name == "Broken" {
                return Err(CoreError::MalformedResponse("missing `objects`".to_string()));
            }
            Ok(vec!["web-frontend-01".to_string(), "auth-gateway".to_string()])
        }

        async fn search(
            &self,
            _collection: &CollectionHandle,
            _batch: &[String],
            _max_distance: f32,
            _limit: usize,
        ) -> CoreResult<Vec<SimilarEntity>> {
            Ok(Vec::new())
        }

        async fn close(&self) {}
    }

    fn client(fail_listing: bool, sink: Arc<MemorySink>) -> InstrumentedClient {
        InstrumentedClient::new(Arc::new(InventoryBackend { fail_listing }), sink)
    }

    #[tokio::test]
    async fn test_overview_counts_objects_and_assets() {
        let sink = Arc::new(MemorySink::new());
        let rows = collection_overview(&client(false, sink.clone())).await.unwrap();

        assert_eq!(
            rows,
            vec![
                CollectionRow {
                    name: "Dhh".to_string(),
                    status: CollectionStatus::Found {
                        objects: Some(8),
                        assets: Some(2),
                    },
                },
                CollectionRow {
                    name: "Stale".to_string(),
                    status: CollectionStatus::Missing,
                },
                CollectionRow {
                    name: "Broken".to_string(),
                    status: CollectionStatus::Found {
                        objects: Some(8),
                        assets: None,
                    },
                },
            ]
        );

        let events = sink.events();
        let asset_events: Vec<_> = events
            .iter()
            .filter(|e| e.name.starts_with("get_asset_names_"))
            .collect();
        assert_eq!(asset_events.len(), 2);
        assert_eq!(asset_events[0].name, "get_asset_names_Dhh");
        assert!(asset_events[1].is_failure());
        // list + 3 lookups + 2 counts + 2 asset listings
        assert_eq!(events.len(), 8);
    }

    #[tokio::test]
    async fn test_overview_fails_when_listing_fails() {
        let sink = Arc::new(MemorySink::new());
        let failure = collection_overview(&client(true, sink.clone()))
            .await
            .unwrap_err();

        assert_eq!(failure.operation, "list_collections");
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_format_overview() {
        let table = format_overview(&[
            CollectionRow {
                name: "Dhh".to_string(),
                status: CollectionStatus::Found {
                    objects: Some(8),
                    assets: None,
                },
            },
            CollectionRow {
                name: "Stale".to_string(),
                status: CollectionStatus::Missing,
            },
        ]);
        let lines: Vec<_> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("Assets"));
        assert!(lines[1].starts_with("Dhh"));
        assert!(lines[1].ends_with("8        error"));
        assert!(lines[2].ends_with("missing      missing"));
    }
}
