//! The similarity-search scenario each virtual user runs.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use rand::Rng;
use simload_core::{run_timed, CoreError, InstrumentedClient, Outcome, QueryGenerator, ScenarioConfig};
use tracing::{info, warn};

/// Name the whole scenario iteration is reported under.
pub const TOTAL_FIND_SIMILAR: &str = "total_find_similar_environment_entities";

/// Reads a newline-delimited asset corpus. Blank lines and `#` comments are skipped.
pub fn load_assets(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read asset file {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Scenario parameters shared by every virtual user.
#[derive(Debug, Clone)]
pub struct ScenarioSettings {
    pub generator: Arc<QueryGenerator>,
    pub collection_name: String,
    pub max_distance: f32,
    pub n_results: usize,
}

impl ScenarioSettings {
    /// Builds the settings, validating the corpus against the mutation count.
    pub fn from_config(config: &ScenarioConfig) -> anyhow::Result<Self> {
        let corpus: Arc<[String]> = config.assets.clone().into();
        let generator = QueryGenerator::with_batch_size(corpus, config.mutation_count, config.batch_size)
            .context("invalid asset corpus")?;
        Ok(Self {
            generator: Arc::new(generator),
            collection_name: config.collection_name.clone(),
            max_distance: config.max_distance,
            n_results: config.n_results,
        })
    }
}

/// One virtual user's view of the scenario.
pub struct SimilarityScenario {
    client: InstrumentedClient,
    settings: ScenarioSettings,
}

impl SimilarityScenario {
    pub fn new(client: InstrumentedClient, settings: ScenarioSettings) -> Self {
        Self { client, settings }
    }

    pub fn client(&self) -> &InstrumentedClient {
        &self.client
    }

    /// Runs one iteration: generate a batch, resolve the collection, search.
    ///
    /// Returns the matched documents. The iteration reports its own total
    /// timing on top of the per-call events.
    pub async fn run_once<R: Rng + ?Sized>(&self, rng: &mut R) -> Outcome<Vec<String>> {
        let batch = self.settings.generator.next_batch(rng);
        run_timed(
            self.client.request_type(),
            TOTAL_FIND_SIMILAR,
            self.iterate(batch),
            self.client.sink().as_ref(),
        )
        .await
    }

    async fn iterate(&self, batch: Result<Vec<String>, CoreError>) -> Result<Vec<String>, CoreError> {
        let batch = batch?;
        let name = &self.settings.collection_name;

        let collection = match self.client.get_collection(name).await {
            Outcome::Success(Some(collection)) => collection,
            Outcome::Success(None) => {
                warn!("Collection '{}' not found.", name);
                return Ok(Vec::new());
            }
            Outcome::Failure(_) => return Ok(Vec::new()),
        };

        let matches = self
            .client
            .find_similar_environment_entities(
                &collection,
                &batch,
                self.settings.max_distance,
                self.settings.n_results,
            )
            .await
            .ok()
            .unwrap_or_default();

        let documents: Vec<String> = matches
            .into_iter()
            .filter_map(|entity| entity.document)
            .collect();
        if documents.is_empty() {
            warn!("No similar entities found.");
        }
        info!("Query: {:?} ; Similar: {:?}", batch, documents);
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use simload_core::instrumented::FIND_SIMILAR;
    use simload_core::{CollectionHandle, CoreResult, MemorySink, SimilarEntity, SimilaritySearchBackend};
    use std::io::Write;

    struct StaticBackend {
        collection: Option<CollectionHandle>,
    }

    #[async_trait]
    impl SimilaritySearchBackend for StaticBackend {
        fn request_type(&self) -> &'static str {
            "chroma"
        }

        async fn connect(&self) -> CoreResult<()> {
            Ok(())
        }

        async fn list_collections(&self) -> CoreResult<Vec<String>> {
            Ok(vec!["dhh".to_string()])
        }

        async fn get_collection(&self, _name: &str) -> CoreResult<Option<CollectionHandle>> {
            Ok(self.collection.clone())
        }

        async fn object_count(&self, _collection: &CollectionHandle) -> CoreResult<u64> {
            Ok(2)
        }

        async fn asset_names(&self, _collection: &CollectionHandle) -> CoreResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn search(
            &self,
            _collection: &CollectionHandle,
            batch: &[String],
            _max_distance: f32,
            _limit: usize,
        ) -> CoreResult<Vec<SimilarEntity>> {
            Ok(batch
                .iter()
                .enumerate()
                .map(|(i, query)| SimilarEntity {
                    id: i.to_string(),
                    document: Some(query.to_lowercase()),
                    distance: 0.1,
                    metadata: None,
                })
                .collect())
        }
    }

    fn settings() -> ScenarioSettings {
        ScenarioSettings::from_config(&ScenarioConfig::default()).unwrap()
    }

    fn scenario(collection: Option<CollectionHandle>, sink: Arc<MemorySink>) -> SimilarityScenario {
        let client = InstrumentedClient::new(Arc::new(StaticBackend { collection }), sink);
        SimilarityScenario::new(client, settings())
    }

    #[tokio::test]
    async fn test_iteration_reports_each_step_and_total() {
        let sink = Arc::new(MemorySink::new());
        let scenario = scenario(Some(CollectionHandle::new("dhh", "c-1")), sink.clone());
        let mut rng = StdRng::seed_from_u64(7);

        let documents = scenario.run_once(&mut rng).await.ok().unwrap();
        assert_eq!(documents.len(), 2);

        let names: Vec<_> = sink.events().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["get_collection_dhh", FIND_SIMILAR, TOTAL_FIND_SIMILAR]);
    }

    #[tokio::test]
    async fn test_missing_collection_skips_search() {
        let sink = Arc::new(MemorySink::new());
        let scenario = scenario(None, sink.clone());
        let mut rng = StdRng::seed_from_u64(7);

        let documents = scenario.run_once(&mut rng).await.ok().unwrap();
        assert!(documents.is_empty());

        let names: Vec<_> = sink.events().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["get_collection_dhh", TOTAL_FIND_SIMILAR]);
        assert!(sink.events().iter().all(|e| !e.is_failure()));
    }

    #[test]
    fn test_short_corpus_is_rejected() {
        let config = ScenarioConfig {
            assets: vec!["ab".to_string(), "web-frontend-01".to_string()],
            ..ScenarioConfig::default()
        };
        assert!(ScenarioSettings::from_config(&config).is_err());
    }

    #[test]
    fn test_load_assets_skips_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# assets\nweb-frontend-01\n\n  billing-db-primary  \n").unwrap();

        let assets = load_assets(file.path()).unwrap();
        assert_eq!(assets, vec!["web-frontend-01", "billing-db-primary"]);
    }
}
