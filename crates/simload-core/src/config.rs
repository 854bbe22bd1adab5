//! Configuration for the load harness.
//!
//! Sources, lowest precedence first:
//! 1. Hardcoded defaults
//! 2. `./config/simload.{yaml,toml,json}`
//! 3. File named by `SIMLOAD_CONFIG`
//! 4. `SIMLOAD_*` environment variables (e.g. `SIMLOAD_SCENARIO__N_RESULTS=5`)
//! 5. Operational variables such as `CHROMA_HOST` or `WEAVIATE_API_KEY`

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Environment variable naming an extra config file.
pub const CONFIG_PATH_ENV: &str = "SIMLOAD_CONFIG";

/// Operational environment names and the config keys they override.
const OPERATIONAL_ENV: &[(&str, &str)] = &[
    ("CHROMA_HOST", "chroma.host"),
    ("CHROMA_PORT", "chroma.port"),
    ("CHROMA_USER", "chroma.user"),
    ("CHROMA_PASSWORD", "chroma.password"),
    ("CHROMA_USE_SSL", "chroma.use_ssl"),
    ("WEAVIATE_HTTP_HOST", "weaviate.http_host"),
    ("WEAVIATE_HTTP_PORT", "weaviate.http_port"),
    ("WEAVIATE_HTTP_SECURE", "weaviate.http_secure"),
    ("WEAVIATE_GRPC_HOST", "weaviate.grpc_host"),
    ("WEAVIATE_GRPC_PORT", "weaviate.grpc_port"),
    ("WEAVIATE_GRPC_SECURE", "weaviate.grpc_secure"),
    ("WEAVIATE_API_KEY", "weaviate.api_key"),
    ("WEAVIATE_TIMEOUT_INIT", "weaviate.timeout_init_secs"),
    ("WEAVIATE_TIMEOUT_QUERY", "weaviate.timeout_query_secs"),
    ("AZURE_OPENAI_API_KEY", "embedding.api_key"),
    ("AZURE_OPENAI_ENDPOINT", "embedding.endpoint"),
    ("AZURE_OPENAI_DEPLOYMENT", "embedding.deployment"),
    ("AZURE_OPENAI_API_VERSION", "embedding.api_version"),
];

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SimloadConfig {
    #[serde(default)]
    pub chroma: ChromaConfig,

    #[serde(default)]
    pub weaviate: WeaviateConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub scenario: ScenarioConfig,
}

impl SimloadConfig {
    /// Loads configuration from the process environment and config files.
    pub fn load() -> Result<Self, ConfigError> {
        let env: HashMap<String, String> = std::env::vars().collect();
        let file = env.get(CONFIG_PATH_ENV).map(Path::new);
        Self::from_sources(file, &env)
    }

    /// Loads configuration from an optional file and an explicit environment.
    pub fn from_sources(
        file: Option<&Path>,
        env: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Self::set_defaults(Config::builder())?
            .add_source(File::with_name("./config/simload").required(false));

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("SIMLOAD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("scenario.assets")
                .source(Some(
                    env.iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect::<config::Map<String, String>>(),
                )),
        );

        for (name, key) in OPERATIONAL_ENV {
            builder = builder.set_override_option(*key, env.get(*name).cloned())?;
        }

        let config: SimloadConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn set_defaults(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        builder
            // Chroma
            .set_default("chroma.host", "localhost")?
            .set_default("chroma.port", 8000)?
            .set_default("chroma.user", "chroma")?
            .set_default("chroma.password", "")?
            .set_default("chroma.use_ssl", false)?
            .set_default("chroma.timeout_secs", 60)?
            // Weaviate
            .set_default("weaviate.http_host", "localhost")?
            .set_default("weaviate.http_port", 8080)?
            .set_default("weaviate.http_secure", false)?
            .set_default("weaviate.grpc_host", "localhost")?
            .set_default("weaviate.grpc_port", 50051)?
            .set_default("weaviate.grpc_secure", false)?
            .set_default("weaviate.timeout_init_secs", 30)?
            .set_default("weaviate.timeout_query_secs", 60)?
            // Embedding
            .set_default("embedding.endpoint", "")?
            .set_default("embedding.deployment", "text-embedding-ada-002")?
            .set_default("embedding.api_version", "2024-02-15-preview")?
            .set_default("embedding.dimension", 1536)?
            // Scenario
            .set_default("scenario.collection_name", "dhh")?
            .set_default("scenario.mutation_count", 3)?
            .set_default("scenario.batch_size", 2)?
            .set_default("scenario.max_distance", 0.3)?
            .set_default("scenario.n_results", 3)?
            .set_default("scenario.assets", default_assets())
    }

    /// Validates configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chroma.port == 0 {
            return Err(ConfigError::Message("chroma.port must be > 0".to_string()));
        }

        if self.weaviate.http_port == 0 || self.weaviate.grpc_port == 0 {
            return Err(ConfigError::Message(
                "weaviate.http_port and weaviate.grpc_port must be > 0".to_string(),
            ));
        }

        let scenario = &self.scenario;
        if scenario.n_results == 0 {
            return Err(ConfigError::Message(
                "scenario.n_results must be > 0".to_string(),
            ));
        }

        if !scenario.max_distance.is_finite() || scenario.max_distance < 0.0 {
            return Err(ConfigError::Message(
                "scenario.max_distance must be a finite number >= 0".to_string(),
            ));
        }

        if scenario.batch_size == 0 {
            return Err(ConfigError::Message(
                "scenario.batch_size must be > 0".to_string(),
            ));
        }

        if scenario.assets.len() < scenario.batch_size {
            return Err(ConfigError::Message(format!(
                "scenario.assets has {} entries, batch_size needs at least {}",
                scenario.assets.len(),
                scenario.batch_size
            )));
        }

        Ok(())
    }
}

/// Chroma REST endpoint and credentials.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChromaConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub use_ssl: bool,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8000,
            user: "chroma".to_string(),
            password: String::new(),
            use_ssl: false,
            timeout_secs: 60,
        }
    }
}

impl ChromaConfig {
    /// Base URL, e.g. `http://localhost:8000`.
    pub fn base_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Weaviate endpoints, API key and timeouts.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WeaviateConfig {
    pub http_host: String,
    pub http_port: u16,
    pub http_secure: bool,
    pub grpc_host: String,
    pub grpc_port: u16,
    pub grpc_secure: bool,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Connect and readiness timeout in seconds
    pub timeout_init_secs: u64,
    /// Query timeout in seconds
    pub timeout_query_secs: u64,
}

impl Default for WeaviateConfig {
    fn default() -> Self {
        Self {
            http_host: "localhost".to_string(),
            http_port: 8080,
            http_secure: false,
            grpc_host: "localhost".to_string(),
            grpc_port: 50051,
            grpc_secure: false,
            api_key: None,
            timeout_init_secs: 30,
            timeout_query_secs: 60,
        }
    }
}

impl WeaviateConfig {
    /// Base URL of the HTTP endpoint, e.g. `http://localhost:8080`.
    pub fn base_url(&self) -> String {
        let scheme = if self.http_secure { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.http_host, self.http_port)
    }

    /// GRPC endpoint, logged only.
    pub fn grpc_endpoint(&self) -> String {
        format!("{}:{}", self.grpc_host, self.grpc_port)
    }

    /// API key, treating an empty value as unset.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.is_empty())
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_init_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_query_secs)
    }
}

/// Azure OpenAI embedding deployment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,
    pub dimension: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: String::new(),
            deployment: "text-embedding-ada-002".to_string(),
            api_version: "2024-02-15-preview".to_string(),
            dimension: 1536,
        }
    }
}

impl EmbeddingConfig {
    /// API key, treating an empty value as unset.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.is_empty())
    }
}

/// Parameters of the similarity-search scenario.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    pub collection_name: String,
    /// Characters replaced per query
    pub mutation_count: usize,
    /// Queries per search
    pub batch_size: usize,
    pub max_distance: f32,
    /// Matches requested per query
    pub n_results: usize,
    /// Asset corpus used as mutation seeds
    pub assets: Vec<String>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            collection_name: "dhh".to_string(),
            mutation_count: 3,
            batch_size: 2,
            max_distance: 0.3,
            n_results: 3,
            assets: default_assets(),
        }
    }
}

fn default_assets() -> Vec<String> {
    [
        "web-frontend-01",
        "web-frontend-02",
        "payments-api-prod",
        "billing-db-primary",
        "billing-db-replica",
        "auth-gateway",
        "k8s-worker-node-07",
        "log-collector-eu",
    ]
    .iter()
    .map(|asset| asset.to_string())
    .collect()
}
