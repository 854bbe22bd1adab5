//! Core types for the simload similarity-search load harness.
//!
//! Two pieces carry the weight here:
//! - [`perturb`]: near-miss query generation from a fixed asset corpus
//! - [`timed`]: the timed-operation wrapper every backend call goes through
//!
//! Backends plug in through [`SimilaritySearchBackend`]; outcome events leave
//! through an [`EventSink`].

pub mod config;
pub mod error;
pub mod event;
pub mod instrumented;
pub mod metrics;
pub mod perturb;
pub mod timed;
pub mod traits;
pub mod types;

pub use config::{ChromaConfig, EmbeddingConfig, ScenarioConfig, SimloadConfig, WeaviateConfig};
pub use error::{CoreError, CoreResult};
pub use event::{EventSink, FanoutSink, MemorySink, RequestEvent};
pub use instrumented::InstrumentedClient;
pub use metrics::PrometheusSink;
pub use perturb::{mutate, mutate_with, sample_and_mutate, sample_and_mutate_with, QueryGenerator};
pub use timed::{run_timed, OperationFailure, Outcome};
pub use traits::SimilaritySearchBackend;
pub use types::{CollectionHandle, SimilarEntity};
