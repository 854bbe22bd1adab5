//! Virtual-user load runner for the similarity-search scenario.

pub mod backend;
pub mod inventory;
pub mod orchestrator;
pub mod reporter;
pub mod scenario;
pub mod stats;
pub mod user;

pub use backend::{backend_factory, log_endpoints, BackendKind};
pub use inventory::{collection_overview, format_overview, CollectionRow, CollectionStatus};
pub use orchestrator::{BackendFactory, LoadOrchestrator, RunConfig};
pub use reporter::{CriteriaProfile, ReportFormat, ResultWriter, SuccessCriteria};
pub use scenario::{load_assets, ScenarioSettings, SimilarityScenario, TOTAL_FIND_SIMILAR};
pub use stats::{OperationStats, RunStats, StatsCollector};
pub use user::{pacing_delay, run_user, UserSettings};
