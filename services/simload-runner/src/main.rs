use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use simload_core::metrics::render_metrics;
use simload_core::{InstrumentedClient, MemorySink, PrometheusSink, SimloadConfig};
use simload_runner::{
    backend_factory, collection_overview, format_overview, load_assets, log_endpoints,
    BackendKind, CriteriaProfile, LoadOrchestrator, ReportFormat, ResultWriter, RunConfig,
    ScenarioSettings, SimilarityScenario, StatsCollector,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "simload")]
#[command(about = "Similarity-search load harness for ChromaDB and Weaviate", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct Target {
    /// Vector database under test
    #[arg(long, value_enum, env = "SIMLOAD_BACKEND")]
    backend: BackendKind,

    /// Newline-delimited asset corpus replacing the configured one
    #[arg(long)]
    assets_file: Option<PathBuf>,

    /// Collection to search instead of the configured one
    #[arg(long)]
    collection: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the load test with concurrent virtual users
    Run {
        #[command(flatten)]
        target: Target,

        /// Number of concurrent virtual users
        #[arg(long, default_value_t = 1)]
        users: usize,

        /// Users started per second
        #[arg(long, default_value_t = 1.0)]
        spawn_rate: f64,

        /// Run time in seconds
        #[arg(long, default_value_t = 60)]
        run_time: u64,

        /// Scenario iterations per second, per user
        #[arg(long, default_value_t = 1.0)]
        throughput: f64,

        /// Seed for reproducible query streams
        #[arg(long)]
        seed: Option<u64>,

        /// Write a report to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Report format
        #[arg(long, value_enum, default_value = "markdown")]
        format: ReportFormat,

        /// Success-criteria preset; the threshold flags below override it
        #[arg(long, value_enum, default_value = "default")]
        criteria: CriteriaProfile,

        /// Maximum aggregate error rate (0.0-1.0)
        #[arg(long)]
        max_error_rate: Option<f64>,

        /// Maximum P95 latency per operation in milliseconds
        #[arg(long)]
        max_p95_ms: Option<f64>,

        /// Minimum aggregate throughput in requests per second
        #[arg(long)]
        min_rps: Option<f64>,

        /// Print Prometheus metrics when the run ends
        #[arg(long, default_value = "false")]
        metrics_dump: bool,
    },

    /// Run one scenario iteration with a single user
    Single {
        #[command(flatten)]
        target: Target,

        /// Seed for the query batch
        #[arg(long)]
        seed: Option<u64>,
    },

    /// List collections with their object and asset counts
    Collections {
        #[command(flatten)]
        target: Target,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            target,
            users,
            spawn_rate,
            run_time,
            throughput,
            seed,
            report,
            format,
            criteria,
            max_error_rate,
            max_p95_ms,
            min_rps,
            metrics_dump,
        } => {
            if users == 0 {
                bail!("--users must be at least 1");
            }
            if !(spawn_rate.is_finite() && spawn_rate > 0.0) {
                bail!("--spawn-rate must be a positive number");
            }
            if !(throughput.is_finite() && throughput > 0.0) {
                bail!("--throughput must be a positive number");
            }

            let config = load_config(&target)?;
            log_endpoints(target.backend, &config);

            let settings = ScenarioSettings::from_config(&config.scenario)?;
            let factory = backend_factory(target.backend, &config)?;
            let run_config = RunConfig {
                users,
                spawn_rate,
                run_time: Duration::from_secs(run_time),
                throughput,
                seed,
                ..RunConfig::default()
            };

            let shutdown = shutdown_on_ctrl_c();
            let orchestrator = LoadOrchestrator::new(run_config, settings, factory)
                .with_sink(Arc::new(PrometheusSink::new()));
            let stats = orchestrator
                .run(shutdown)
                .await
                .context("load test aborted")?;

            let criteria = criteria
                .criteria()
                .with_overrides(max_error_rate, max_p95_ms, min_rps);
            let scenario_name = format!(
                "{} find_similar_environment_entities",
                target.backend.as_str()
            );
            let writer = ResultWriter::new(scenario_name, stats, criteria);

            println!();
            println!("{}", writer.summary_table());
            println!("Run {}: {}", writer.run_id(), writer.failure_summary());

            if let Some(path) = report {
                writer
                    .write_report(&path, format)
                    .with_context(|| format!("failed to write report to {}", path.display()))?;
                info!("Report written to {}", path.display());
            }

            if metrics_dump {
                println!("{}", render_metrics()?);
            }

            if !writer.passes() {
                std::process::exit(1);
            }
        }

        Commands::Single { target, seed } => {
            let config = load_config(&target)?;
            log_endpoints(target.backend, &config);

            let settings = ScenarioSettings::from_config(&config.scenario)?;
            let factory = backend_factory(target.backend, &config)?;
            let backend = factory(0)?;
            let sink = Arc::new(MemorySink::new());
            let client = InstrumentedClient::new(backend, sink.clone());
            let scenario = SimilarityScenario::new(client, settings);

            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };

            if scenario.client().connect().await.is_err() {
                warn!("Continuing without a successful readiness probe");
            }
            let documents = scenario.run_once(&mut rng).await;
            scenario.client().close().await;

            for event in sink.events() {
                match &event.exception {
                    None => println!("{:<45} {:>10.2} ms", event.name, event.response_time_ms),
                    Some(exception) => println!(
                        "{:<45} {:>10.2} ms  FAILED: {}",
                        event.name, event.response_time_ms, exception
                    ),
                }
            }
            match documents.into_result() {
                Ok(documents) => println!("Similar: {:?}", documents),
                Err(failure) => bail!(failure),
            }
        }

        Commands::Collections { target } => {
            let config = load_config(&target)?;
            log_endpoints(target.backend, &config);

            let factory = backend_factory(target.backend, &config)?;
            let backend = factory(0)?;
            let stats = Arc::new(StatsCollector::new());
            let client = InstrumentedClient::new(backend, stats.clone());

            client
                .connect()
                .await
                .with_context(|| format!("cannot reach {}", target.backend.as_str()))?;

            let rows = collection_overview(&client).await;
            client.close().await;

            let rows = rows.context("failed to list collections")?;
            print!("{}", format_overview(&rows));

            let failed = stats.snapshot().aggregated().failed_requests;
            if failed > 0 {
                error!("{} request(s) failed", failed);
            }
        }
    }

    Ok(())
}

/// Loads and validates configuration, then applies command-line overrides.
fn load_config(target: &Target) -> anyhow::Result<SimloadConfig> {
    let mut config = SimloadConfig::load().context("failed to load configuration")?;

    if let Some(path) = &target.assets_file {
        config.scenario.assets = load_assets(path)?;
        info!(
            "Loaded {} assets from {}",
            config.scenario.assets.len(),
            path.display()
        );
    }
    if let Some(collection) = &target.collection {
        config.scenario.collection_name = collection.clone();
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Flips the returned flag to true on Ctrl-C.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, stopping");
                let _ = tx.send(true);
            }
            Err(err) => error!("failed to listen for Ctrl-C: {}", err),
        }
        // The sender must outlive the run.
        std::future::pending::<()>().await;
    });
    rx
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).with_target(false).init();
}
