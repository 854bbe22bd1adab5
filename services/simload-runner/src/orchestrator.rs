//! Load orchestrator: spawns virtual users at the configured rate and
//! collects their events until the run ends.

use std::sync::Arc;
use std::time::Duration;

use simload_core::{
    CoreResult, EventSink, FanoutSink, InstrumentedClient, SimilaritySearchBackend,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant};
use tracing::{info, warn};

use crate::scenario::{ScenarioSettings, SimilarityScenario};
use crate::stats::{RunStats, StatsCollector};
use crate::user::{run_user, stop_requested, UserSettings};

/// Builds the backend client for the virtual user with the given index.
pub type BackendFactory =
    Arc<dyn Fn(usize) -> CoreResult<Arc<dyn SimilaritySearchBackend>> + Send + Sync>;

/// Shape of a run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Number of concurrent virtual users
    pub users: usize,

    /// Users started per second
    pub spawn_rate: f64,

    /// Total run time, measured from the first spawn
    pub run_time: Duration,

    /// Scenario iterations per second, per user
    pub throughput: f64,

    /// Base RNG seed for reproducible query streams
    pub seed: Option<u64>,

    /// Interval between progress log lines
    pub report_interval: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            users: 1,
            spawn_rate: 1.0,
            run_time: Duration::from_secs(60),
            throughput: 1.0,
            seed: None,
            report_interval: Duration::from_secs(10),
        }
    }
}

/// Load orchestrator
pub struct LoadOrchestrator {
    config: RunConfig,
    settings: ScenarioSettings,
    factory: BackendFactory,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl LoadOrchestrator {
    pub fn new(config: RunConfig, settings: ScenarioSettings, factory: BackendFactory) -> Self {
        Self {
            config,
            settings,
            factory,
            sinks: Vec::new(),
        }
    }

    /// Also deliver every event to `sink` (builder pattern).
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Runs until the run time elapses or `shutdown` flips to true.
    ///
    /// # Errors
    ///
    /// Fails only when a backend client cannot be built; users already
    /// running are stopped first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> CoreResult<RunStats> {
        info!(
            users = self.config.users,
            spawn_rate = self.config.spawn_rate,
            run_time_secs = self.config.run_time.as_secs_f64(),
            throughput = self.config.throughput,
            "Starting load test"
        );

        let stats = Arc::new(StatsCollector::new());
        let sink: Arc<dyn EventSink> = Arc::new(
            self.sinks
                .iter()
                .cloned()
                .fold(FanoutSink::default().with(stats.clone()), FanoutSink::with),
        );

        let deadline = Instant::now() + self.config.run_time;
        let progress = Self::spawn_progress_reporter(stats.clone(), self.config.report_interval);

        // Users watch their own copy so a spawn failure can stop them.
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(self.config.users);
        let spawn_delay = spawn_interval(self.config.spawn_rate);
        let mut spawn_error = None;

        for index in 0..self.config.users {
            if stop_requested(&shutdown) || Instant::now() >= deadline {
                break;
            }

            let backend = match (self.factory)(index) {
                Ok(backend) => backend,
                Err(err) => {
                    spawn_error = Some(err);
                    break;
                }
            };
            let scenario = SimilarityScenario::new(
                InstrumentedClient::new(backend, sink.clone()),
                self.settings.clone(),
            );
            let settings = UserSettings {
                index,
                throughput: self.config.throughput,
                seed: self.config.seed,
                deadline,
            };
            handles.push(tokio::spawn(run_user(scenario, settings, stop_rx.clone())));

            if index + 1 < self.config.users {
                let wake = Instant::now()
                    .checked_add(spawn_delay)
                    .map_or(deadline, |wake| wake.min(deadline));
                tokio::select! {
                    _ = tokio::time::sleep_until(wake) => {}
                    _ = wait_for_shutdown(&mut shutdown) => {}
                }
            }
        }
        info!("Spawned {} users", handles.len());

        if spawn_error.is_some() {
            let _ = stop_tx.send(true);
        } else {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("Shutdown requested, stopping users");
                    let _ = stop_tx.send(true);
                }
            }
        }

        let iterations = join_users(handles).await;
        progress.abort();

        if let Some(err) = spawn_error {
            return Err(err);
        }

        let snapshot = stats.snapshot();
        let total = snapshot.aggregated();
        info!(
            iterations,
            total_requests = total.total_requests,
            failed_requests = total.failed_requests,
            "Load test complete"
        );
        Ok(snapshot)
    }

    fn spawn_progress_reporter(stats: Arc<StatsCollector>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let snapshot = stats.snapshot();
                let total = snapshot.aggregated();
                info!(
                    "[{:.0}s] Requests: {}, P95: {:.1}ms, Errors: {:.2}%, RPS: {:.2}",
                    snapshot.duration.as_secs_f64(),
                    total.total_requests,
                    total.p95_ms(),
                    total.error_rate() * 100.0,
                    snapshot.throughput_rps()
                );
            }
        })
    }
}

/// Delay between two user spawns.
fn spawn_interval(spawn_rate: f64) -> Duration {
    if !spawn_rate.is_finite() || spawn_rate <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(1.0 / spawn_rate).unwrap_or(Duration::MAX)
}

/// Resolves once the flag is true. Pends forever if the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if stop_requested(shutdown) {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn join_users(handles: Vec<JoinHandle<usize>>) -> usize {
    let mut iterations = 0;
    for handle in handles {
        match handle.await {
            Ok(count) => iterations += count,
            Err(err) => warn!("virtual user task failed: {}", err),
        }
    }
    iterations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_interval() {
        assert_eq!(spawn_interval(4.0), Duration::from_millis(250));
        assert_eq!(spawn_interval(0.0), Duration::ZERO);
        assert_eq!(spawn_interval(f64::NAN), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_wait_for_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move { wait_for_shutdown(&mut rx).await });

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
