//! Per-operation statistics gathered from outcome events.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use simload_core::{EventSink, RequestEvent};

/// Aggregated results for one `(request_type, name)` pair.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OperationStats {
    pub request_type: String,
    pub name: String,

    /// Total events received
    pub total_requests: usize,

    /// Events carrying an exception
    pub failed_requests: usize,

    /// Response times in milliseconds
    #[serde(skip)]
    pub latencies_ms: Vec<f64>,

    /// Distinct failure messages and how often each occurred
    pub errors: BTreeMap<String, usize>,
}

impl OperationStats {
    fn new(request_type: &str, name: &str) -> Self {
        Self {
            request_type: request_type.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn record(&mut self, event: &RequestEvent) {
        self.total_requests += 1;
        self.latencies_ms.push(event.response_time_ms);
        if let Some(exception) = &event.exception {
            self.failed_requests += 1;
            *self.errors.entry(exception.clone()).or_default() += 1;
        }
    }

    fn merge(&mut self, other: &OperationStats) {
        self.total_requests += other.total_requests;
        self.failed_requests += other.failed_requests;
        self.latencies_ms.extend_from_slice(&other.latencies_ms);
        for (message, count) in &other.errors {
            *self.errors.entry(message.clone()).or_default() += count;
        }
    }

    pub fn successful_requests(&self) -> usize {
        self.total_requests - self.failed_requests
    }

    /// Failure rate (0.0-1.0)
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.failed_requests as f64 / self.total_requests as f64
    }

    pub fn avg_ms(&self) -> f64 {
        if self.latencies_ms.is_empty() {
            return 0.0;
        }
        self.latencies_ms.iter().sum::<f64>() / self.latencies_ms.len() as f64
    }

    pub fn min_ms(&self) -> f64 {
        self.latencies_ms.iter().copied().reduce(f64::min).unwrap_or(0.0)
    }

    pub fn max_ms(&self) -> f64 {
        self.latencies_ms.iter().copied().reduce(f64::max).unwrap_or(0.0)
    }

    pub fn p50_ms(&self) -> f64 {
        self.percentile(0.50)
    }

    pub fn p95_ms(&self) -> f64 {
        self.percentile(0.95)
    }

    pub fn p99_ms(&self) -> f64 {
        self.percentile(0.99)
    }

    /// Nearest-rank percentile over recorded latencies.
    pub fn percentile(&self, p: f64) -> f64 {
        if self.latencies_ms.is_empty() {
            return 0.0;
        }

        let mut sorted = self.latencies_ms.clone();
        sorted.sort_unstable_by(f64::total_cmp);

        let index = ((sorted.len() as f64) * p) as usize;
        sorted[index.min(sorted.len() - 1)]
    }
}

/// Snapshot of a whole run.
#[derive(Debug, Clone)]
pub struct RunStats {
    pub duration: Duration,
    /// Ordered by request type, then operation name
    pub operations: Vec<OperationStats>,
}

impl RunStats {
    /// All operations folded into one row.
    pub fn aggregated(&self) -> OperationStats {
        let mut total = OperationStats::new("", "Aggregated");
        for op in &self.operations {
            total.merge(op);
        }
        total
    }

    pub fn operation(&self, name: &str) -> Option<&OperationStats> {
        self.operations.iter().find(|op| op.name == name)
    }

    /// Events per second over the run.
    pub fn throughput_rps(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.aggregated().total_requests as f64 / secs
    }
}

/// Event sink that aggregates statistics per operation.
pub struct StatsCollector {
    start_time: Instant,
    operations: Mutex<BTreeMap<(String, String), OperationStats>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            operations: Mutex::new(BTreeMap::new()),
        }
    }

    /// Current statistics; the run duration is measured up to now.
    pub fn snapshot(&self) -> RunStats {
        RunStats {
            duration: self.start_time.elapsed(),
            operations: self.operations.lock().values().cloned().collect(),
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for StatsCollector {
    fn emit(&self, event: RequestEvent) {
        let mut operations = self.operations.lock();
        operations
            .entry((event.request_type.clone(), event.name.clone()))
            .or_insert_with(|| OperationStats::new(&event.request_type, &event.name))
            .record(&event);
    }
}
