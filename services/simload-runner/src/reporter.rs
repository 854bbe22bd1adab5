//! Pass/fail evaluation and report generation for a finished run.

use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use clap::ValueEnum;
use serde::Serialize;
use uuid::Uuid;

use crate::stats::{OperationStats, RunStats};

/// Report format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Markdown,
    Json,
}

/// Named success-criteria presets selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CriteriaProfile {
    #[default]
    Default,
    Production,
    Development,
}

impl CriteriaProfile {
    pub fn criteria(self) -> SuccessCriteria {
        match self {
            Self::Default => SuccessCriteria::default(),
            Self::Production => SuccessCriteria::production(),
            Self::Development => SuccessCriteria::development(),
        }
    }
}

/// Success criteria for a run
#[derive(Debug, Clone, PartialEq)]
pub struct SuccessCriteria {
    /// Maximum aggregate error rate (0.0-1.0)
    pub max_error_rate: f64,

    /// Maximum P95 latency per operation (milliseconds)
    pub max_p95_latency_ms: Option<f64>,

    /// Minimum aggregate throughput (events per second)
    pub min_throughput: Option<f64>,
}

impl Default for SuccessCriteria {
    fn default() -> Self {
        Self {
            max_error_rate: 0.01, // 1%
            max_p95_latency_ms: None,
            min_throughput: None,
        }
    }
}

impl SuccessCriteria {
    /// Targets for a shared production cluster
    pub fn production() -> Self {
        Self {
            max_error_rate: 0.001, // 0.1%
            max_p95_latency_ms: Some(500.0),
            min_throughput: None,
        }
    }

    /// Relaxed targets for a local development backend
    pub fn development() -> Self {
        Self {
            max_error_rate: 0.05, // 5%
            max_p95_latency_ms: Some(2_000.0),
            min_throughput: None,
        }
    }

    /// Replaces the thresholds that were given explicitly.
    pub fn with_overrides(
        mut self,
        max_error_rate: Option<f64>,
        max_p95_latency_ms: Option<f64>,
        min_throughput: Option<f64>,
    ) -> Self {
        if let Some(rate) = max_error_rate {
            self.max_error_rate = rate;
        }
        if max_p95_latency_ms.is_some() {
            self.max_p95_latency_ms = max_p95_latency_ms;
        }
        if min_throughput.is_some() {
            self.min_throughput = min_throughput;
        }
        self
    }
}

/// Latency percentiles of one operation, in milliseconds
#[derive(Debug, Serialize)]
struct LatencySummary {
    avg: f64,
    min: f64,
    p50: f64,
    p95: f64,
    p99: f64,
    max: f64,
}

/// One entry of the JSON report's `operations` array
#[derive(Debug, Serialize)]
struct OperationReport<'a> {
    #[serde(flatten)]
    stats: &'a OperationStats,
    error_rate: f64,
    latency_ms: LatencySummary,
}

impl<'a> From<&'a OperationStats> for OperationReport<'a> {
    fn from(op: &'a OperationStats) -> Self {
        Self {
            stats: op,
            error_rate: op.error_rate(),
            latency_ms: LatencySummary {
                avg: op.avg_ms(),
                min: op.min_ms(),
                p50: op.p50_ms(),
                p95: op.p95_ms(),
                p99: op.p99_ms(),
                max: op.max_ms(),
            },
        }
    }
}

/// Result writer for a finished run
pub struct ResultWriter {
    scenario_name: String,
    run_id: Uuid,
    stats: RunStats,
    criteria: SuccessCriteria,
}

impl ResultWriter {
    pub fn new(scenario_name: impl Into<String>, stats: RunStats, criteria: SuccessCriteria) -> Self {
        Self {
            scenario_name: scenario_name.into(),
            run_id: Uuid::new_v4(),
            stats,
            criteria,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Check if the run passed its success criteria
    pub fn passes(&self) -> bool {
        self.check_criteria().is_empty()
    }

    pub fn failure_summary(&self) -> String {
        let failures = self.check_criteria();
        if failures.is_empty() {
            return "All criteria passed".to_string();
        }

        failures.join("\n")
    }

    /// Check success criteria and return failures
    pub fn check_criteria(&self) -> Vec<String> {
        let mut failures = Vec::new();
        let total = self.stats.aggregated();

        if total.total_requests == 0 {
            failures.push("No requests were recorded".to_string());
            return failures;
        }

        if total.error_rate() > self.criteria.max_error_rate {
            failures.push(format!(
                "Error rate {:.4}% exceeds target {:.4}%",
                total.error_rate() * 100.0,
                self.criteria.max_error_rate * 100.0
            ));
        }

        if let Some(max_p95) = self.criteria.max_p95_latency_ms {
            for op in &self.stats.operations {
                let p95 = op.p95_ms();
                if p95 > max_p95 {
                    failures.push(format!(
                        "{} P95 latency {:.2}ms exceeds target {:.2}ms",
                        op.name, p95, max_p95
                    ));
                }
            }
        }

        if let Some(min_rps) = self.criteria.min_throughput {
            let rps = self.stats.throughput_rps();
            if rps < min_rps {
                failures.push(format!(
                    "Throughput {:.2} req/s below target {:.2} req/s",
                    rps, min_rps
                ));
            }
        }

        failures
    }

    /// Plain-text table for the terminal, one row per operation plus the aggregate.
    pub fn summary_table(&self) -> String {
        let total = self.stats.aggregated();
        let width = self
            .stats
            .operations
            .iter()
            .map(|op| op.name.len() + op.request_type.len() + 1)
            .max()
            .unwrap_or(0)
            .max(total.name.len());

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<width$} {:>8} {:>8} {:>10} {:>10} {:>10} {:>10}",
            "Name", "# reqs", "# fails", "Avg (ms)", "P50 (ms)", "P95 (ms)", "Max (ms)"
        );
        for op in &self.stats.operations {
            let label = format!("{} {}", op.request_type, op.name);
            write_row(&mut out, &label, op, width);
        }
        write_row(&mut out, &total.name, &total, width);
        out
    }

    /// Write report to file
    pub fn write_report(&self, path: impl AsRef<Path>, format: ReportFormat) -> std::io::Result<()> {
        let content = match format {
            ReportFormat::Markdown => self.generate_markdown(),
            ReportFormat::Json => self.generate_json(),
        };

        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }

    fn generate_markdown(&self) -> String {
        let total = self.stats.aggregated();
        let status = if self.passes() { "✅ PASSED" } else { "❌ FAILED" };

        let mut operations = String::new();
        for op in &self.stats.operations {
            let _ = writeln!(
                operations,
                "| {} | {} | {} | {} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} |",
                op.request_type,
                op.name,
                op.total_requests,
                op.failed_requests,
                op.avg_ms(),
                op.p50_ms(),
                op.p95_ms(),
                op.p99_ms(),
                op.max_ms()
            );
        }

        let mut errors = String::new();
        for op in &self.stats.operations {
            for (message, count) in &op.errors {
                let _ = writeln!(errors, "- `{}` ({}x): {}", op.name, count, message);
            }
        }
        if errors.is_empty() {
            errors.push_str("No errors\n");
        }

        let criteria = if self.passes() {
            "All criteria passed".to_string()
        } else {
            self.check_criteria()
                .iter()
                .map(|failure| format!("- {failure}"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            r#"# Load Test Report: {}

**Status**: {}
**Run ID**: {}

---

## Summary

- **Duration**: {:.1} seconds
- **Total Requests**: {}
- **Successful**: {}
- **Failed**: {}
- **Error Rate**: {:.4}%
- **Throughput**: {:.2} req/s

---

## Operations

| Type | Name | Requests | Failures | Avg (ms) | P50 (ms) | P95 (ms) | P99 (ms) | Max (ms) |
|------|------|----------|----------|----------|----------|----------|----------|----------|
{}
---

## Success Criteria

{}

---

## Errors

{}
---

**Report Generated**: {}
"#,
            self.scenario_name,
            status,
            self.run_id,
            self.stats.duration.as_secs_f64(),
            total.total_requests,
            total.successful_requests(),
            total.failed_requests,
            total.error_rate() * 100.0,
            self.stats.throughput_rps(),
            operations,
            criteria,
            errors,
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        )
    }

    fn generate_json(&self) -> String {
        let total = self.stats.aggregated();
        let operations: Vec<OperationReport<'_>> =
            self.stats.operations.iter().map(OperationReport::from).collect();

        let report = serde_json::json!({
            "scenario": self.scenario_name,
            "run_id": self.run_id.to_string(),
            "passed": self.passes(),
            "duration_secs": self.stats.duration.as_secs_f64(),
            "summary": {
                "total_requests": total.total_requests,
                "successful_requests": total.successful_requests(),
                "failed_requests": total.failed_requests,
                "error_rate": total.error_rate(),
                "throughput_rps": self.stats.throughput_rps(),
            },
            "operations": operations,
            "criteria_failures": self.check_criteria(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        serde_json::to_string_pretty(&report).unwrap_or_default()
    }
}

fn write_row(out: &mut String, label: &str, op: &OperationStats, width: usize) {
    let _ = writeln!(
        out,
        "{:<width$} {:>8} {:>8} {:>10.2} {:>10.2} {:>10.2} {:>10.2}",
        label,
        op.total_requests,
        op.failed_requests,
        op.avg_ms(),
        op.p50_ms(),
        op.p95_ms(),
        op.max_ms()
    );
}
