//! Outcome aggregation and run reports

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use super::types::StepError;

/// Lowest latency the histogram can tell apart, in microseconds
const LATENCY_LOW_US: u64 = 1;
/// Latencies above this are clamped, in microseconds
const LATENCY_HIGH_US: u64 = 60 * 60 * 1_000_000;
/// Significant figures kept per recorded value
const LATENCY_SIGFIG: u8 = 3;

/// Latency distribution for one step, bounded in memory regardless of how
/// many samples are recorded
#[derive(Debug, Default, Clone)]
pub struct LatencyStats {
    histogram: Option<Histogram<u64>>,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, latency: Duration) {
        if self.histogram.is_none() {
            self.histogram = new_histogram();
        }
        if let Some(histogram) = self.histogram.as_mut() {
            let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
            histogram.saturating_record(micros);
        }
    }

    pub fn count(&self) -> u64 {
        self.histogram.as_ref().map_or(0, Histogram::len)
    }

    /// Summarize the samples; all zeros when nothing was recorded
    pub fn report(&self) -> LatencyReport {
        match &self.histogram {
            Some(h) if !h.is_empty() => LatencyReport {
                mean_ms: h.mean() / 1000.0,
                p50_ms: us_as_ms(h.value_at_quantile(0.50)),
                p75_ms: us_as_ms(h.value_at_quantile(0.75)),
                p95_ms: us_as_ms(h.value_at_quantile(0.95)),
                p99_ms: us_as_ms(h.value_at_quantile(0.99)),
                max_ms: us_as_ms(h.max()),
            },
            _ => LatencyReport::default(),
        }
    }
}

fn new_histogram() -> Option<Histogram<u64>> {
    match Histogram::new_with_bounds(LATENCY_LOW_US, LATENCY_HIGH_US, LATENCY_SIGFIG) {
        Ok(histogram) => Some(histogram),
        Err(e) => {
            warn!("Latency histogram unavailable: {:?}", e);
            None
        }
    }
}

fn us_as_ms(micros: u64) -> f64 {
    micros as f64 / 1000.0
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct LatencyReport {
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p75_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Default)]
struct StepRecord {
    ok: u64,
    fail: u64,
    cancelled: u64,
    failures: BTreeMap<String, u64>,
    latencies: LatencyStats,
}

impl StepRecord {
    /// Cancellations are counted apart from failures
    fn record(&mut self, outcome: Result<(), &StepError>, latency: Duration) {
        match outcome {
            Ok(()) => {
                self.ok += 1;
                self.latencies.record(latency);
            }
            Err(err) if err.is_cancelled() => self.cancelled += 1,
            Err(err) => {
                self.fail += 1;
                *self.failures.entry(err.reason()).or_default() += 1;
            }
        }
    }

    fn report(&self, name: &str) -> StepReport {
        StepReport {
            name: name.to_string(),
            ok: self.ok,
            fail: self.fail,
            cancelled: self.cancelled,
            failures: self.failures.clone(),
            latency: self.latencies.report(),
        }
    }
}

/// Live counters for one scenario, shared by its workers
#[derive(Debug)]
pub struct ScenarioStats {
    name: String,
    steps: Mutex<Vec<(&'static str, StepRecord)>>,
    iterations: Mutex<StepRecord>,
    iterations_ok: AtomicU64,
    iterations_fail: AtomicU64,
    active_copies: AtomicUsize,
    peak_copies: AtomicUsize,
}

impl ScenarioStats {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            steps: Mutex::new(Vec::new()),
            iterations: Mutex::new(StepRecord::default()),
            iterations_ok: AtomicU64::new(0),
            iterations_fail: AtomicU64::new(0),
            active_copies: AtomicUsize::new(0),
            peak_copies: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_step(
        &self,
        step: &'static str,
        outcome: Result<(), &StepError>,
        latency: Duration,
    ) {
        let status = status_label(outcome);
        counter!(
            "loadtester_step_total",
            "scenario" => self.name.clone(),
            "step" => step,
            "status" => status
        )
        .increment(1);
        histogram!(
            "loadtester_step_duration_seconds",
            "scenario" => self.name.clone(),
            "step" => step
        )
        .record(latency);

        let mut steps = self.steps.lock().unwrap_or_else(PoisonError::into_inner);
        let index = match steps.iter().position(|(name, _)| *name == step) {
            Some(index) => index,
            None => {
                steps.push((step, StepRecord::default()));
                steps.len() - 1
            }
        };
        steps[index].1.record(outcome, latency);
    }

    pub fn record_iteration(&self, outcome: Result<(), &StepError>, latency: Duration) {
        counter!(
            "loadtester_iterations_total",
            "scenario" => self.name.clone(),
            "status" => status_label(outcome)
        )
        .increment(1);

        match outcome {
            Ok(()) => {
                self.iterations_ok.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) if err.is_cancelled() => {}
            Err(_) => {
                self.iterations_fail.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.iterations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(outcome, latency);
    }

    pub fn set_active_copies(&self, copies: usize) {
        self.active_copies.store(copies, Ordering::Relaxed);
        self.peak_copies.fetch_max(copies, Ordering::Relaxed);
        gauge!("loadtester_active_copies", "scenario" => self.name.clone()).set(copies as f64);
    }

    pub fn active_copies(&self) -> usize {
        self.active_copies.load(Ordering::Relaxed)
    }

    pub fn iterations_ok(&self) -> u64 {
        self.iterations_ok.load(Ordering::Relaxed)
    }

    pub fn iterations_fail(&self) -> u64 {
        self.iterations_fail.load(Ordering::Relaxed)
    }

    /// Snapshot the counters into a report
    pub fn report(&self, status: ScenarioStatus, duration: Duration) -> ScenarioReport {
        let steps = self
            .steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, record)| record.report(name))
            .collect();

        let iterations = self
            .iterations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .report("iteration");

        ScenarioReport {
            name: self.name.clone(),
            status,
            duration_secs: duration.as_secs_f64(),
            peak_copies: self.peak_copies.load(Ordering::Relaxed),
            iterations,
            steps,
        }
    }
}

fn status_label(outcome: Result<(), &StepError>) -> &'static str {
    match outcome {
        Ok(()) => "ok",
        Err(err) if err.is_cancelled() => "cancelled",
        Err(_) => "fail",
    }
}

/// How a scenario ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScenarioStatus {
    /// The load plan ran to completion
    Completed,
    /// The run was aborted before the plan finished
    Cancelled,
    /// Setup failed, no worker was started
    SetupFailed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub name: String,
    pub ok: u64,
    pub fail: u64,
    /// Executions interrupted by ramp-down, plan end or an aborted run.
    /// Not included in `fail`.
    pub cancelled: u64,
    /// Failure counts keyed by reason label
    pub failures: BTreeMap<String, u64>,
    /// Latency of successful executions
    pub latency: LatencyReport,
}

impl StepReport {
    /// Executions that ran to an outcome, excluding cancellations
    pub fn total(&self) -> u64 {
        self.ok + self.fail
    }

    /// Failed fraction (0.0 to 1.0)
    pub fn error_rate(&self) -> f64 {
        if self.total() > 0 {
            self.fail as f64 / self.total() as f64
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub status: ScenarioStatus,
    pub duration_secs: f64,
    pub peak_copies: usize,
    pub iterations: StepReport,
    pub steps: Vec<StepReport>,
}

impl ScenarioReport {
    /// Iterations per second over the scenario's run time
    pub fn throughput(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.iterations.total() as f64 / self.duration_secs
        } else {
            0.0
        }
    }
}

/// Result of one `Runner::run`
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub scenarios: Vec<ScenarioReport>,
}

impl RunReport {
    pub fn total_ok(&self) -> u64 {
        self.scenarios.iter().map(|s| s.iterations.ok).sum()
    }

    pub fn total_fail(&self) -> u64 {
        self.scenarios.iter().map(|s| s.iterations.fail).sum()
    }

    pub fn total_cancelled(&self) -> u64 {
        self.scenarios.iter().map(|s| s.iterations.cancelled).sum()
    }

    pub fn scenario(&self, name: &str) -> Option<&ScenarioReport> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!(r#"{{"error":"{e}"}}"#))
    }

    #[allow(clippy::print_literal)]
    pub fn print_summary(&self) {
        println!();
        println!("═══════════════════════════════════════════════════════════════");
        println!(
            " RUN {} ({:.1}s, {} scenarios)",
            self.run_id,
            self.duration_secs,
            self.scenarios.len()
        );
        println!("═══════════════════════════════════════════════════════════════");

        for scenario in &self.scenarios {
            println!();
            let status = match &scenario.status {
                ScenarioStatus::Completed => "completed".to_string(),
                ScenarioStatus::Cancelled => "cancelled".to_string(),
                ScenarioStatus::SetupFailed { error } => format!("setup failed: {error}"),
            };
            println!(
                " ─── {} ({}, peak {} copies, {:.1} it/s) ───",
                scenario.name,
                status,
                scenario.peak_copies,
                scenario.throughput()
            );
            println!();
            println!(
                "   {:20} {:>8} {:>8} {:>8} {:>9} {:>9} {:>9} {:>9}",
                "Step", "OK", "Fail", "Cxl", "Mean ms", "P50 ms", "P95 ms", "P99 ms"
            );
            for step in scenario.steps.iter().chain(std::iter::once(&scenario.iterations)) {
                println!(
                    "   {:20} {:>8} {:>8} {:>8} {:>9.1} {:>9.1} {:>9.1} {:>9.1}",
                    step.name,
                    step.ok,
                    step.fail,
                    step.cancelled,
                    step.latency.mean_ms,
                    step.latency.p50_ms,
                    step.latency.p95_ms,
                    step.latency.p99_ms
                );
                for (reason, count) in &step.failures {
                    println!("   {:>20} {:>8}", reason, count);
                }
            }
        }

        println!();
        println!("═══════════════════════════════════════════════════════════════");
        println!(
            " TOTAL: {} ok, {} failed, {} cancelled iterations",
            self.total_ok(),
            self.total_fail(),
            self.total_cancelled()
        );
        println!("═══════════════════════════════════════════════════════════════");
        println!();
    }
}
