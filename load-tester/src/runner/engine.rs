//! Worker orchestration
//!
//! Each registered scenario gets a controller task. Every `CONTROL_TICK` the
//! controller compares the live worker count with its load plan, spawning or
//! cancelling workers to match. Once the plan is exhausted (or the run is
//! cancelled) every worker is cancelled and joined.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::FutureExt;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::context::ScenarioContext;
use super::stats::{RunReport, ScenarioReport, ScenarioStats, ScenarioStatus};
use super::types::{ScenarioBody, ScenarioProps, StepError};

/// How often controllers re-evaluate their load plan
const CONTROL_TICK: Duration = Duration::from_millis(100);

/// Default interval between progress log lines
pub const DEFAULT_REPORTING_INTERVAL: Duration = Duration::from_secs(5);

/// Runs registered scenarios concurrently until their load plans finish
pub struct Runner {
    scenarios: Vec<ScenarioProps>,
    reporting_interval: Duration,
    token: CancellationToken,
}

impl Runner {
    pub fn new() -> Self {
        Self {
            scenarios: Vec::new(),
            reporting_interval: DEFAULT_REPORTING_INTERVAL,
            token: CancellationToken::new(),
        }
    }

    pub fn register_scenarios(
        mut self,
        scenarios: impl IntoIterator<Item = ScenarioProps>,
    ) -> Self {
        self.scenarios.extend(scenarios);
        self
    }

    pub fn with_reporting_interval(mut self, interval: Duration) -> Self {
        self.reporting_interval = interval;
        self
    }

    /// Use an externally owned token; cancelling it aborts the run
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Token that aborts the run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn scenario_names(&self) -> Vec<&str> {
        self.scenarios.iter().map(|s| s.name.as_str()).collect()
    }

    /// Run every scenario to completion and collect the report
    pub async fn run(self) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();

        info!(
            "Starting run {} with {} scenario(s): {:?}",
            run_id,
            self.scenarios.len(),
            self.scenario_names()
        );

        let stats: Vec<Arc<ScenarioStats>> = self
            .scenarios
            .iter()
            .map(|s| Arc::new(ScenarioStats::new(&s.name)))
            .collect();

        let reporter_token = CancellationToken::new();
        let reporter = tokio::spawn(report_progress(
            stats.clone(),
            self.reporting_interval,
            reporter_token.clone(),
        ));

        let mut controllers = JoinSet::new();
        let scenarios = self.scenarios.into_iter().zip(stats.iter().cloned());
        for (index, (props, stats)) in scenarios.enumerate() {
            let token = self.token.child_token();
            controllers.spawn(async move { (index, run_scenario(props, stats, token).await) });
        }

        let mut reports: Vec<(usize, ScenarioReport)> = Vec::with_capacity(stats.len());
        while let Some(result) = controllers.join_next().await {
            match result {
                Ok(entry) => reports.push(entry),
                Err(e) => error!("Scenario controller failed: {}", e),
            }
        }
        reports.sort_by_key(|(index, _)| *index);

        reporter_token.cancel();
        if let Err(e) = reporter.await {
            error!("Progress reporter failed: {}", e);
        }

        let report = RunReport {
            run_id,
            started_at,
            duration_secs: start.elapsed().as_secs_f64(),
            scenarios: reports.into_iter().map(|(_, report)| report).collect(),
        };
        info!(
            "Run {} finished in {:.1}s: {} ok, {} failed iterations",
            run_id,
            report.duration_secs,
            report.total_ok(),
            report.total_fail()
        );
        report
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_scenario(
    props: ScenarioProps,
    stats: Arc<ScenarioStats>,
    token: CancellationToken,
) -> ScenarioReport {
    let ScenarioProps { name, body, plan } = props;

    if let Err(e) = body.init().await {
        error!("Scenario {} setup failed: {:#}", name, e);
        return stats.report(
            ScenarioStatus::SetupFailed {
                error: format!("{e:#}"),
            },
            Duration::ZERO,
        );
    }

    info!(
        "Scenario {} started: peak {} copies over {:?}",
        name,
        plan.peak_copies(),
        plan.total_duration()
    );

    let name: Arc<str> = Arc::from(name);
    let start = Instant::now();
    // Live workers, oldest first, keyed by task id
    let mut workers: Vec<(Id, CancellationToken)> = Vec::new();
    let mut tasks = JoinSet::new();
    let mut next_worker = 0usize;
    let mut ticker = tokio::time::interval(CONTROL_TICK);

    let status = loop {
        tokio::select! {
            _ = token.cancelled() => break ScenarioStatus::Cancelled,
            _ = ticker.tick() => {}
        }

        let Some(target) = plan.target_at(start.elapsed()) else {
            break ScenarioStatus::Completed;
        };

        // Workers that exited on their own no longer count towards the target
        while let Some(result) = tasks.try_join_next_with_id() {
            let id = match &result {
                Ok((id, ())) => *id,
                Err(e) => e.id(),
            };
            workers.retain(|(worker, _)| *worker != id);
            log_worker_exit(&name, result.map(|_| ()));
        }

        while workers.len() < target {
            let worker_token = token.child_token();
            let handle = tasks.spawn(run_worker(
                name.clone(),
                next_worker,
                body.clone(),
                stats.clone(),
                worker_token.clone(),
            ));
            workers.push((handle.id(), worker_token));
            next_worker += 1;
        }
        while workers.len() > target {
            if let Some((_, worker_token)) = workers.pop() {
                worker_token.cancel();
            }
        }
        stats.set_active_copies(workers.len());
    };

    if status == ScenarioStatus::Cancelled {
        warn!("Scenario {} cancelled", name);
    }

    // Stop every remaining worker and wait for in-flight iterations to unwind
    token.cancel();
    while let Some(result) = tasks.join_next().await {
        log_worker_exit(&name, result);
    }
    stats.set_active_copies(0);

    let elapsed = start.elapsed();
    info!(
        "Scenario {} finished after {:.1}s: {} ok, {} failed iterations",
        name,
        elapsed.as_secs_f64(),
        stats.iterations_ok(),
        stats.iterations_fail()
    );
    stats.report(status, elapsed)
}

fn log_worker_exit(scenario: &str, result: Result<(), JoinError>) {
    if let Err(e) = result
        && e.is_panic()
    {
        error!("Worker in scenario {} panicked: {}", scenario, e);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn run_worker(
    scenario: Arc<str>,
    worker: usize,
    body: Arc<dyn ScenarioBody>,
    stats: Arc<ScenarioStats>,
    token: CancellationToken,
) {
    debug!("Worker {} of {} started", worker, scenario);
    let mut iteration = 0u64;

    while !token.is_cancelled() {
        let ctx = ScenarioContext::new(
            scenario.clone(),
            worker,
            iteration,
            token.clone(),
            stats.clone(),
        );
        let started = Instant::now();
        let result = match AssertUnwindSafe(body.run(&ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    "Iteration {} of worker {} in {} panicked: {}",
                    iteration, worker, scenario, message
                );
                Err(StepError::Panicked(message))
            }
        };
        stats.record_iteration(result.as_ref().map(|_| ()), started.elapsed());
        iteration += 1;

        // Bodies that never await must not starve the controller
        tokio::task::yield_now().await;
    }

    debug!(
        "Worker {} of {} stopped after {} iterations",
        worker, scenario, iteration
    );
}

async fn report_progress(
    stats: Vec<Arc<ScenarioStats>>,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval.max(CONTROL_TICK));
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                for scenario in &stats {
                    info!(
                        "[{}] copies={} ok={} fail={}",
                        scenario.name(),
                        scenario.active_copies(),
                        scenario.iterations_ok(),
                        scenario.iterations_fail()
                    );
                }
            }
        }
    }
}
