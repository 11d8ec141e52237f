//! Per-iteration context

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::stats::ScenarioStats;
use super::types::StepError;

/// Context handed to a scenario body for one iteration
///
/// Every blocking operation inside an iteration should go through
/// [`ScenarioContext::cancellable`] or [`ScenarioContext::sleep`] so that the
/// runner can tear workers down promptly.
pub struct ScenarioContext {
    scenario: Arc<str>,
    worker: usize,
    iteration: u64,
    token: CancellationToken,
    stats: Arc<ScenarioStats>,
}

impl ScenarioContext {
    pub fn new(
        scenario: Arc<str>,
        worker: usize,
        iteration: u64,
        token: CancellationToken,
        stats: Arc<ScenarioStats>,
    ) -> Self {
        Self {
            scenario,
            worker,
            iteration,
            token,
            stats,
        }
    }

    pub fn scenario_name(&self) -> &str {
        &self.scenario
    }

    pub fn worker(&self) -> usize {
        self.worker
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Run a named step, recording its latency and outcome
    pub async fn step<F, T>(&self, name: &'static str, fut: F) -> Result<T, StepError>
    where
        F: Future<Output = Result<T, StepError>>,
    {
        let start = Instant::now();
        let result = fut.await;
        self.stats
            .record_step(name, result.as_ref().map(|_| ()), start.elapsed());
        result
    }

    /// Race `fut` against this iteration's cancellation
    pub async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output, StepError> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(StepError::Cancelled),
            output = fut => Ok(output),
        }
    }

    /// Sleep unless the iteration is cancelled first
    pub async fn sleep(&self, duration: Duration) -> Result<(), StepError> {
        self.cancellable(tokio::time::sleep(duration)).await
    }
}
