//! Scenario runner
//!
//! This module provides:
//! - `ScenarioBody` trait for iteration bodies
//! - `LoadPlan` ramp/hold curves controlling concurrent workers
//! - `ScenarioContext` handed to each iteration (cancellation + step recording)
//! - `Runner` that drives registered scenarios and produces a `RunReport`

mod context;
mod engine;
mod simulation;
mod stats;
mod types;

pub use context::ScenarioContext;
pub use engine::Runner;
pub use simulation::{LoadPlan, LoadSimulation};
pub use stats::{
    LatencyReport, LatencyStats, RunReport, ScenarioReport, ScenarioStats, ScenarioStatus,
    StepReport,
};
pub use types::{ScenarioBody, ScenarioProps, StepError};
