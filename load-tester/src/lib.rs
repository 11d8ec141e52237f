//! Load harness for the TBF live API
//!
//! Resolves a load profile from the environment, assembles an HTTP scenario
//! and a WebSocket hub scenario, and drives them with ramping concurrency.

pub mod config;
pub mod http;
pub mod hub;
pub mod runner;
pub mod scenario;
pub mod tls;

// Re-export commonly used types
pub use config::{ConfigError, Environment, LoadConfig, LoadProfile, RunnerSettings};
pub use runner::{RunReport, Runner, ScenarioContext, ScenarioProps, StepError};
pub use scenario::{AssemblyError, assemble};
