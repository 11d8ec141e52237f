//! Scenario definitions and step errors

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

use super::context::ScenarioContext;
use super::simulation::LoadPlan;

/// Why a step (or a whole iteration) failed
#[derive(Debug, Error)]
pub enum StepError {
    #[error("HTTP status {0}")]
    Status(u16),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Iteration cancelled")]
    Cancelled,

    #[error("Iteration panicked: {0}")]
    Panicked(String),
}

impl StepError {
    /// Short label used to group failures in reports and metrics
    pub fn reason(&self) -> String {
        match self {
            StepError::Status(code) => format!("status_{code}"),
            StepError::Transport(_) => "transport".to_string(),
            StepError::WebSocket(_) => "websocket".to_string(),
            StepError::Cancelled => "cancelled".to_string(),
            StepError::Panicked(_) => "panic".to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StepError::Cancelled)
    }
}

/// The work a virtual user repeats for every iteration of a scenario
#[async_trait]
pub trait ScenarioBody: Send + Sync {
    /// One-time setup before any worker starts
    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Run one iteration
    async fn run(&self, ctx: &ScenarioContext) -> Result<(), StepError>;
}

/// A named scenario bound to its load plan, ready to register with a `Runner`
#[derive(Clone)]
pub struct ScenarioProps {
    pub name: String,
    pub body: Arc<dyn ScenarioBody>,
    pub plan: LoadPlan,
}

impl ScenarioProps {
    pub fn new(name: impl Into<String>, body: Arc<dyn ScenarioBody>, plan: LoadPlan) -> Self {
        Self {
            name: name.into(),
            body,
            plan,
        }
    }
}

impl fmt::Debug for ScenarioProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioProps")
            .field("name", &self.name)
            .field("plan", &self.plan)
            .finish_non_exhaustive()
    }
}
