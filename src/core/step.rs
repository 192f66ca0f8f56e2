//! Step domain model

use crate::coordination::error::{Severity, StoreError};
use crate::core::{context::PipelineContext, state::StepState};
use crate::execution::retry::RetryError;
use crate::process::{build::BuildReport, command::CommandError, registry::ProcessRecord, ProcessError};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Value a step leaves in the context under its own name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StepOutput {
    Done,
    Flag(bool),
    Text(String),
    Count(usize),
    Process(ProcessRecord),
    Builds(BuildReport),
}

impl fmt::Display for StepOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutput::Done => write!(f, "done"),
            StepOutput::Flag(value) => write!(f, "{}", value),
            StepOutput::Text(text) => write!(f, "{}", text),
            StepOutput::Count(n) => write!(f, "{}", n),
            StepOutput::Process(record) => write!(f, "{} (pid {})", record.label, record.pid),
            StepOutput::Builds(report) => write!(
                f,
                "{} built, {} failed",
                report.succeeded(),
                report.failed()
            ),
        }
    }
}

/// What a step asks the engine to do next
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Record the output and continue with the next step
    Output(StepOutput),
    /// Abandon the rest of the current route and continue with the named one
    Reroute(String),
}

impl StepOutcome {
    pub fn done() -> Self {
        StepOutcome::Output(StepOutput::Done)
    }
}

/// Error surfaced by a step to the engine
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StepError {
    /// Halts the pipeline
    #[error("{0}")]
    Fatal(String),

    /// Logged; the pipeline continues
    #[error("{0}")]
    Recoverable(String),

    /// A required earlier output or resource is missing
    #[error("missing parameter: {0}")]
    MissingParameter(String),
}

impl StepError {
    pub fn fatal(message: impl Into<String>) -> Self {
        StepError::Fatal(message.into())
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, StepError::Recoverable(_))
    }
}

impl From<StoreError> for StepError {
    fn from(err: StoreError) -> Self {
        match err.severity() {
            Severity::Recoverable => StepError::Recoverable(err.to_string()),
            Severity::Fatal => StepError::Fatal(err.to_string()),
        }
    }
}

impl From<ProcessError> for StepError {
    fn from(err: ProcessError) -> Self {
        StepError::Fatal(err.to_string())
    }
}

impl From<CommandError> for StepError {
    fn from(err: CommandError) -> Self {
        StepError::Fatal(err.to_string())
    }
}

impl<E: fmt::Display> From<RetryError<E>> for StepError {
    fn from(err: RetryError<E>) -> Self {
        StepError::Fatal(err.to_string())
    }
}

/// Executable behaviour behind a step.
///
/// Each action owns its typed options. The engine never retries a step;
/// actions that need retries use `execution::retry` themselves.
#[async_trait]
pub trait StepAction: Send + Sync {
    async fn run(&self, ctx: &PipelineContext) -> Result<StepOutcome, StepError>;

    /// Names of earlier steps whose outputs this action reads
    fn requires(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A single named step in a route
#[derive(Clone)]
pub struct Step {
    /// Unique step name; also the key of its output in the context
    pub name: String,

    pub action: Arc<dyn StepAction>,

    /// Runtime state
    pub state: StepState,
}

impl Step {
    pub fn new(name: impl Into<String>, action: impl StepAction + 'static) -> Self {
        Self {
            name: name.into(),
            action: Arc::new(action),
            state: StepState::Pending,
        }
    }

    pub fn requires(&self) -> Vec<String> {
        self.action.requires()
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("state", &self.state)
            .finish()
    }
}
