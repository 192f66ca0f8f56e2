//! Pipeline context - shared state for one boot

use crate::coordination::CoordinationStore;
use crate::core::{config::BootConfig, step::{StepError, StepOutput}};
use crate::execution::tasks::TaskSet;
use crate::process::registry::{ProcessRecord, ProcessRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Execution context for a pipeline run
///
/// Cheap to clone; every step and background task of one run shares the
/// same configuration, output map, store slot, process registry, task set
/// and shutdown token.
#[derive(Clone)]
pub struct PipelineContext {
    config: Arc<BootConfig>,
    outputs: Arc<Mutex<HashMap<String, StepOutput>>>,
    store: Arc<Mutex<Option<Arc<dyn CoordinationStore>>>>,
    registry: ProcessRegistry,
    tasks: TaskSet,
    shutdown: CancellationToken,
}

impl PipelineContext {
    pub fn new(config: BootConfig) -> Self {
        Self {
            config: Arc::new(config),
            outputs: Arc::new(Mutex::new(HashMap::new())),
            store: Arc::new(Mutex::new(None)),
            registry: ProcessRegistry::new(),
            tasks: TaskSet::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Use an externally owned shutdown token (the signal listener's)
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn config(&self) -> &BootConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn tasks(&self) -> &TaskSet {
        &self.tasks
    }

    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Record the output of a step
    pub async fn set_output(&self, step: &str, output: StepOutput) {
        self.outputs.lock().await.insert(step.to_string(), output);
    }

    /// Get the output of a step
    pub async fn output(&self, step: &str) -> Option<StepOutput> {
        self.outputs.lock().await.get(step).cloned()
    }

    /// Get the process record left by a step that started a daemon
    pub async fn process(&self, step: &str) -> Result<ProcessRecord, StepError> {
        match self.output(step).await {
            Some(StepOutput::Process(record)) => Ok(record),
            Some(other) => Err(StepError::MissingParameter(format!(
                "step '{}' produced {:?}, not a process",
                step, other
            ))),
            None => Err(StepError::MissingParameter(format!(
                "no output from step '{}'",
                step
            ))),
        }
    }

    pub async fn set_store(&self, store: Arc<dyn CoordinationStore>) {
        *self.store.lock().await = Some(store);
    }

    /// The connected coordination client
    pub async fn store(&self) -> Result<Arc<dyn CoordinationStore>, StepError> {
        self.store
            .lock()
            .await
            .clone()
            .ok_or_else(|| StepError::MissingParameter("coordination client".to_string()))
    }
}
