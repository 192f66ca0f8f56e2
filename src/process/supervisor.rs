//! Starting long-running daemons and watching them die

use std::process::Stdio;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::execution::tasks::TaskSet;
use crate::process::command::CommandSpec;
use crate::process::registry::{ProcessRecord, ProcessRegistry};
use crate::process::ProcessError;

/// Default window in which an immediate crash counts as a failed start.
pub const DEFAULT_LAUNCH_GRACE: Duration = Duration::from_millis(250);

/// Last known state of a supervised daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    Running,
    Exited { success: bool, status: String },
    /// The exit status could not be collected
    Lost(String),
}

/// Handle to a started daemon
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    record: ProcessRecord,
    status: watch::Receiver<ExitOutcome>,
}

impl ProcessHandle {
    pub fn record(&self) -> &ProcessRecord {
        &self.record
    }

    pub fn pid(&self) -> u32 {
        self.record.pid
    }

    /// Current state without waiting
    pub fn status(&self) -> ExitOutcome {
        self.status.borrow().clone()
    }

    /// Block until the daemon exits. A non-zero exit is an error.
    pub async fn wait(&mut self) -> Result<(), ProcessError> {
        let outcome = self
            .status
            .wait_for(|s| !matches!(s, ExitOutcome::Running))
            .await
            .map(|s| s.clone())
            .map_err(|_| ProcessError::Wait {
                label: self.record.label.clone(),
                message: "exit watcher stopped".to_string(),
            })?;

        match outcome {
            ExitOutcome::Exited { success: true, .. } => Ok(()),
            ExitOutcome::Exited { status, .. } => Err(ProcessError::Exited {
                label: self.record.label.clone(),
                status,
            }),
            ExitOutcome::Lost(message) => Err(ProcessError::Wait {
                label: self.record.label.clone(),
                message,
            }),
            ExitOutcome::Running => Ok(()),
        }
    }
}

/// Starts daemons, records their PIDs and watches for unexpected exits.
///
/// Exits are logged, never restarted and never abort the boot.
#[derive(Clone)]
pub struct Supervisor {
    registry: ProcessRegistry,
    tasks: TaskSet,
    launch_grace: Duration,
}

impl Supervisor {
    pub fn new(registry: ProcessRegistry, tasks: TaskSet) -> Self {
        Self {
            registry,
            tasks,
            launch_grace: DEFAULT_LAUNCH_GRACE,
        }
    }

    pub fn with_launch_grace(mut self, grace: Duration) -> Self {
        self.launch_grace = grace;
        self
    }

    /// Start `spec` as the daemon `label`
    pub async fn start(&self, label: &str, spec: &CommandSpec) -> Result<ProcessHandle, ProcessError> {
        info!("starting {}: {}", label, spec);

        let mut command = spec.command();
        command.stdin(Stdio::null());
        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        let pid = child
            .id()
            .ok_or_else(|| ProcessError::NoPid(label.to_string()))?;

        let early_exit = match tokio::time::timeout(self.launch_grace, child.wait()).await {
            Ok(Ok(status)) if !status.success() => {
                return Err(ProcessError::ExitedOnLaunch {
                    label: label.to_string(),
                    status: status.to_string(),
                });
            }
            Ok(Ok(status)) => Some(status),
            Ok(Err(err)) => {
                return Err(ProcessError::Wait {
                    label: label.to_string(),
                    message: err.to_string(),
                });
            }
            Err(_) => None,
        };

        let record = ProcessRecord::new(label, pid);
        self.registry.register(record.clone()).await;
        debug!(pid, "{} registered", label);

        let initial = match early_exit {
            Some(status) => ExitOutcome::Exited {
                success: status.success(),
                status: status.to_string(),
            },
            None => ExitOutcome::Running,
        };
        let (tx, rx) = watch::channel(initial);

        if early_exit.is_none() {
            let label = label.to_string();
            self.tasks.spawn(format!("{}-exit-watcher", label), move |token| async move {
                tokio::select! {
                    status = child.wait() => {
                        let outcome = match status {
                            Ok(status) if status.success() => {
                                info!(pid, "{} exited", label);
                                ExitOutcome::Exited { success: true, status: status.to_string() }
                            }
                            Ok(status) => {
                                warn!(pid, "{} exited unexpectedly with {}", label, status);
                                ExitOutcome::Exited { success: false, status: status.to_string() }
                            }
                            Err(err) => {
                                error!(pid, "lost track of {}: {}", label, err);
                                ExitOutcome::Lost(err.to_string())
                            }
                        };
                        let _ = tx.send(outcome);
                    }
                    _ = token.cancelled() => {
                        debug!(pid, "stopped watching {}", label);
                    }
                }
            });
        }

        Ok(ProcessHandle { record, status: rx })
    }
}
