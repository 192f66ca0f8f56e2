//! Shutdown: stop background work, then kill every recorded daemon

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::execution::tasks::TaskSet;
use crate::process::control::ProcessControl;
use crate::process::registry::ProcessRegistry;
use crate::process::ProcessError;

/// How long cancelled background tasks get to wind down
const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Cancel all background tasks, then kill each registered PID once.
///
/// PIDs whose process is already gone are skipped quietly. Returns the number
/// of processes actually killed; a second call returns 0.
pub async fn reap(registry: &ProcessRegistry, control: &dyn ProcessControl, tasks: &TaskSet) -> usize {
    debug!(tasks = ?tasks.names(), "cancelling background tasks");
    tasks.cancel_all();
    let aborted = tasks.join(TASK_JOIN_TIMEOUT).await;
    if aborted > 0 {
        warn!("{} background tasks had to be aborted", aborted);
    }

    let mut killed = 0;
    for record in registry.drain().await {
        match control.kill(record.pid) {
            Ok(()) => {
                info!(pid = record.pid, "killed {}", record.label);
                killed += 1;
            }
            Err(ProcessError::NotRunning(_)) => {
                debug!(pid = record.pid, "{} already gone", record.label);
            }
            Err(err) => {
                warn!(pid = record.pid, "failed to kill {}: {}", record.label, err);
            }
        }
    }

    info!("{} processes killed", killed);
    killed
}
