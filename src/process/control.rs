//! Liveness checks and termination by PID

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::debug;

use crate::process::ProcessError;

/// Signal-level access to processes by PID
pub trait ProcessControl: Send + Sync {
    /// Best-effort check that `pid` still exists
    fn is_alive(&self, pid: u32) -> bool;

    /// Forcefully terminate `pid`. A process that is already gone yields
    /// [`ProcessError::NotRunning`].
    fn kill(&self, pid: u32) -> Result<(), ProcessError>;
}

/// Real process control through `kill(2)`
#[derive(Debug, Clone, Copy, Default)]
pub struct OsProcessControl;

fn to_pid(pid: u32) -> Option<Pid> {
    // 0 and negative values address process groups, never a single process
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Some(Pid::from_raw(raw)),
        _ => None,
    }
}

impl ProcessControl for OsProcessControl {
    fn is_alive(&self, pid: u32) -> bool {
        let Some(target) = to_pid(pid) else {
            return false;
        };
        match kill(target, None) {
            Ok(()) => true,
            // Exists but belongs to someone else
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    fn kill(&self, pid: u32) -> Result<(), ProcessError> {
        let target = to_pid(pid).ok_or(ProcessError::NotRunning(pid))?;
        match kill(target, Signal::SIGKILL) {
            Ok(()) => {
                debug!(pid, "sent SIGKILL");
                Ok(())
            }
            Err(Errno::ESRCH) => Err(ProcessError::NotRunning(pid)),
            Err(errno) => Err(ProcessError::Signal { pid, errno }),
        }
    }
}
