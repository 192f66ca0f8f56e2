//! Process supervision: one-shot commands, long-running daemons, image
//! builds and shutdown

pub mod build;
pub mod command;
pub mod control;
pub mod reaper;
pub mod registry;
pub mod supervisor;

use thiserror::Error;

pub use build::{build_all, BuildReport, BuildResult, BuildSpec, DockerCli, ImageBuilder};
pub use command::{CommandError, CommandOutput, CommandRunner, CommandSpec, Subprocess};
pub use control::{OsProcessControl, ProcessControl};
pub use reaper::reap;
pub use registry::{ProcessRecord, ProcessRegistry};
pub use supervisor::{ExitOutcome, ProcessHandle, Supervisor};

/// Error types for daemon operations
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{label} exited during startup with {status}")]
    ExitedOnLaunch { label: String, status: String },

    #[error("{label} exited with {status}")]
    Exited { label: String, status: String },

    #[error("{0} started without a pid")]
    NoPid(String),

    #[error("process {0} is not running")]
    NotRunning(u32),

    #[error("failed to signal process {pid}: {errno}")]
    Signal { pid: u32, errno: nix::errno::Errno },

    #[error("failed waiting for {label}: {message}")]
    Wait { label: String, message: String },
}
