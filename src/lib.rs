//! builder-boot - bootstraps a build-service node and keeps it registered

pub mod boot;
pub mod cli;
pub mod coordination;
pub mod core;
pub mod execution;
pub mod process;
pub mod signal;

// Re-export commonly used types
pub use boot::{builder_pipeline, BootDeps, StoreConnector};
pub use coordination::{CoordinationStore, EtcdClient, MemoryStore, StoreError};
pub use crate::core::{BootConfig, BootOptions, ExecutionStatus, Pipeline, PipelineContext, Step, StepState};
pub use execution::{ExecutionEngine, ExecutionEvent};

/// Exit status of a boot that ran to completion
pub const STATUS_OK: u8 = 0;

/// Exit status of a boot that failed on this node
pub const STATUS_LOCAL_ERROR: u8 = 1;
