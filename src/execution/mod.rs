//! Pipeline execution: engine, phase machine, retry and background tasks

pub mod engine;
pub mod phase;
pub mod retry;
pub mod tasks;

pub use engine::{EngineError, ExecutionEngine, ExecutionEvent};
pub use phase::BootPhase;
pub use retry::{retry, RetryError, RetryPolicy};
pub use tasks::TaskSet;
