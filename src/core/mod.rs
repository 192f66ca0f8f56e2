//! Core domain models for the boot pipeline
//!
//! This module defines configuration, the shared context, steps, routes
//! and their execution state.

pub mod config;
pub mod context;
pub mod env;
pub mod pipeline;
pub mod state;
pub mod step;

pub use config::{BootConfig, BootOptions};
pub use context::PipelineContext;
pub use pipeline::*;
pub use state::*;
pub use step::*;
