//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::execution::phase::BootPhase;

/// Overall pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Pipeline has not started
    Pending,
    /// Pipeline is currently running
    Running,
    /// Every route ran to the end
    Completed,
    /// A step failed fatally or routing broke
    Failed,
}

/// State of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    /// Step has not run yet
    Pending,
    /// Step is currently running
    Running { started_at: DateTime<Utc> },
    /// Step finished. `recovered` holds the error message when a recoverable
    /// failure was tolerated.
    Completed {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        recovered: Option<String>,
    },
    /// Step failed fatally
    Failed {
        error: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Step was abandoned by a reroute
    Skipped { reason: String },
}

impl StepState {
    /// Check if step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Completed { .. } | StepState::Failed { .. } | StepState::Skipped { .. }
        )
    }
}

/// Overall pipeline state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Current execution status
    pub status: ExecutionStatus,

    /// Phase of the route currently executing
    pub phase: Option<BootPhase>,

    /// Routes entered so far, in order
    pub visited_routes: Vec<String>,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution completed/failed
    pub completed_at: Option<DateTime<Utc>>,

    pub total_steps: usize,
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub skipped_steps: usize,
}

impl PipelineState {
    /// Create a new pipeline state
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            phase: None,
            visited_routes: Vec::new(),
            started_at: None,
            completed_at: None,
            total_steps: 0,
            completed_steps: 0,
            failed_steps: 0,
            skipped_steps: 0,
        }
    }

    /// Mark pipeline as started
    pub fn start(&mut self, total_steps: usize) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_steps = total_steps;
    }

    /// Mark pipeline as completed
    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark pipeline as failed
    pub fn fail(&mut self) {
        self.status = ExecutionStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    /// Record entry into a route
    pub fn enter(&mut self, route: &str, phase: BootPhase) {
        self.visited_routes.push(route.to_string());
        self.phase = Some(phase);
    }

    pub fn update_counts(&mut self, completed: usize, failed: usize, skipped: usize) {
        self.completed_steps = completed;
        self.failed_steps = failed;
        self.skipped_steps = skipped;
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_state_is_terminal() {
        assert!(!StepState::Pending.is_terminal());
        assert!(!StepState::Running {
            started_at: Utc::now()
        }
        .is_terminal());
        assert!(StepState::Completed {
            started_at: Utc::now(),
            completed_at: Utc::now(),
            recovered: None,
        }
        .is_terminal());
        assert!(StepState::Failed {
            error: "test".to_string(),
            started_at: Utc::now(),
            failed_at: Utc::now()
        }
        .is_terminal());
        assert!(StepState::Skipped {
            reason: "rerouted".to_string()
        }
        .is_terminal());
    }

    #[test]
    fn test_pipeline_state_lifecycle() {
        let mut state = PipelineState::new();
        assert_eq!(state.status, ExecutionStatus::Pending);

        state.start(4);
        state.enter("boot", BootPhase::InspectCluster);
        assert_eq!(state.status, ExecutionStatus::Running);
        assert_eq!(state.phase, Some(BootPhase::InspectCluster));

        state.update_counts(3, 1, 0);
        state.fail();
        assert_eq!(state.status, ExecutionStatus::Failed);
        assert!(state.completed_at.is_some());
        assert_eq!(state.visited_routes, vec!["boot".to_string()]);
    }
}
