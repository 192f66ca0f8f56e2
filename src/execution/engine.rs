//! Main execution engine - runs routes of steps over a shared context

use crate::core::{
    ExecutionStatus, Pipeline, PipelineContext, StepError, StepOutcome, StepOutput, StepState,
};
use crate::execution::phase::BootPhase;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
    },
    RouteEntered {
        route: String,
        phase: BootPhase,
    },
    StepStarted {
        step: String,
    },
    StepCompleted {
        step: String,
        output: StepOutput,
    },
    /// A recoverable error was tolerated
    StepRecovered {
        step: String,
        error: String,
    },
    StepFailed {
        step: String,
        error: String,
    },
    Rerouted {
        from_step: String,
        to_route: String,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: StepError,
    },

    #[error("unknown route '{0}'")]
    UnknownRoute(String),

    #[error("route '{route}' cannot follow phase {from} (it belongs to {to})")]
    IllegalTransition {
        from: BootPhase,
        to: BootPhase,
        route: String,
    },

    #[error("route '{0}' was already executed")]
    RouteRevisited(String),
}

enum RouteEnd {
    Finished,
    Rerouted(String),
}

/// Runs a [`Pipeline`] route by route
pub struct ExecutionEngine {
    event_handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionEngine {
    pub fn new() -> Self {
        Self {
            event_handlers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.lock().await.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    async fn emit_event(&self, event: ExecutionEvent) {
        let handlers = self.event_handlers.lock().await;
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    /// Execute the pipeline from its entry route.
    ///
    /// Steps run strictly in order. A fatal step error halts execution; a
    /// recoverable one is logged and the step is recorded as done.
    pub async fn execute(
        &self,
        pipeline: &mut Pipeline,
        ctx: &PipelineContext,
    ) -> Result<(), EngineError> {
        let execution_id = pipeline.state.execution_id;
        info!("Starting pipeline execution: {} ({})", pipeline.name, execution_id);
        self.emit_event(ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name: pipeline.name.clone(),
        })
        .await;

        pipeline.state.start(pipeline.step_count());
        let result = self.run_routes(pipeline, ctx).await;
        self.update_state_counts(pipeline);

        let status = match &result {
            Ok(()) => {
                pipeline.state.complete();
                ExecutionStatus::Completed
            }
            Err(err) => {
                error!("Pipeline {} failed: {}", pipeline.name, err);
                pipeline.state.fail();
                ExecutionStatus::Failed
            }
        };

        info!("Pipeline execution finished: {} - {:?}", pipeline.name, status);
        self.emit_event(ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        })
        .await;

        result
    }

    async fn run_routes(
        &self,
        pipeline: &mut Pipeline,
        ctx: &PipelineContext,
    ) -> Result<(), EngineError> {
        let mut route_name = pipeline.entry().to_string();

        loop {
            let (phase, next) = match pipeline.route(&route_name) {
                Some(route) => (route.phase, route.next.clone()),
                None => return Err(EngineError::UnknownRoute(route_name)),
            };

            if let Some(from) = pipeline.state.phase {
                if !from.can_transition_to(phase) {
                    return Err(EngineError::IllegalTransition {
                        from,
                        to: phase,
                        route: route_name,
                    });
                }
            }
            if pipeline.state.visited_routes.contains(&route_name) {
                return Err(EngineError::RouteRevisited(route_name));
            }

            info!(route = %route_name, phase = %phase, "entering route");
            pipeline.state.enter(&route_name, phase);
            self.emit_event(ExecutionEvent::RouteEntered {
                route: route_name.clone(),
                phase,
            })
            .await;

            match self.run_route(pipeline, &route_name, ctx).await? {
                RouteEnd::Rerouted(target) => route_name = target,
                RouteEnd::Finished => match next {
                    Some(next) => route_name = next,
                    None => return Ok(()),
                },
            }
        }
    }

    async fn run_route(
        &self,
        pipeline: &mut Pipeline,
        route_name: &str,
        ctx: &PipelineContext,
    ) -> Result<RouteEnd, EngineError> {
        let step_count = pipeline.route(route_name).map(|r| r.steps.len()).unwrap_or(0);

        for index in 0..step_count {
            let (name, action) = match pipeline.route(route_name) {
                Some(route) => (route.steps[index].name.clone(), route.steps[index].action.clone()),
                None => return Err(EngineError::UnknownRoute(route_name.to_string())),
            };

            let started_at = Utc::now();
            self.set_step_state(pipeline, route_name, index, StepState::Running { started_at });
            self.emit_event(ExecutionEvent::StepStarted { step: name.clone() }).await;

            match action.run(ctx).await {
                Ok(StepOutcome::Output(output)) => {
                    ctx.set_output(&name, output.clone()).await;
                    self.set_step_state(
                        pipeline,
                        route_name,
                        index,
                        StepState::Completed {
                            started_at,
                            completed_at: Utc::now(),
                            recovered: None,
                        },
                    );
                    self.emit_event(ExecutionEvent::StepCompleted { step: name, output }).await;
                }
                Ok(StepOutcome::Reroute(target)) => {
                    info!(step = %name, "rerouting to {}", target);
                    ctx.set_output(&name, StepOutput::Text(target.clone())).await;
                    self.set_step_state(
                        pipeline,
                        route_name,
                        index,
                        StepState::Completed {
                            started_at,
                            completed_at: Utc::now(),
                            recovered: None,
                        },
                    );
                    for skipped in index + 1..step_count {
                        self.set_step_state(
                            pipeline,
                            route_name,
                            skipped,
                            StepState::Skipped {
                                reason: format!("rerouted to {}", target),
                            },
                        );
                    }
                    self.emit_event(ExecutionEvent::Rerouted {
                        from_step: name,
                        to_route: target.clone(),
                    })
                    .await;
                    return Ok(RouteEnd::Rerouted(target));
                }
                Err(err) if err.is_recoverable() => {
                    warn!(step = %name, "recovered from error: {}", err);
                    ctx.set_output(&name, StepOutput::Done).await;
                    self.set_step_state(
                        pipeline,
                        route_name,
                        index,
                        StepState::Completed {
                            started_at,
                            completed_at: Utc::now(),
                            recovered: Some(err.to_string()),
                        },
                    );
                    self.emit_event(ExecutionEvent::StepRecovered {
                        step: name,
                        error: err.to_string(),
                    })
                    .await;
                }
                Err(err) => {
                    error!(step = %name, "step failed: {}", err);
                    self.set_step_state(
                        pipeline,
                        route_name,
                        index,
                        StepState::Failed {
                            error: err.to_string(),
                            started_at,
                            failed_at: Utc::now(),
                        },
                    );
                    self.emit_event(ExecutionEvent::StepFailed {
                        step: name.clone(),
                        error: err.to_string(),
                    })
                    .await;
                    return Err(EngineError::StepFailed {
                        step: name,
                        source: err,
                    });
                }
            }
        }

        Ok(RouteEnd::Finished)
    }

    fn set_step_state(&self, pipeline: &mut Pipeline, route: &str, index: usize, state: StepState) {
        if let Some(step) = pipeline.route_mut(route).and_then(|r| r.steps.get_mut(index)) {
            step.state = state;
        }
    }

    /// Update pipeline state counts
    fn update_state_counts(&self, pipeline: &mut Pipeline) {
        let mut completed = 0;
        let mut failed = 0;
        let mut skipped = 0;

        for step in pipeline.steps() {
            match &step.state {
                StepState::Completed { .. } => completed += 1,
                StepState::Failed { .. } => failed += 1,
                StepState::Skipped { .. } => skipped += 1,
                _ => {}
            }
        }

        pipeline.state.update_counts(completed, failed, skipped);
    }
}
