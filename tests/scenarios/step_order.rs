//! Steps run strictly in order and leave their outputs behind

use crate::helpers::*;
use builder_boot::core::{ExecutionStatus, Pipeline, Route, StepOutput};
use builder_boot::execution::{BootPhase, ExecutionEvent};

#[tokio::test]
async fn test_steps_run_in_declaration_order() {
    let trace = trace();
    let mut pipeline = Pipeline::builder("ordered")
        .route(
            Route::new("boot", BootPhase::InspectCluster)
                .step("a", Recorded::ok("a", &trace))
                .step("b", Recorded::with("b", &trace, count(3)))
                .step("c", Recorded::ok("c", &trace)),
        )
        .build()
        .unwrap();
    let ctx = context();

    let (result, events) = run_collecting(&mut pipeline, &ctx).await;

    result.unwrap();
    assert_trace(&trace, &["a", "b", "c"]);
    assert_eq!(ctx.output("b").await, Some(StepOutput::Count(3)));
    assert_eq!(ctx.output("c").await, Some(StepOutput::Done));
    assert_eq!(pipeline.state.status, ExecutionStatus::Completed);
    assert_eq!(pipeline.state.completed_steps, 3);

    assert!(matches!(events.first(), Some(ExecutionEvent::PipelineStarted { .. })));
    assert!(matches!(
        events.last(),
        Some(ExecutionEvent::PipelineCompleted {
            status: ExecutionStatus::Completed,
            ..
        })
    ));
    let started: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::StepStarted { step } => Some(step.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(started, ["a", "b", "c"]);
}

#[tokio::test]
async fn test_routes_chain_through_next() {
    let trace = trace();
    let mut pipeline = Pipeline::builder("chained")
        .route(
            Route::new("first", BootPhase::JoinExisting)
                .step("one", Recorded::ok("one", &trace))
                .then("second"),
        )
        .route(Route::new("second", BootPhase::SteadyState).step("two", Recorded::ok("two", &trace)))
        .build()
        .unwrap();

    let (result, _) = run_collecting(&mut pipeline, &context()).await;

    result.unwrap();
    assert_trace(&trace, &["one", "two"]);
    assert_eq!(pipeline.state.visited_routes, ["first", "second"]);
    assert_eq!(pipeline.state.phase, Some(BootPhase::SteadyState));
}
