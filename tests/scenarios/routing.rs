//! Rerouting and the boot phase machine

use crate::helpers::*;
use builder_boot::core::{Pipeline, Route, StepOutcome, StepOutput, StepState};
use builder_boot::execution::{BootPhase, EngineError};

fn reroute(target: &str) -> Result<StepOutcome, builder_boot::core::StepError> {
    Ok(StepOutcome::Reroute(target.to_string()))
}

#[tokio::test]
async fn test_reroute_skips_rest_of_route() {
    let trace = trace();
    let mut pipeline = Pipeline::builder("builder")
        .route(
            Route::new("boot", BootPhase::InspectCluster)
                .step("inspect", Recorded::with("inspect", &trace, reroute("@form")))
                .step("never", Recorded::ok("never", &trace)),
        )
        .route(
            Route::new("@join", BootPhase::JoinExisting)
                .step("fetch", Recorded::ok("fetch", &trace))
                .then("@steady"),
        )
        .route(
            Route::new("@form", BootPhase::FormNew)
                .step("generate", Recorded::ok("generate", &trace))
                .then("@steady"),
        )
        .route(Route::new("@steady", BootPhase::SteadyState).step("sshd", Recorded::ok("sshd", &trace)))
        .build()
        .unwrap();
    let ctx = context();

    let (result, _) = run_collecting(&mut pipeline, &ctx).await;

    result.unwrap();
    assert_trace(&trace, &["inspect", "generate", "sshd"]);
    assert!(matches!(step_state(&pipeline, "never"), StepState::Skipped { .. }));
    assert!(matches!(step_state(&pipeline, "fetch"), StepState::Pending));
    assert_eq!(ctx.output("inspect").await, Some(StepOutput::Text("@form".to_string())));
    assert_eq!(pipeline.state.visited_routes, ["boot", "@form", "@steady"]);
    assert_eq!(pipeline.state.skipped_steps, 1);
}

#[tokio::test]
async fn test_unknown_reroute_target_is_fatal() {
    let trace = trace();
    let mut pipeline = Pipeline::builder("builder")
        .route(Route::new("boot", BootPhase::InspectCluster).step("inspect", Recorded::with("inspect", &trace, reroute("@nowhere"))))
        .build()
        .unwrap();

    let (result, _) = run_collecting(&mut pipeline, &context()).await;

    assert!(matches!(result, Err(EngineError::UnknownRoute(route)) if route == "@nowhere"));
}

#[tokio::test]
async fn test_phase_cannot_go_backwards() {
    let trace = trace();
    let mut pipeline = Pipeline::builder("builder")
        .route(
            Route::new("@steady", BootPhase::SteadyState)
                .step("sshd", Recorded::with("sshd", &trace, reroute("boot"))),
        )
        .route(Route::new("boot", BootPhase::InspectCluster).step("inspect", Recorded::ok("inspect", &trace)))
        .build()
        .unwrap();

    let (result, _) = run_collecting(&mut pipeline, &context()).await;

    assert!(matches!(
        result,
        Err(EngineError::IllegalTransition {
            from: BootPhase::SteadyState,
            to: BootPhase::InspectCluster,
            ..
        })
    ));
    assert_trace(&trace, &["sshd"]);
}

#[tokio::test]
async fn test_route_runs_at_most_once() {
    let trace = trace();
    let mut pipeline = Pipeline::builder("builder")
        .route(
            Route::new("@steady", BootPhase::SteadyState)
                .step("loop", Recorded::with("loop", &trace, reroute("@steady"))),
        )
        .build()
        .unwrap();

    let (result, _) = run_collecting(&mut pipeline, &context()).await;

    assert!(matches!(result, Err(EngineError::RouteRevisited(route)) if route == "@steady"));
    assert_trace(&trace, &["loop"]);
}
