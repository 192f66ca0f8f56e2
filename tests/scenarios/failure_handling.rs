//! Fatal errors halt the boot, recoverable ones are logged and skipped

use crate::helpers::*;
use builder_boot::core::{ExecutionStatus, Pipeline, Route, StepError, StepOutput, StepState};
use builder_boot::execution::{BootPhase, EngineError, ExecutionEvent};

fn three_steps(trace: &Trace, middle: Result<builder_boot::core::StepOutcome, StepError>) -> Pipeline {
    Pipeline::builder("failing")
        .route(
            Route::new("boot", BootPhase::InspectCluster)
                .step("a", Recorded::ok("a", trace))
                .step("b", Recorded::with("b", trace, middle))
                .step("c", Recorded::ok("c", trace)),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_fatal_error_stops_the_pipeline() {
    let trace = trace();
    let mut pipeline = three_steps(&trace, Err(StepError::fatal("store unreachable")));

    let (result, events) = run_collecting(&mut pipeline, &context()).await;

    match result {
        Err(EngineError::StepFailed { step, source }) => {
            assert_eq!(step, "b");
            assert_eq!(source, StepError::fatal("store unreachable"));
        }
        other => panic!("expected step failure, got {:?}", other),
    }
    assert_trace(&trace, &["a", "b"]);
    assert!(matches!(step_state(&pipeline, "b"), StepState::Failed { .. }));
    assert!(matches!(step_state(&pipeline, "c"), StepState::Pending));
    assert_eq!(pipeline.state.status, ExecutionStatus::Failed);
    assert!(events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::StepFailed { step, .. } if step == "b")));
}

#[tokio::test]
async fn test_missing_parameter_is_fatal() {
    let trace = trace();
    let mut pipeline = three_steps(
        &trace,
        Err(StepError::MissingParameter("coordination client".to_string())),
    );

    let (result, _) = run_collecting(&mut pipeline, &context()).await;

    assert!(result.is_err());
    assert_trace(&trace, &["a", "b"]);
}

#[tokio::test]
async fn test_recoverable_error_continues() {
    let trace = trace();
    let mut pipeline = three_steps(
        &trace,
        Err(StepError::Recoverable("/deis/services already exists".to_string())),
    );
    let ctx = context();

    let (result, events) = run_collecting(&mut pipeline, &ctx).await;

    result.unwrap();
    assert_trace(&trace, &["a", "b", "c"]);
    assert_eq!(ctx.output("b").await, Some(StepOutput::Done));
    match step_state(&pipeline, "b") {
        StepState::Completed { recovered, .. } => {
            assert_eq!(recovered.as_deref(), Some("/deis/services already exists"))
        }
        other => panic!("expected completed step, got {:?}", other),
    }
    assert!(events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::StepRecovered { step, .. } if step == "b")));
}
