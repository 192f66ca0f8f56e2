//! Parallel image builds

use crate::helpers::*;
use builder_boot::boot::BuildImages;
use builder_boot::core::{BootOptions, PipelineContext, StepAction, StepOutcome, StepOutput};
use builder_boot::process::{build_all, BuildSpec};

fn specs() -> Vec<BuildSpec> {
    vec![
        BuildSpec::new("/usr/local/src/slugbuilder/", "deis/slugbuilder"),
        BuildSpec::new("/usr/local/src/slugrunner/", "deis/slugrunner"),
        BuildSpec::new("/usr/local/src/dockerbuilder/", "deis/dockerbuilder"),
    ]
}

#[tokio::test]
async fn test_group_completes_despite_one_failure() {
    let builder = FakeImageBuilder::failing(&["deis/slugrunner"]);

    let report = build_all(builder.clone(), &specs()).await;

    assert_eq!(report.completed(), 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(builder.built.lock().unwrap().len(), 3);

    let tags: Vec<_> = report.results.iter().map(|r| r.spec.image_tag.as_str()).collect();
    assert_eq!(tags, ["deis/slugbuilder", "deis/slugrunner", "deis/dockerbuilder"]);
    assert!(!report.results[1].succeeded());
}

#[tokio::test]
async fn test_build_step_reports_instead_of_failing() {
    let mut options = BootOptions::default();
    options.images = specs();
    let ctx = PipelineContext::new(config_with(options, &[]));

    let outcome = BuildImages::new(FakeImageBuilder::failing(&["deis/slugbuilder", "deis/slugrunner"]))
        .run(&ctx)
        .await
        .unwrap();

    match outcome {
        StepOutcome::Output(StepOutput::Builds(report)) => {
            assert_eq!(report.succeeded(), 1);
            assert_eq!(report.failed(), 2);
        }
        other => panic!("expected a build report, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_group() {
    let report = build_all(FakeImageBuilder::failing(&[]), &[]).await;
    assert_eq!(report.completed(), 0);
}
