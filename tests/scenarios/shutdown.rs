//! Shutdown reaping

use crate::helpers::*;
use builder_boot::boot::KillOnExit;
use builder_boot::core::{StepAction, StepOutcome, StepOutput};
use builder_boot::execution::TaskSet;
use builder_boot::process::{reap, ProcessRecord, ProcessRegistry};
use std::time::Duration;

#[tokio::test]
async fn test_reaper_kills_live_and_ignores_dead() {
    let registry = ProcessRegistry::new();
    registry.register(ProcessRecord::new("a", 1001)).await;
    registry.register(ProcessRecord::new("b", 1002)).await;
    let control = FakeControl::new(&[1001]);

    let killed = reap(&registry, control.as_ref(), &TaskSet::new()).await;

    assert_eq!(killed, 1);
    assert_eq!(*control.attempted.lock().unwrap(), vec![1001, 1002]);
    assert_eq!(registry.len().await, 0);
}

#[tokio::test]
async fn test_each_pid_is_reaped_once() {
    let registry = ProcessRegistry::new();
    registry.register(ProcessRecord::new("sshd", 7)).await;
    let control = FakeControl::new(&[7]);
    let tasks = TaskSet::new();

    assert_eq!(reap(&registry, control.as_ref(), &tasks).await, 1);
    assert_eq!(reap(&registry, control.as_ref(), &tasks).await, 0);
    assert_eq!(*control.attempted.lock().unwrap(), vec![7]);
}

#[tokio::test]
async fn test_background_tasks_are_cancelled_before_kills() {
    let registry = ProcessRegistry::new();
    let tasks = TaskSet::new();
    tasks.spawn("watch /deis/services", |token| async move { token.cancelled().await });
    tasks.spawn("heartbeat", |token| async move { token.cancelled().await });

    reap(&registry, FakeControl::new(&[]).as_ref(), &tasks).await;

    assert!(tasks.is_cancelled());
    assert_eq!(tasks.running(), 0);
}

#[tokio::test]
async fn test_kill_on_exit_blocks_until_shutdown() {
    let ctx = context();
    ctx.registry().register(ProcessRecord::new("confd", 11)).await;
    ctx.registry().register(ProcessRecord::new("sshd", 12)).await;
    let control = FakeControl::new(&[11, 12]);

    let step = {
        let ctx = ctx.clone();
        let control = control.clone();
        tokio::spawn(async move { KillOnExit::new(control).run(&ctx).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!step.is_finished());
    assert!(control.attempted.lock().unwrap().is_empty());

    ctx.shutdown().cancel();
    let outcome = step.await.unwrap().unwrap();
    assert_eq!(outcome, StepOutcome::Output(StepOutput::Count(2)));
}
