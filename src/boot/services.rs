//! Long-lived background work started at the end of a boot

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::coordination::heartbeat::{Heartbeat, HeartbeatConfig};
use crate::coordination::watch::spawn_watch_loop;
use crate::core::{PipelineContext, StepAction, StepError, StepOutcome, StepOutput};
use crate::process::{reap, CommandRunner, CommandSpec, ProcessControl};

/// Publish host and port for as long as the daemon started by another step
/// stays alive
pub struct PublishHeartbeat {
    process_step: String,
    control: Arc<dyn ProcessControl>,
}

impl PublishHeartbeat {
    pub fn new(process_step: impl Into<String>, control: Arc<dyn ProcessControl>) -> Self {
        Self {
            process_step: process_step.into(),
            control,
        }
    }
}

#[async_trait]
impl StepAction for PublishHeartbeat {
    async fn run(&self, ctx: &PipelineContext) -> Result<StepOutcome, StepError> {
        let record = ctx.process(&self.process_step).await?;
        let store = ctx.store().await?;
        let config = ctx.config();

        let heartbeat = HeartbeatConfig::new(
            config.etcd_path.as_str(),
            config.host.as_str(),
            config.external_port.as_str(),
            config.etcd_ttl,
            record.pid,
        )
        .with_interval(config.heartbeat_interval());

        let task = Heartbeat::new(heartbeat)
            .publish(store, self.control.clone(), ctx.tasks())
            .await?;
        Ok(StepOutcome::Output(StepOutput::Flag(task.is_some())))
    }

    fn requires(&self) -> Vec<String> {
        vec![self.process_step.clone()]
    }
}

/// Run the reconcile command whenever the watched path changes
pub struct WatchServices {
    runner: Arc<dyn CommandRunner>,
}

impl WatchServices {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl StepAction for WatchServices {
    async fn run(&self, ctx: &PipelineContext) -> Result<StepOutcome, StepError> {
        let store = ctx.store().await?;
        let config = ctx.config();
        let reconcile = CommandSpec::from_argv(&config.options.reconcile_command)
            .ok_or_else(|| StepError::MissingParameter("reconcile command".to_string()))?
            .envs(&config.env);

        let task = spawn_watch_loop(
            store,
            config.options.watch_path.as_str(),
            reconcile,
            self.runner.clone(),
            ctx.tasks(),
        );
        Ok(StepOutcome::Output(StepOutput::Text(task)))
    }
}

/// Wait for the shutdown signal, then kill every daemon this boot started
pub struct KillOnExit {
    control: Arc<dyn ProcessControl>,
}

impl KillOnExit {
    pub fn new(control: Arc<dyn ProcessControl>) -> Self {
        Self { control }
    }
}

#[async_trait]
impl StepAction for KillOnExit {
    async fn run(&self, ctx: &PipelineContext) -> Result<StepOutcome, StepError> {
        info!("builder is running, waiting for a shutdown signal");
        ctx.shutdown().cancelled().await;

        info!("shutting down");
        let killed = reap(ctx.registry(), self.control.as_ref(), ctx.tasks()).await;
        Ok(StepOutcome::Output(StepOutput::Count(killed)))
    }
}
