//! Daemon steps for the `@steady` route: confd, docker, image builds, sshd

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::{PipelineContext, StepAction, StepError, StepOutcome, StepOutput};
use crate::execution::retry::{retry, RetryPolicy};
use crate::process::{build_all, CommandRunner, CommandSpec, ImageBuilder, Supervisor};

/// Pause between `docker info` probes
const DOCKER_POLL_INTERVAL: Duration = Duration::from_secs(1);

fn supervisor(ctx: &PipelineContext, grace: Duration) -> Supervisor {
    Supervisor::new(ctx.registry().clone(), ctx.tasks().clone()).with_launch_grace(grace)
}

/// Render the confd templates once, retrying until they build
pub struct RenderTemplates {
    runner: Arc<dyn CommandRunner>,
}

impl RenderTemplates {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl StepAction for RenderTemplates {
    async fn run(&self, ctx: &PipelineContext) -> Result<StepOutcome, StepError> {
        let config = ctx.config();
        let confd = &config.options.confd;
        let node = config.etcd_node();
        let spec = CommandSpec::new(confd.program.as_str())
            .args(["-onetime", "-node", node.as_str(), "-log-level", "error"])
            .envs(&config.env);

        info!("building confd templates, this may take a moment");
        let policy = RetryPolicy::attempts(confd.attempts, Duration::from_secs(confd.sleep_secs));
        let runner = &self.runner;
        let spec = &spec;
        let output = retry("confd templates", &policy, move |_| async move {
            runner.run(spec).await
        })
        .await?;

        debug!("{}", output.combined.trim());
        info!("templates generated for {}", node);
        Ok(StepOutcome::done())
    }
}

/// Keep confd running in the background
pub struct StartConfd {
    grace: Duration,
}

impl StartConfd {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }
}

#[async_trait]
impl StepAction for StartConfd {
    async fn run(&self, ctx: &PipelineContext) -> Result<StepOutcome, StepError> {
        let config = ctx.config();
        let confd = &config.options.confd;
        let interval = confd.interval_secs.to_string();
        let spec = CommandSpec::new(confd.program.as_str())
            .args(["-log-level", "error", "-node"])
            .arg(config.etcd_node())
            .args(["-interval", interval.as_str()])
            .envs(&config.env);

        let handle = supervisor(ctx, self.grace).start("confd", &spec).await?;
        Ok(StepOutcome::Output(StepOutput::Process(handle.record().clone())))
    }
}

/// Remove a docker socket left behind by a previous run
pub struct CleanupDockerSocket;

#[async_trait]
impl StepAction for CleanupDockerSocket {
    async fn run(&self, ctx: &PipelineContext) -> Result<StepOutcome, StepError> {
        let socket = &ctx.config().options.docker.socket;
        match tokio::fs::remove_file(socket).await {
            Ok(()) => {
                info!("removed stale docker socket {}", socket);
                Ok(StepOutcome::Output(StepOutput::Flag(true)))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no docker socket at {}", socket);
                Ok(StepOutcome::Output(StepOutput::Flag(false)))
            }
            Err(err) => Err(StepError::Recoverable(format!(
                "could not remove {}: {}",
                socket, err
            ))),
        }
    }
}

/// Start the docker daemon
pub struct StartDocker {
    runner: Arc<dyn CommandRunner>,
    grace: Duration,
}

impl StartDocker {
    pub fn new(runner: Arc<dyn CommandRunner>, grace: Duration) -> Self {
        Self { runner, grace }
    }

    /// True when `/` sits on an overlay filesystem
    async fn root_is_overlay(&self, env: &[(String, String)]) -> bool {
        let findmnt = CommandSpec::new("findmnt")
            .args(["--noheadings", "--output", "FSTYPE", "--target", "/"])
            .envs(env);
        match self.runner.run(&findmnt).await {
            Ok(output) => output.combined.trim() == "overlay",
            Err(err) => {
                debug!("could not detect the root filesystem: {}", err);
                false
            }
        }
    }
}

#[async_trait]
impl StepAction for StartDocker {
    async fn run(&self, ctx: &PipelineContext) -> Result<StepOutcome, StepError> {
        let config = ctx.config();
        let docker = &config.options.docker;

        let mut spec = CommandSpec::new(docker.program.as_str())
            .arg("-d")
            .arg(format!("--bip={}", docker.bridge_ip));
        for registry in &docker.insecure_registries {
            spec = spec.args(["--insecure-registry", registry.as_str()]);
        }
        if self.root_is_overlay(&config.env).await {
            info!("root filesystem is overlay, using the overlay storage driver");
            spec = spec.arg("--storage-driver=overlay");
        }
        let spec = spec.envs(&config.env);

        let handle = supervisor(ctx, self.grace).start("docker", &spec).await?;
        Ok(StepOutcome::Output(StepOutput::Process(handle.record().clone())))
    }
}

/// Block until `docker info` succeeds or the deadline passes
pub struct WaitForDocker {
    runner: Arc<dyn CommandRunner>,
}

impl WaitForDocker {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl StepAction for WaitForDocker {
    async fn run(&self, ctx: &PipelineContext) -> Result<StepOutcome, StepError> {
        let config = ctx.config();
        let docker = &config.options.docker;
        let spec = CommandSpec::new(docker.program.as_str())
            .arg("info")
            .envs(&config.env);

        let policy = RetryPolicy::deadline(
            Duration::from_secs(docker.ready_timeout_secs),
            DOCKER_POLL_INTERVAL,
        );
        let runner = &self.runner;
        let spec = &spec;
        retry("docker", &policy, move |_| async move { runner.run(spec).await }).await?;

        info!("docker is running");
        Ok(StepOutcome::done())
    }
}

/// Build the configured images in parallel. Failed builds are reported,
/// never fatal.
pub struct BuildImages {
    images: Arc<dyn ImageBuilder>,
}

impl BuildImages {
    pub fn new(images: Arc<dyn ImageBuilder>) -> Self {
        Self { images }
    }
}

#[async_trait]
impl StepAction for BuildImages {
    async fn run(&self, ctx: &PipelineContext) -> Result<StepOutcome, StepError> {
        let report = build_all(self.images.clone(), &ctx.config().options.images).await;
        Ok(StepOutcome::Output(StepOutput::Builds(report)))
    }
}

/// Start sshd; its PID anchors the heartbeat
pub struct StartSshd {
    grace: Duration,
}

impl StartSshd {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }
}

#[async_trait]
impl StepAction for StartSshd {
    async fn run(&self, ctx: &PipelineContext) -> Result<StepOutcome, StepError> {
        let config = ctx.config();
        let ssh = &config.options.ssh;
        let spec = CommandSpec::new(ssh.sshd_program.as_str())
            .args(ssh.sshd_args.iter().map(String::as_str))
            .envs(&config.env);

        let handle = supervisor(ctx, self.grace).start("sshd", &spec).await?;
        Ok(StepOutcome::Output(StepOutput::Process(handle.record().clone())))
    }
}
