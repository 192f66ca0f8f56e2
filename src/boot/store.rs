//! Store bootstrap steps for the `boot` route

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::boot::StoreConnector;
use crate::coordination::bootstrap::{create_directories, wait_until_ready};
use crate::coordination::join_path;
use crate::core::{PipelineContext, StepAction, StepError, StepOutcome, StepOutput};
use crate::execution::retry::RetryPolicy;

/// Key whose presence means a cluster already holds host keys
pub const HOST_KEY: &str = "sshHostKey";

/// Build the store client and put it in the context
pub struct ConnectStore {
    connector: Arc<dyn StoreConnector>,
}

impl ConnectStore {
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl StepAction for ConnectStore {
    async fn run(&self, ctx: &PipelineContext) -> Result<StepOutcome, StepError> {
        let config = ctx.config();
        let store = self.connector.connect(config).await?;
        ctx.set_store(store).await;
        info!("using coordination store at {}", config.etcd_url);
        Ok(StepOutcome::Output(StepOutput::Text(config.etcd_url.clone())))
    }
}

/// Poll the store until it answers
pub struct WaitForStore {
    policy: RetryPolicy,
}

impl WaitForStore {
    pub fn new(attempts: usize, sleep: Duration) -> Self {
        Self {
            policy: RetryPolicy::attempts(attempts, sleep),
        }
    }
}

#[async_trait]
impl StepAction for WaitForStore {
    async fn run(&self, ctx: &PipelineContext) -> Result<StepOutcome, StepError> {
        let store = ctx.store().await?;
        wait_until_ready(store.as_ref(), &self.policy).await?;
        Ok(StepOutcome::done())
    }
}

/// Create the configured well-known directories
pub struct MakeDirectories;

#[async_trait]
impl StepAction for MakeDirectories {
    async fn run(&self, ctx: &PipelineContext) -> Result<StepOutcome, StepError> {
        let store = ctx.store().await?;
        let created = create_directories(store.as_ref(), &ctx.config().directories).await?;
        Ok(StepOutcome::Output(StepOutput::Count(created)))
    }
}

/// Decide whether this node joins an existing cluster or forms a new one
pub struct InspectCluster {
    join: String,
    form: String,
}

impl InspectCluster {
    pub fn new(join: impl Into<String>, form: impl Into<String>) -> Self {
        Self {
            join: join.into(),
            form: form.into(),
        }
    }
}

#[async_trait]
impl StepAction for InspectCluster {
    async fn run(&self, ctx: &PipelineContext) -> Result<StepOutcome, StepError> {
        let store = ctx.store().await?;
        let key = join_path(&ctx.config().etcd_path, HOST_KEY);

        match store.get(&key, false).await {
            Ok(_) => {
                info!("found {}, joining the existing cluster", key);
                Ok(StepOutcome::Reroute(self.join.clone()))
            }
            Err(err) if err.is_not_found() => {
                info!("no {} in the store, forming a new cluster", key);
                Ok(StepOutcome::Reroute(self.form.clone()))
            }
            Err(err) => Err(StepError::fatal(err.to_string())),
        }
    }
}
