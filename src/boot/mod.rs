//! The builder's boot routes
//!
//! `boot` bootstraps the store and decides whether this node joins an
//! existing cluster (`@join`) or forms a new one (`@form`). Both continue
//! with `@steady`, which starts the daemons, publishes the heartbeat,
//! watches services and finally blocks until shutdown.

pub mod daemons;
pub mod hostkeys;
pub mod services;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::coordination::{ConnectionRetry, CoordinationStore, EtcdClient, StoreError};
use crate::core::{BootConfig, Pipeline, Route};
use crate::execution::phase::BootPhase;
use crate::process::supervisor::DEFAULT_LAUNCH_GRACE;
use crate::process::{CommandRunner, DockerCli, ImageBuilder, OsProcessControl, ProcessControl, Subprocess};

pub use daemons::{
    BuildImages, CleanupDockerSocket, RenderTemplates, StartConfd, StartDocker, StartSshd, WaitForDocker,
};
pub use hostkeys::{FetchHostKeys, GenerateHostKeys};
pub use services::{KillOnExit, PublishHeartbeat, WatchServices};
pub use store::{ConnectStore, InspectCluster, MakeDirectories, WaitForStore};

pub const BOOT_ROUTE: &str = "boot";
pub const JOIN_ROUTE: &str = "@join";
pub const FORM_ROUTE: &str = "@form";
pub const STEADY_ROUTE: &str = "@steady";

/// Opens the coordination store for a boot
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, config: &BootConfig) -> Result<Arc<dyn CoordinationStore>, StoreError>;
}

/// Connects to etcd at `config.etcd_url`
#[derive(Debug, Clone, Copy, Default)]
pub struct EtcdConnector;

#[async_trait]
impl StoreConnector for EtcdConnector {
    async fn connect(&self, config: &BootConfig) -> Result<Arc<dyn CoordinationStore>, StoreError> {
        let retry = ConnectionRetry {
            retries: config.options.store.retries,
            sleep: Duration::from_millis(config.options.store.retry_sleep_ms),
        };
        Ok(Arc::new(EtcdClient::new(&config.etcd_url, retry)?))
    }
}

/// Hands out an already constructed store
pub struct SharedStore(pub Arc<dyn CoordinationStore>);

#[async_trait]
impl StoreConnector for SharedStore {
    async fn connect(&self, _config: &BootConfig) -> Result<Arc<dyn CoordinationStore>, StoreError> {
        Ok(self.0.clone())
    }
}

/// External collaborators the boot steps talk to
#[derive(Clone)]
pub struct BootDeps {
    pub connector: Arc<dyn StoreConnector>,
    pub runner: Arc<dyn CommandRunner>,
    /// Runs the reconcile command; bounded so a hung run cannot stall the watch
    pub reconcile: Arc<dyn CommandRunner>,
    pub control: Arc<dyn ProcessControl>,
    pub images: Arc<dyn ImageBuilder>,
    pub launch_grace: Duration,
}

impl BootDeps {
    /// Real etcd, real subprocesses, real signals
    pub fn system(config: &BootConfig) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(Subprocess::new());
        let images = DockerCli::new(config.options.docker.program.clone(), runner.clone())
            .with_env(config.env.clone());
        let reconcile = Subprocess::with_timeout(Duration::from_secs(
            config.options.reconcile_timeout_secs,
        ));
        Self {
            connector: Arc::new(EtcdConnector),
            runner,
            reconcile: Arc::new(reconcile),
            control: Arc::new(OsProcessControl),
            images: Arc::new(images),
            launch_grace: DEFAULT_LAUNCH_GRACE,
        }
    }
}

/// Assemble the builder's routes
pub fn builder_pipeline(config: &BootConfig, deps: &BootDeps) -> Result<Pipeline> {
    let store = &config.options.store;
    let grace = deps.launch_grace;

    let boot = Route::new(BOOT_ROUTE, BootPhase::InspectCluster)
        .step("store-client", ConnectStore::new(deps.connector.clone()))
        .step(
            "store-ready",
            WaitForStore::new(
                store.ready_attempts,
                Duration::from_millis(store.ready_sleep_ms),
            ),
        )
        .step("directories", MakeDirectories)
        .step("inspect-cluster", InspectCluster::new(JOIN_ROUTE, FORM_ROUTE));

    let join = Route::new(JOIN_ROUTE, BootPhase::JoinExisting)
        .step("fetch-host-keys", FetchHostKeys)
        .then(STEADY_ROUTE);

    let form = Route::new(FORM_ROUTE, BootPhase::FormNew)
        .step("generate-host-keys", GenerateHostKeys::new(deps.runner.clone()))
        .then(STEADY_ROUTE);

    let steady = Route::new(STEADY_ROUTE, BootPhase::SteadyState)
        .step("confd-once", RenderTemplates::new(deps.runner.clone()))
        .step("confd", StartConfd::new(grace))
        .step("docker-cleanup", CleanupDockerSocket)
        .step("docker", StartDocker::new(deps.runner.clone(), grace))
        .step("docker-ready", WaitForDocker::new(deps.runner.clone()))
        .step("build-images", BuildImages::new(deps.images.clone()))
        .step("sshd", StartSshd::new(grace))
        .step("heartbeat", PublishHeartbeat::new("sshd", deps.control.clone()))
        .step("watch-services", WatchServices::new(deps.reconcile.clone()))
        .step("kill-on-exit", KillOnExit::new(deps.control.clone()));

    Pipeline::builder("builder")
        .entry(BOOT_ROUTE)
        .route(boot)
        .route(join)
        .route(form)
        .route(steady)
        .build()
}
