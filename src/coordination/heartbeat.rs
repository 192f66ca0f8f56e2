//! Lease republication tied to a monitored process

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::coordination::{join_path, Setter, StoreError};
use crate::execution::tasks::TaskSet;
use crate::process::control::ProcessControl;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Directory holding the `host` and `port` keys
    pub base: String,
    pub host: String,
    /// Advertised port; empty disables publication
    pub port: String,
    pub ttl: Duration,
    pub interval: Duration,
    /// The heartbeat stops once this process is gone
    pub monitored_pid: u32,
}

impl HeartbeatConfig {
    /// Config refreshing every `ttl / 2`
    pub fn new(
        base: impl Into<String>,
        host: impl Into<String>,
        port: impl Into<String>,
        ttl: Duration,
        monitored_pid: u32,
    ) -> Self {
        Self {
            base: base.into(),
            host: host.into(),
            port: port.into(),
            ttl,
            interval: ttl / 2,
            monitored_pid,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Publishes `{base}/host` and `{base}/port` with a lease and keeps them
/// fresh while the monitored process lives.
pub struct Heartbeat {
    config: HeartbeatConfig,
}

impl Heartbeat {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self { config }
    }

    /// Write both keys now, then refresh them in a background task.
    ///
    /// Returns the task name, or `None` when no port is configured.
    pub async fn publish<S>(
        &self,
        setter: Arc<S>,
        control: Arc<dyn ProcessControl>,
        tasks: &TaskSet,
    ) -> Result<Option<String>, StoreError>
    where
        S: Setter + ?Sized + 'static,
    {
        if self.config.port.is_empty() {
            info!("no external port configured, not publishing a heartbeat");
            return Ok(None);
        }
        if self.config.interval.is_zero() || self.config.interval >= self.config.ttl {
            return Err(StoreError::InvalidLease(format!(
                "refresh interval {:?} must be non-zero and shorter than the ttl {:?}",
                self.config.interval, self.config.ttl
            )));
        }

        write_keys(setter.as_ref(), &self.config).await?;
        info!(
            "published {}:{} under {}",
            self.config.host, self.config.port, self.config.base
        );

        let config = self.config.clone();
        let name = tasks.spawn("heartbeat", move |token| async move {
            let mut ticker = interval_at(Instant::now() + config.interval, config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("heartbeat cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        if !control.is_alive(config.monitored_pid) {
                            info!(pid = config.monitored_pid, "monitored process is gone, stopping heartbeat");
                            break;
                        }
                        if let Err(err) = write_keys(setter.as_ref(), &config).await {
                            error!("heartbeat write failed, stopping: {}", err);
                            break;
                        }
                        debug!("heartbeat refreshed");
                    }
                }
            }
        });

        Ok(Some(name))
    }
}

async fn write_keys<S>(setter: &S, config: &HeartbeatConfig) -> Result<(), StoreError>
where
    S: Setter + ?Sized,
{
    setter
        .set(&join_path(&config.base, "host"), &config.host, config.ttl)
        .await?;
    setter
        .set(&join_path(&config.base, "port"), &config.port, config.ttl)
        .await?;
    Ok(())
}
