//! Watch a store path and reconcile on every change

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::coordination::Watcher;
use crate::execution::tasks::TaskSet;
use crate::process::command::{CommandRunner, CommandSpec};

/// Pause after a failed watch before watching again
pub const WATCH_ERROR_DELAY: Duration = Duration::from_millis(50);

/// Watch `path` recursively and run `reconcile` once per observed change.
///
/// Runs until `token` is cancelled. Watch errors and reconcile failures are
/// logged and never end the loop.
pub async fn watch_and_trigger<W>(
    watcher: Arc<W>,
    path: String,
    reconcile: CommandSpec,
    runner: Arc<dyn CommandRunner>,
    token: CancellationToken,
) where
    W: Watcher + ?Sized,
{
    info!(path = %path, "watching for changes");
    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = watcher.watch(&path, true) => event,
        };

        match event {
            Ok(event) => {
                debug!(action = %event.action, key = %event.node.key, "change observed");
                let run = tokio::select! {
                    _ = token.cancelled() => break,
                    run = runner.run(&reconcile) => run,
                };
                match run {
                    Ok(output) => debug!("{}", output.combined.trim()),
                    Err(err) => error!("{} failed: {}", reconcile.program, err),
                }
            }
            Err(err) => {
                debug!("watch on {} failed: {}", path, err);
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(WATCH_ERROR_DELAY) => {}
                }
            }
        }
    }
    debug!(path = %path, "watch loop stopped");
}

/// Run [`watch_and_trigger`] as a background task
pub fn spawn_watch_loop<W>(
    watcher: Arc<W>,
    path: impl Into<String>,
    reconcile: CommandSpec,
    runner: Arc<dyn CommandRunner>,
    tasks: &TaskSet,
) -> String
where
    W: Watcher + ?Sized + 'static,
{
    let path = path.into();
    tasks.spawn(format!("watch {}", path), move |token| {
        watch_and_trigger(watcher, path, reconcile, runner, token)
    })
}
