//! Registry of detached background tasks with per-task cancellation

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

struct BackgroundTask {
    name: String,
    handle: JoinHandle<()>,
}

/// Background tasks spawned during a boot.
///
/// Every task gets a child of one root token, so cancelling the set
/// cancels each task, including ones spawned afterwards.
#[derive(Clone, Default)]
pub struct TaskSet {
    root: CancellationToken,
    tasks: Arc<Mutex<Vec<BackgroundTask>>>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<BackgroundTask>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn a task. `task` receives the token it must watch for cancellation.
    pub fn spawn<F, Fut>(&self, name: impl Into<String>, task: F) -> String
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let token = self.root.child_token();
        let handle = tokio::spawn(task(token));
        debug!(task = %name, "spawned background task");

        self.lock().push(BackgroundTask {
            name: name.clone(),
            handle,
        });
        name
    }

    /// Names of registered tasks, in spawn order
    pub fn names(&self) -> Vec<String> {
        self.lock().iter().map(|t| t.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of registered tasks that have not finished yet
    pub fn running(&self) -> usize {
        self.lock().iter().filter(|t| !t.handle.is_finished()).count()
    }


    /// Cancel every task, including ones spawned later
    pub fn cancel_all(&self) {
        self.root.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Wait up to `timeout` for all tasks to finish, aborting stragglers.
    ///
    /// Returns the number of tasks that had to be aborted.
    pub async fn join(&self, timeout: Duration) -> usize {
        let tasks: Vec<BackgroundTask> = self.lock().drain(..).collect();
        let deadline = tokio::time::Instant::now() + timeout;
        let mut aborted = 0;

        for mut task in tasks {
            match tokio::time::timeout_at(deadline, &mut task.handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(task = %task.name, "background task ended abnormally: {}", err),
                Err(_) => {
                    warn!(task = %task.name, "background task did not stop in time, aborting");
                    task.handle.abort();
                    aborted += 1;
                }
            }
        }
        aborted
    }
}
