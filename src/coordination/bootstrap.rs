//! Well-known directory creation and store readiness

use std::time::Duration;

use tracing::{debug, info};

use crate::coordination::{DirCreator, Getter, StoreError};
use crate::execution::retry::{retry, RetryError, RetryPolicy};

/// Create every directory in `paths`, in order.
///
/// Existing directories are skipped. Returns how many were newly created.
pub async fn create_directories<S>(store: &S, paths: &[String]) -> Result<usize, StoreError>
where
    S: DirCreator + ?Sized,
{
    let mut created = 0;
    for path in paths {
        match store.create_dir(path, Duration::ZERO).await {
            Ok(_) => {
                debug!(path = %path, "created directory");
                created += 1;
            }
            Err(err) if err.is_already_exists() => {
                debug!(path = %path, "directory already exists");
            }
            Err(err) => return Err(err),
        }
    }
    info!("{} of {} directories created", created, paths.len());
    Ok(created)
}

/// Poll the store root until it answers
pub async fn wait_until_ready<S>(store: &S, policy: &RetryPolicy) -> Result<(), RetryError<StoreError>>
where
    S: Getter + ?Sized,
{
    retry("coordination store", policy, move |_| async move {
        store.get("/", false).await.map(|_| ())
    })
    .await?;
    info!("coordination store is ready");
    Ok(())
}
