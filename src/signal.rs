//! SIGINT / SIGTERM handling

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Wait for SIGINT or SIGTERM
pub async fn shutdown_signal() -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!(message = "Signal received.", signal = "SIGINT");
        }
        _ = sigterm.recv() => {
            info!(message = "Signal received.", signal = "SIGTERM");
        }
    }
    Ok(())
}

/// Cancel `token` on the first shutdown signal.
///
/// The listener also stops once `token` is cancelled by someone else.
pub fn spawn_signal_listener(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            result = shutdown_signal() => {
                if let Err(err) = result {
                    error!("failed to install signal handlers: {}", err);
                    return;
                }
                token.cancel();
            }
        }
    })
}
