//! Graceful shutdown on SIGTERM and SIGINT.

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Listens for shutdown signals and exposes a cancellation token for the
/// server to await.
pub struct SigDown {
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl SigDown {
    /// Registers the signal handlers.
    ///
    /// # Errors
    ///
    /// Returns an error if signal registration with the OS fails.
    pub fn try_new() -> Result<Self, std::io::Error> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let token = CancellationToken::new();
        let task_token = token.clone();
        let task_tracker = TaskTracker::new();
        task_tracker.spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
            }
            task_token.cancel();
        });
        task_tracker.close();
        Ok(Self {
            task_tracker,
            cancellation_token: token,
        })
    }

    /// Waits for a shutdown signal and for the handler task to wind down.
    pub async fn recv(&self) {
        self.cancellation_token.cancelled().await;
        self.task_tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recv_resolves_after_cancellation() {
        let token = CancellationToken::new();
        let task_tracker = TaskTracker::new();
        task_tracker.close();
        let sig_down = SigDown {
            task_tracker,
            cancellation_token: token.clone(),
        };
        let waiter = tokio::spawn(async move { sig_down.recv().await });
        token.cancel();
        waiter.await.unwrap();
    }
}
