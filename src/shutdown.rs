//! Graceful shutdown for the daemon.
//!
//! Long-running tasks take a clone of the manager's [`CancellationToken`] and
//! stop when it fires. The session loop treats cancellation as a shutdown
//! request, so every open `getdata` request is failed before the pool closes.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long registered tasks get to finish once shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct ShutdownManager {
    cancel_token: CancellationToken,
    task_handles: Vec<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
            task_handles: Vec::new(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn register_task(&mut self, handle: JoinHandle<()>) {
        self.task_handles.push(handle);
    }

    /// Wait for ctrl+c, then stop everything.
    pub async fn wait_for_shutdown(self) {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::error!("Failed to listen for shutdown signal: {}", e);
                }
                tracing::info!("🛑 Shutdown signal received");
            }
            _ = self.cancel_token.cancelled() => {
                tracing::info!("🛑 Shutdown requested");
            }
        }
        self.shutdown(SHUTDOWN_GRACE).await;
    }

    /// Cancel the token and wait up to `grace` for registered tasks.
    /// Returns false if some task was still running when time ran out.
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        self.cancel_token.cancel();

        let handles = std::mem::take(&mut self.task_handles);
        let join_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };

        match tokio::time::timeout(grace, join_all).await {
            Ok(()) => {
                tracing::info!("✓ All tasks shut down gracefully");
                true
            }
            Err(_) => {
                tracing::warn!("⏱️  Shutdown timeout: Some tasks did not complete");
                false
            }
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tasks_see_cancellation() {
        let mut manager = ShutdownManager::new();
        let token = manager.token();
        manager.register_task(tokio::spawn(async move {
            token.cancelled().await;
        }));

        assert!(manager.shutdown(Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_task_times_out() {
        let mut manager = ShutdownManager::new();
        manager.register_task(tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }));

        assert!(!manager.shutdown(Duration::from_secs(1)).await);
    }
}
