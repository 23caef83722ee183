//! Graceful shutdown management

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Manages graceful shutdown for long-running processes
pub struct ShutdownManager {
    token: CancellationToken,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Spawn a Ctrl+C signal handler that triggers shutdown
    pub fn spawn_signal_handler(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("");
                info!("Received shutdown signal (Ctrl+C)");
                info!("Shutting down gracefully...");
                token.cancel();
            }
        });
    }

    /// Token to hand to the client and other tasks
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
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
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancelling_any_token_clone_stops_everyone() {
        let manager = ShutdownManager::new();
        let waiter = manager.token();

        let task = tokio::spawn(async move { waiter.cancelled().await });

        manager.token().cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(manager.token().is_cancelled());
    }
}
