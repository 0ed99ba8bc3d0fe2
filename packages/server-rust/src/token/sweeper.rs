//! Periodic eviction of expired token cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::service::TokenService;

/// Background task calling [`TokenService::purge_expired`] on an interval.
///
/// The task runs until [`stop`](Self::stop) is awaited or the handle is
/// dropped.
pub struct CacheSweeper {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CacheSweeper {
    /// Spawns the sweeper on the current tokio runtime.
    #[must_use]
    pub fn start(tokens: Arc<TokenService>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = tokens.purge_expired();
                        if removed > 0 {
                            tracing::debug!(removed, "purged expired token cache entries");
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Signals the task to exit and waits for it.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::token::TokenConfig;

    fn tokens(ttl: Duration) -> Arc<TokenService> {
        Arc::new(
            TokenService::new(TokenConfig {
                signing_secret: "sign".into(),
                encryption_secret: "enc".into(),
                ttl,
                ..TokenConfig::default()
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn start_and_stop() {
        let mut sweeper =
            CacheSweeper::start(tokens(Duration::from_secs(60)), Duration::from_secs(60));
        sweeper.stop().await;
        assert!(sweeper.handle.is_none());
    }

    #[tokio::test]
    async fn sweeps_expired_entries() {
        let tokens = tokens(Duration::from_secs(1));
        let token = tokens.issue(&json!({"user": "ada"})).unwrap();

        let mut sweeper = CacheSweeper::start(Arc::clone(&tokens), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        sweeper.stop().await;

        assert_eq!(tokens.purge_expired(), 0);
        assert!(!tokens.validate(&token));
    }
}
