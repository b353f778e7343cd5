// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

//! # Store Sweeper
//!
//! Background task that garbage-collects expired authorization codes and
//! expired or revoked refresh tokens. Consumption correctness never
//! depends on the sweeper; it only bounds memory.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown,
//! the same pattern as the key rotation scheduler.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::store::TokenStore;

/// Periodically removes dead entries from the token store.
pub struct StoreSweeper {
    store: Arc<RwLock<TokenStore>>,
    interval: Duration,
}

impl StoreSweeper {
    pub fn new(store: Arc<RwLock<TokenStore>>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Run the sweep loop until the cancellation token is triggered.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "store sweeper starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("store sweeper shutting down");
                    return;
                }
            }

            let (codes, tokens) = self.store.write().await.sweep(Utc::now());
            if codes > 0 || tokens > 0 {
                debug!(codes, tokens, "swept expired entries");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use crate::models::RefreshToken;

    use super::*;

    #[tokio::test]
    async fn sweeper_stops_on_cancellation() {
        let store = Arc::new(RwLock::new(TokenStore::new()));
        let sweeper = StoreSweeper::new(store, Duration::from_secs(3600));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(sweeper.run(shutdown.clone()));
        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn sweep_clears_expired_refresh_tokens() {
        let store = Arc::new(RwLock::new(TokenStore::new()));
        {
            let now = Utc::now();
            let mut guard = store.write().await;
            guard.insert_refresh_token(RefreshToken {
                token: "stale".into(),
                subject: "user-1".into(),
                client_id: "demo".into(),
                scope: String::new(),
                issued_at: now - ChronoDuration::days(8),
                expires_at: now - ChronoDuration::days(1),
                revoked: false,
            });
        }

        let (_, tokens) = store.write().await.sweep(Utc::now());
        assert_eq!(tokens, 1);
    }
}
