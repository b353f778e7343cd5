// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

//! # Key Rotation Scheduler
//!
//! Rotates the signing key on a fixed cadence, independent of request
//! traffic. After a successful rotation the key cache is invalidated so
//! the next sign/JWKS call picks up the new version, then re-warmed so
//! `/.well-known/jwks.json` keeps serving without a cold fetch on the
//! request path.
//!
//! Rotation never revokes the prior key's verification validity: tokens
//! signed moments before a rotation stay valid until their own `exp`.
//! A failed rotation is logged and alerted through metrics; the previous
//! key simply remains current until the next tick succeeds.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::keys::{KeyCache, SigningAuthority};
use crate::metrics::record_key_rotation;

/// Periodic key rotation driver.
pub struct KeyRotator {
    authority: Arc<dyn SigningAuthority>,
    cache: Arc<KeyCache>,
    interval: Duration,
}

impl KeyRotator {
    pub fn new(
        authority: Arc<dyn SigningAuthority>,
        cache: Arc<KeyCache>,
        interval: Duration,
    ) -> Self {
        Self {
            authority,
            cache,
            interval,
        }
    }

    /// Run the rotation loop until the cancellation token is triggered.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "key rotation scheduler starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("key rotation scheduler shutting down");
                    return;
                }
            }

            self.rotate_step().await;
        }
    }

    /// One rotation tick: rotate, invalidate, re-warm.
    async fn rotate_step(&self) {
        match self.authority.rotate().await {
            Ok(()) => {
                self.cache.invalidate().await;
                match self.cache.current().await {
                    Ok(keys) => {
                        // The cache serves a stale fallback on refresh
                        // failure; only a fresh entry carries the new
                        // version.
                        if self.cache.is_cached().await {
                            record_key_rotation("success");
                            info!(kid = %keys.current().kid, "rotated signing key");
                        } else {
                            record_key_rotation("refresh_failed");
                            warn!("key refresh failed after rotation; serving previous keys");
                        }
                    }
                    Err(err) => {
                        // The rotation itself succeeded; the next read
                        // retries the fetch.
                        record_key_rotation("refresh_failed");
                        warn!(error = %err, "key cache refresh failed after rotation");
                    }
                }
            }
            Err(err) => {
                record_key_rotation("error");
                warn!(error = %err, "key rotation failed; previous key remains active");
            }
        }
    }
}
