// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

//! Time-bounded cache of the authority's public key set.
//!
//! ## Concurrency
//!
//! Reads take the shared lock and clone an `Arc`. A miss serializes on
//! the refresh mutex with a double-check, so concurrent missers produce
//! exactly one upstream fetch per miss window (single-flight); late
//! arrivals find the fresh entry during their re-check and return
//! without fetching.
//!
//! ## Staleness
//!
//! Invalidation marks the entry stale instead of dropping it, and a
//! failed refresh falls back to the stale entry. Published verification
//! keys stay valid across rotations, so a last-known-good set keeps
//! JWKS and validation serving through an authority outage; only a
//! cache that never held keys surfaces the upstream error.
//!
//! The TTL (default 23 h) stays below the 24 h rotation cadence so a
//! stale cache never outlives key validity. The rotation scheduler calls
//! [`KeyCache::invalidate`] after a successful rotation to pick up the
//! new version immediately.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};

use super::authority::SigningAuthority;
use super::error::KeyError;
use super::material::KeySet;

struct CacheEntry {
    keys: Arc<KeySet>,
    fetched_at: Instant,
    stale: bool,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        !self.stale && self.fetched_at.elapsed() < ttl
    }
}

/// Shared cache in front of [`SigningAuthority::fetch_key_set`].
pub struct KeyCache {
    authority: Arc<dyn SigningAuthority>,
    ttl: Duration,
    cache: RwLock<Option<CacheEntry>>,
    /// Single-flight guard for refreshes.
    refresh: Mutex<()>,
}

impl KeyCache {
    pub fn new(authority: Arc<dyn SigningAuthority>, ttl: Duration) -> Self {
        Self {
            authority,
            ttl,
            cache: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// The current key set, refreshed from the authority when the cached
    /// entry has expired or was invalidated. A failed refresh serves the
    /// stale entry when one exists.
    pub async fn current(&self) -> Result<Arc<KeySet>, KeyError> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = &*cache {
                if entry.is_fresh(self.ttl) {
                    return Ok(Arc::clone(&entry.keys));
                }
            }
        }

        let _guard = self.refresh.lock().await;

        // Another caller may have refreshed while we waited for the guard.
        {
            let cache = self.cache.read().await;
            if let Some(entry) = &*cache {
                if entry.is_fresh(self.ttl) {
                    return Ok(Arc::clone(&entry.keys));
                }
            }
        }

        match self.authority.fetch_key_set().await {
            Ok(keys) => {
                let keys = Arc::new(keys);
                let mut cache = self.cache.write().await;
                *cache = Some(CacheEntry {
                    keys: Arc::clone(&keys),
                    fetched_at: Instant::now(),
                    stale: false,
                });
                Ok(keys)
            }
            Err(err) => {
                let cache = self.cache.read().await;
                match &*cache {
                    Some(entry) => {
                        tracing::warn!(error = %err, "key refresh failed; serving stale keys");
                        Ok(Arc::clone(&entry.keys))
                    }
                    None => Err(err),
                }
            }
        }
    }

    /// Mark the cached entry stale so the next read refreshes. The entry
    /// is kept as a fallback for refresh failures.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        if let Some(entry) = cache.as_mut() {
            entry.stale = true;
        }
    }

    /// Whether a fresh entry is currently cached.
    pub async fn is_cached(&self) -> bool {
        let cache = self.cache.read().await;
        matches!(&*cache, Some(entry) if entry.is_fresh(self.ttl))
    }
}
