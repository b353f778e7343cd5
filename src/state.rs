// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::keys::KeyCache;
use crate::oauth::OAuthService;
use crate::store::TokenStore;
use crate::tokens::TokenService;

/// Shared application state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<RwLock<TokenStore>>,
    pub oauth: Arc<OAuthService>,
    pub tokens: TokenService,
    pub keys: Arc<KeyCache>,
    pub metrics: PrometheusHandle,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<RwLock<TokenStore>>,
        oauth: Arc<OAuthService>,
        tokens: TokenService,
        keys: Arc<KeyCache>,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            config,
            store,
            oauth,
            tokens,
            keys,
            metrics,
        }
    }

    /// State backed by the in-process signing authority, for tests.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        use metrics_exporter_prometheus::PrometheusBuilder;

        use crate::keys::{LocalAuthority, SigningAuthority};

        let mut config = Config::from_env();
        config.client_id = "demo".to_string();
        config.redirect_uris = vec!["http://localhost/cb".to_string()];
        let config = Arc::new(config);

        let authority: Arc<dyn SigningAuthority> =
            Arc::new(LocalAuthority::new().expect("local authority"));
        let keys = Arc::new(KeyCache::new(
            authority.clone(),
            std::time::Duration::from_secs(3600),
        ));
        let tokens = TokenService::new(authority, keys.clone(), config.clone());
        let store = Arc::new(RwLock::new(TokenStore::new()));
        let oauth = Arc::new(OAuthService::new(
            config.clone(),
            store.clone(),
            tokens.clone(),
        ));
        // A detached recorder; the handle renders without being the
        // global default, which keeps parallel tests independent.
        let metrics = PrometheusBuilder::new().build_recorder().handle();

        Self::new(config, store, oauth, tokens, keys, metrics)
    }
}
