// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

use std::net::SocketAddr;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use auth_server::api;
use auth_server::config::{Config, LOG_FORMAT_ENV};
use auth_server::keys::{KeyCache, LocalAuthority, SigningAuthority, TransitClient};
use auth_server::oauth::OAuthService;
use auth_server::rotation::KeyRotator;
use auth_server::state::AppState;
use auth_server::store::TokenStore;
use auth_server::sweeper::StoreSweeper;
use auth_server::tokens::TokenService;

#[tokio::main]
async fn main() {
    // Install the ring crypto provider for rustls (must be done before
    // any TLS operations).
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    init_tracing();

    let config = Arc::new(Config::from_env());

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    // Vault Transit when configured; otherwise an in-process signer so
    // development works without a Vault deployment.
    let authority: Arc<dyn SigningAuthority> = match &config.vault {
        Some(vault) => {
            tracing::info!(
                address = %vault.address,
                key = %vault.transit_key,
                "using Vault Transit signing authority"
            );
            Arc::new(
                TransitClient::new(vault)
                    .await
                    .expect("Failed to initialize Vault Transit client"),
            )
        }
        None => {
            tracing::warn!("VAULT_ADDR is not set; using in-process development signer");
            Arc::new(LocalAuthority::new().expect("Failed to initialize local signer"))
        }
    };

    let keys = Arc::new(KeyCache::new(authority.clone(), config.key_cache_ttl));
    // Warm the cache so the first request does not pay the fetch; a
    // failure here is retried on demand.
    if let Err(err) = keys.current().await {
        tracing::warn!(error = %err, "initial key fetch failed; will retry on demand");
    }

    let tokens = TokenService::new(authority.clone(), keys.clone(), config.clone());
    let store = Arc::new(RwLock::new(TokenStore::new()));
    let oauth = Arc::new(OAuthService::new(
        config.clone(),
        store.clone(),
        tokens.clone(),
    ));
    let state = AppState::new(
        config.clone(),
        store.clone(),
        oauth,
        tokens,
        keys.clone(),
        metrics,
    );

    let shutdown = CancellationToken::new();
    let sweeper = StoreSweeper::new(store, config.sweep_interval);
    let sweeper_task = tokio::spawn(sweeper.run(shutdown.clone()));
    let rotator = KeyRotator::new(authority, keys, config.key_rotation_interval);
    let rotator_task = tokio::spawn(rotator.run(shutdown.clone()));

    let app = api::router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Failed to parse bind address");

    let serve = async {
        match (&config.tls_cert_file, &config.tls_key_file) {
            (Some(cert), Some(key)) => {
                let tls = RustlsConfig::from_pem_file(cert, key)
                    .await
                    .expect("Failed to load TLS certificate or key");
                tracing::info!(%addr, "listening with TLS (docs at /docs)");
                axum_server::bind_rustls(addr, tls)
                    .serve(app.into_make_service())
                    .await
            }
            _ => {
                tracing::info!(%addr, "listening without TLS (docs at /docs)");
                axum_server::bind(addr).serve(app.into_make_service()).await
            }
        }
    };

    tokio::select! {
        result = serve => result.expect("Server failed"),
        _ = shutdown_signal() => tracing::info!("shutdown signal received"),
    }

    shutdown.cancel();
    let _ = sweeper_task.await;
    let _ = rotator_task.await;
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    if std::env::var(LOG_FORMAT_ENV).as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
