// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup and shared
//! behind an `Arc` for the lifetime of the process.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8443` |
//! | `TLS_CERT_FILE` | PEM certificate chain (TLS enabled when both set) | unset |
//! | `TLS_KEY_FILE` | PEM private key | unset |
//! | `VAULT_ADDR` | Vault address (dev-mode local signer when unset) | unset |
//! | `VAULT_TOKEN` | Vault token | empty |
//! | `VAULT_TRANSIT_KEY` | Transit key name used for JWT signing | `jwt-signing-key` |
//! | `JWT_ISSUER` | `iss` claim and the issuer pinned during validation | `https://auth-server` |
//! | `JWT_AUDIENCE` | `aud` claim for access tokens | `api` |
//! | `JWT_ACCESS_TOKEN_TTL_SECS` | Access token lifetime | `86400` (24 h) |
//! | `JWT_REFRESH_TOKEN_TTL_SECS` | Refresh token lifetime | `604800` (7 d) |
//! | `KEY_ROTATION_INTERVAL_SECS` | Signing key rotation cadence | `86400` (24 h) |
//! | `KEY_CACHE_TTL_SECS` | Public key cache lifetime | `82800` (23 h) |
//! | `OAUTH_CLIENT_ID` | The registered client | `default-client` |
//! | `OAUTH_REDIRECT_URI` | Registered redirect URI (exact match) | `http://localhost:3000/callback` |
//! | `OAUTH_CODE_TTL_SECS` | Authorization code lifetime | `600` (10 min) |
//! | `STORE_SWEEP_INTERVAL_SECS` | Expired code/token sweep cadence | `3600` (1 h) |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable selecting the logging format (`json` or `pretty`).
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Vault connection settings. Absent in development mode, where an
/// in-process signer stands in for the Transit engine.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Vault base address, e.g. `https://vault:8200`.
    pub address: String,
    /// Vault token used for Transit API calls.
    pub token: String,
    /// Name of the Transit key backing JWT signatures.
    pub transit_key: String,
}

/// Immutable server configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// TLS is enabled only when both the certificate and key paths are set.
    pub tls_cert_file: Option<PathBuf>,
    pub tls_key_file: Option<PathBuf>,

    pub vault: Option<VaultConfig>,

    /// `iss` claim on issued tokens; validation pins issuer equality.
    pub issuer: String,
    /// `aud` claim on access tokens.
    pub audience: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub key_rotation_interval: Duration,
    /// Must stay below the rotation cadence so a stale cache never
    /// outlives key validity.
    pub key_cache_ttl: Duration,

    /// The single registered OAuth client.
    pub client_id: String,
    /// Registered redirect URIs, matched exactly.
    pub redirect_uris: Vec<String>,
    /// Scopes a client may request.
    pub supported_scopes: Vec<String>,
    pub code_ttl: Duration,
    pub sweep_interval: Duration,
}

impl Config {
    /// Load configuration from the environment, applying defaults.
    pub fn from_env() -> Self {
        let vault = env::var("VAULT_ADDR").ok().map(|address| VaultConfig {
            address,
            token: get_env("VAULT_TOKEN", ""),
            transit_key: get_env("VAULT_TRANSIT_KEY", "jwt-signing-key"),
        });

        Self {
            host: get_env("HOST", "0.0.0.0"),
            port: env::var("PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(8443),
            tls_cert_file: env::var("TLS_CERT_FILE").ok().map(PathBuf::from),
            tls_key_file: env::var("TLS_KEY_FILE").ok().map(PathBuf::from),
            vault,
            issuer: get_env("JWT_ISSUER", "https://auth-server"),
            audience: get_env("JWT_AUDIENCE", "api"),
            access_token_ttl: duration_env("JWT_ACCESS_TOKEN_TTL_SECS", 24 * 60 * 60),
            refresh_token_ttl: duration_env("JWT_REFRESH_TOKEN_TTL_SECS", 7 * 24 * 60 * 60),
            key_rotation_interval: duration_env("KEY_ROTATION_INTERVAL_SECS", 24 * 60 * 60),
            key_cache_ttl: duration_env("KEY_CACHE_TTL_SECS", 23 * 60 * 60),
            client_id: get_env("OAUTH_CLIENT_ID", "default-client"),
            redirect_uris: vec![get_env(
                "OAUTH_REDIRECT_URI",
                "http://localhost:3000/callback",
            )],
            supported_scopes: vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
            ],
            code_ttl: duration_env("OAUTH_CODE_TTL_SECS", 10 * 60),
            sweep_interval: duration_env("STORE_SWEEP_INTERVAL_SECS", 60 * 60),
        }
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn duration_env(key: &str, default_secs: u64) -> Duration {
    let secs = env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_environment() {
        let config = Config::from_env();
        assert_eq!(config.code_ttl, Duration::from_secs(600));
        assert!(config.key_cache_ttl < config.key_rotation_interval);
    }

    #[test]
    fn supported_scopes_include_openid() {
        let config = Config::from_env();
        assert!(config.supported_scopes.iter().any(|s| s == "openid"));
    }
}
