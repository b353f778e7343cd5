// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

//! Vault Transit engine client.
//!
//! ## Security
//!
//! - Signing happens inside Vault; the private key is not exportable
//! - All calls carry a bounded timeout
//! - The transit key is created at startup if it does not exist
//!   (`ecdsa-p256`, signatures marshaled as JWS)

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::config::VaultConfig;

use super::authority::{Signature, SigningAuthority};
use super::error::KeyError;
use super::material::{key_id, spki_coordinates, KeySet, VerificationKey};

/// Timeout applied to every Vault call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the Vault Transit engine.
pub struct TransitClient {
    http: reqwest::Client,
    address: String,
    token: String,
    key_name: String,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    data: SignData,
}

#[derive(Debug, Deserialize)]
struct SignData {
    signature: String,
}

#[derive(Debug, Deserialize)]
struct ReadKeyResponse {
    data: ReadKeyData,
}

#[derive(Debug, Deserialize)]
struct ReadKeyData {
    keys: HashMap<String, KeyVersion>,
    latest_version: u32,
    #[serde(default)]
    min_decryption_version: u32,
}

#[derive(Debug, Deserialize)]
struct KeyVersion {
    #[serde(default)]
    public_key: Option<String>,
}

impl TransitClient {
    /// Build a client and ensure the transit key exists, creating it when
    /// absent. Fails fast when Vault is unreachable or the key cannot be
    /// provisioned.
    pub async fn new(config: &VaultConfig) -> Result<Self, KeyError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(KeyError::upstream)?;

        let client = Self {
            http,
            address: config.address.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            key_name: config.transit_key.clone(),
        };
        client.ensure_key().await?;
        Ok(client)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.address)
    }

    /// Create the transit key if it does not exist yet.
    async fn ensure_key(&self) -> Result<(), KeyError> {
        let response = self
            .http
            .get(self.url(&format!("transit/keys/{}", self.key_name)))
            .header("X-Vault-Token", &self.token)
            .send()
            .await
            .map_err(KeyError::upstream)?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                let response = self
                    .http
                    .post(self.url(&format!("transit/keys/{}", self.key_name)))
                    .header("X-Vault-Token", &self.token)
                    .json(&json!({ "type": "ecdsa-p256", "exportable": false }))
                    .send()
                    .await
                    .map_err(KeyError::upstream)?;
                if response.status().is_success() {
                    tracing::info!(key = %self.key_name, "created transit signing key");
                    Ok(())
                } else {
                    Err(KeyError::upstream(format!(
                        "failed to create transit key: HTTP {}",
                        response.status()
                    )))
                }
            }
            status => Err(KeyError::upstream(format!(
                "failed to read transit key: HTTP {status}"
            ))),
        }
    }
}

/// Parse Vault's `vault:v{N}:{sig}` signature envelope. The version
/// names the key that actually signed, which the JWT header kid must
/// match.
fn parse_envelope(raw: &str) -> Result<Signature, KeyError> {
    let mut parts = raw.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("vault"), Some(version), Some(signature)) => {
            let key_version = version
                .strip_prefix('v')
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| KeyError::malformed("unexpected signature envelope"))?;
            Ok(Signature {
                signature: signature.to_string(),
                key_version,
            })
        }
        _ => Err(KeyError::malformed("unexpected signature envelope")),
    }
}

#[async_trait]
impl SigningAuthority for TransitClient {
    async fn sign(&self, payload: &[u8]) -> Result<Signature, KeyError> {
        let response = self
            .http
            .post(self.url(&format!("transit/sign/{}", self.key_name)))
            .header("X-Vault-Token", &self.token)
            .json(&json!({
                "input": Base64::encode_string(payload),
                "marshaling_algorithm": "jws",
            }))
            .send()
            .await
            .map_err(KeyError::upstream)?;

        if !response.status().is_success() {
            return Err(KeyError::upstream(format!(
                "sign request failed: HTTP {}",
                response.status()
            )));
        }

        let body: SignResponse = response
            .json()
            .await
            .map_err(|err| KeyError::malformed(format!("sign response: {err}")))?;

        parse_envelope(&body.data.signature)
    }

    async fn fetch_key_set(&self) -> Result<KeySet, KeyError> {
        let response = self
            .http
            .get(self.url(&format!("transit/keys/{}", self.key_name)))
            .header("X-Vault-Token", &self.token)
            .send()
            .await
            .map_err(KeyError::upstream)?;

        if !response.status().is_success() {
            return Err(KeyError::upstream(format!(
                "key read failed: HTTP {}",
                response.status()
            )));
        }

        let body: ReadKeyResponse = response
            .json()
            .await
            .map_err(|err| KeyError::malformed(format!("key read response: {err}")))?;

        let min_version = body.data.min_decryption_version.max(1);
        let mut keys = Vec::new();
        for (version, material) in &body.data.keys {
            let version: u32 = version
                .parse()
                .map_err(|_| KeyError::malformed(format!("non-numeric key version {version:?}")))?;
            if version < min_version {
                continue;
            }
            let pem_text = material
                .public_key
                .as_deref()
                .ok_or_else(|| KeyError::malformed("key version without public key"))?;
            let (x, y) = spki_coordinates(pem_text)?;
            keys.push(VerificationKey {
                version,
                kid: key_id(&self.key_name, version),
                x,
                y,
            });
        }

        KeySet::new(body.data.latest_version, keys)
    }

    async fn rotate(&self) -> Result<(), KeyError> {
        let response = self
            .http
            .post(self.url(&format!("transit/keys/{}/rotate", self.key_name)))
            .header("X-Vault-Token", &self.token)
            .send()
            .await
            .map_err(KeyError::upstream)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(KeyError::upstream(format!(
                "rotate request failed: HTTP {}",
                response.status()
            )))
        }
    }
}
