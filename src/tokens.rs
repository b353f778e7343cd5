// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

//! JWT issuance and validation.
//!
//! Issuance assembles `header.claims.signature` by hand because the
//! signature is produced by the external authority; the private key is
//! never in this process. Validation runs locally against the cached
//! public key set.
//!
//! ## Security
//!
//! Every validation failure collapses into [`TokenError::Invalid`]. The
//! specific failing check is logged at debug level for operators and
//! never surfaced to callers.

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::keys::{KeyCache, KeyError, SigningAuthority};
use crate::models::JwkSet;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Errors from token issuance and validation.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Uniform outcome for any failed validation check.
    #[error("token is invalid")]
    Invalid,

    /// The key authority or cache failed; retryable, surfaced as 5xx.
    #[error(transparent)]
    Authority(#[from] KeyError),

    #[error("claims encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Registered claims carried by issued tokens.
///
/// OIDC-only fields (`nonce`) are tagged optionals validated at
/// construction, not an ad hoc claim map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub aud: Vec<String>,
    pub exp: i64,
    pub nbf: i64,
    pub iat: i64,
    pub jti: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

#[derive(Serialize)]
struct JoseHeader<'a> {
    alg: &'static str,
    typ: &'static str,
    kid: &'a str,
}

/// Issues and validates JWTs against the external signing authority.
#[derive(Clone)]
pub struct TokenService {
    authority: Arc<dyn SigningAuthority>,
    keys: Arc<KeyCache>,
    config: Arc<Config>,
}

impl TokenService {
    pub fn new(
        authority: Arc<dyn SigningAuthority>,
        keys: Arc<KeyCache>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            authority,
            keys,
            config,
        }
    }

    /// Issue an access token for `subject` on behalf of `client_id`.
    pub async fn issue_access_token(
        &self,
        subject: &str,
        client_id: &str,
        scope: &str,
        tenant_id: Option<&str>,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            iss: self.config.issuer.clone(),
            sub: subject.to_string(),
            aud: vec![self.config.audience.clone()],
            exp: (now + self.config.access_token_ttl).timestamp(),
            nbf: now.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            scope: (!scope.is_empty()).then(|| scope.to_string()),
            client_id: Some(client_id.to_string()),
            tenant_id: tenant_id.map(str::to_string),
            nonce: None,
        };
        self.sign_claims(&claims).await
    }

    /// Issue an OIDC ID token addressed to the client itself.
    pub async fn issue_id_token(
        &self,
        subject: &str,
        client_id: &str,
        nonce: Option<&str>,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            iss: self.config.issuer.clone(),
            sub: subject.to_string(),
            aud: vec![client_id.to_string()],
            exp: (now + self.config.access_token_ttl).timestamp(),
            nbf: now.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            scope: None,
            client_id: None,
            tenant_id: None,
            nonce: nonce.map(str::to_string),
        };
        self.sign_claims(&claims).await
    }

    /// Assemble and sign a JWT: base64url header and claims, signature
    /// from the authority over `header.claims`.
    ///
    /// The authority reports which key version signed. When a rotation
    /// lands between the cached key-set read and the sign call, the
    /// embedded kid would name the old version while the signature came
    /// from the new one; the mismatch forces a refresh and one re-sign
    /// under the correct kid.
    async fn sign_claims(&self, claims: &Claims) -> Result<String, TokenError> {
        let claims_b64 = Base64UrlUnpadded::encode_string(&serde_json::to_vec(claims)?);

        for _ in 0..2 {
            let key_set = self.keys.current().await?;
            let current = key_set.current();
            let header = JoseHeader {
                alg: "ES256",
                typ: "JWT",
                kid: &current.kid,
            };
            let header_b64 = Base64UrlUnpadded::encode_string(&serde_json::to_vec(&header)?);
            let signing_input = format!("{header_b64}.{claims_b64}");

            let signed = self.authority.sign(signing_input.as_bytes()).await?;
            if signed.key_version == current.version {
                return Ok(format!("{signing_input}.{}", signed.signature));
            }
            self.keys.invalidate().await;
        }

        Err(TokenError::Authority(KeyError::upstream(
            "signing key version changed during issuance",
        )))
    }

    /// Validate an access token: signature against the key named by the
    /// embedded `kid`, then `exp`, `nbf`, issuer, and audience.
    pub async fn validate_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        let header = decode_header(token).map_err(|err| {
            tracing::debug!(error = %err, "token rejected: malformed header");
            TokenError::Invalid
        })?;
        let kid = header.kid.ok_or_else(|| {
            tracing::debug!("token rejected: missing kid");
            TokenError::Invalid
        })?;

        // Cache or authority failure is infrastructure trouble, not an
        // invalid token; it propagates as a retryable error.
        let key_set = self.keys.current().await?;
        let key = key_set.find(&kid).ok_or_else(|| {
            tracing::debug!(%kid, "token rejected: unknown key id");
            TokenError::Invalid
        })?;

        let decoding_key = DecodingKey::from_ec_components(&key.x, &key.y).map_err(|err| {
            tracing::debug!(error = %err, "token rejected: unusable verification key");
            TokenError::Invalid
        })?;

        let mut validation = Validation::new(Algorithm::ES256);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);

        let data = decode::<Claims>(token, &decoding_key, &validation).map_err(|err| {
            tracing::debug!(check = ?err.kind(), "token rejected");
            TokenError::Invalid
        })?;

        Ok(data.claims)
    }

    /// The published verification keys as a JWK Set.
    pub async fn jwks(&self) -> Result<JwkSet, TokenError> {
        let key_set = self.keys.current().await?;
        Ok(key_set.to_jwks())
    }

    /// Lifetime of newly issued access tokens, in seconds.
    pub fn access_token_lifetime_secs(&self) -> i64 {
        self.config.access_token_ttl.as_secs() as i64
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::keys::LocalAuthority;

    use super::*;

    fn service() -> TokenService {
        let config = Arc::new(Config::from_env());
        let authority: Arc<dyn SigningAuthority> = Arc::new(LocalAuthority::new().unwrap());
        let keys = Arc::new(KeyCache::new(authority.clone(), Duration::from_secs(3600)));
        TokenService::new(authority, keys, config)
    }

    #[tokio::test]
    async fn issue_validate_round_trip() {
        let service = service();
        let token = service
            .issue_access_token("user-1", "demo", "openid profile", Some("tenant-a"))
            .await
            .unwrap();

        let claims = service.validate_access_token(&token).await.unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.client_id.as_deref(), Some("demo"));
        assert_eq!(claims.scope.as_deref(), Some("openid profile"));
        assert_eq!(claims.tenant_id.as_deref(), Some("tenant-a"));
        assert!(!claims.jti.is_empty());
    }

    #[tokio::test]
    async fn tampered_payload_is_rejected() {
        let service = service();
        let token = service
            .issue_access_token("user-1", "demo", "", None)
            .await
            .unwrap();

        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = Base64UrlUnpadded::encode_string(
            br#"{"iss":"https://auth-server","sub":"attacker","aud":["api"],"exp":9999999999,"nbf":0,"iat":0,"jti":"x"}"#,
        );
        parts[1] = &forged;
        let tampered = parts.join(".");

        assert!(matches!(
            service.validate_access_token(&tampered).await,
            Err(TokenError::Invalid)
        ));
    }

    #[tokio::test]
    async fn garbage_is_rejected_uniformly() {
        let service = service();
        for junk in ["", "not-a-jwt", "a.b", "a.b.c.d"] {
            assert!(matches!(
                service.validate_access_token(junk).await,
                Err(TokenError::Invalid)
            ));
        }
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let service = service();
        let now = Utc::now();
        let claims = Claims {
            iss: "https://auth-server".into(),
            sub: "user-1".into(),
            aud: vec!["api".into()],
            // Outside the 60 s leeway.
            exp: (now - chrono::Duration::minutes(5)).timestamp(),
            nbf: (now - chrono::Duration::hours(1)).timestamp(),
            iat: (now - chrono::Duration::hours(1)).timestamp(),
            jti: "expired".into(),
            scope: None,
            client_id: None,
            tenant_id: None,
            nonce: None,
        };
        let token = service.sign_claims(&claims).await.unwrap();
        assert!(matches!(
            service.validate_access_token(&token).await,
            Err(TokenError::Invalid)
        ));
    }

    #[tokio::test]
    async fn wrong_issuer_is_rejected() {
        let service = service();
        let now = Utc::now();
        let claims = Claims {
            iss: "https://someone-else".into(),
            sub: "user-1".into(),
            aud: vec!["api".into()],
            exp: (now + chrono::Duration::hours(1)).timestamp(),
            nbf: now.timestamp(),
            iat: now.timestamp(),
            jti: "foreign".into(),
            scope: None,
            client_id: None,
            tenant_id: None,
            nonce: None,
        };
        let token = service.sign_claims(&claims).await.unwrap();
        assert!(matches!(
            service.validate_access_token(&token).await,
            Err(TokenError::Invalid)
        ));
    }

    #[tokio::test]
    async fn tokens_survive_key_rotation() {
        let config = Arc::new(Config::from_env());
        let authority: Arc<dyn SigningAuthority> = Arc::new(LocalAuthority::new().unwrap());
        let keys = Arc::new(KeyCache::new(authority.clone(), Duration::from_secs(3600)));
        let service = TokenService::new(authority.clone(), keys.clone(), config);

        let old_token = service
            .issue_access_token("user-1", "demo", "", None)
            .await
            .unwrap();

        authority.rotate().await.unwrap();
        keys.invalidate().await;

        // New tokens carry the new kid; the old token still validates.
        let new_token = service
            .issue_access_token("user-1", "demo", "", None)
            .await
            .unwrap();
        assert!(service.validate_access_token(&old_token).await.is_ok());
        assert!(service.validate_access_token(&new_token).await.is_ok());

        let old_kid = decode_header(&old_token).unwrap().kid.unwrap();
        let new_kid = decode_header(&new_token).unwrap().kid.unwrap();
        assert_ne!(old_kid, new_kid);
    }

    #[tokio::test]
    async fn id_token_carries_nonce() {
        let service = service();
        let token = service
            .issue_id_token("user-1", "demo", Some("n-0S6_WzA2Mj"))
            .await
            .unwrap();

        let claims_b64 = token.split('.').nth(1).unwrap();
        let claims: Claims =
            serde_json::from_slice(&Base64UrlUnpadded::decode_vec(claims_b64).unwrap()).unwrap();
        assert_eq!(claims.nonce.as_deref(), Some("n-0S6_WzA2Mj"));
        assert_eq!(claims.aud, vec!["demo".to_string()]);
    }

    /// Rotates underneath the first sign call, after the key set has
    /// already been read.
    struct RotatingAuthority {
        inner: LocalAuthority,
        rotated: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl SigningAuthority for RotatingAuthority {
        async fn sign(&self, payload: &[u8]) -> Result<crate::keys::Signature, KeyError> {
            if !self
                .rotated
                .swap(true, std::sync::atomic::Ordering::SeqCst)
            {
                self.inner.rotate().await?;
            }
            self.inner.sign(payload).await
        }

        async fn fetch_key_set(&self) -> Result<crate::keys::KeySet, KeyError> {
            self.inner.fetch_key_set().await
        }

        async fn rotate(&self) -> Result<(), KeyError> {
            self.inner.rotate().await
        }
    }

    #[tokio::test]
    async fn kid_matches_signature_when_rotation_interleaves() {
        let authority: Arc<dyn SigningAuthority> = Arc::new(RotatingAuthority {
            inner: LocalAuthority::new().unwrap(),
            rotated: std::sync::atomic::AtomicBool::new(false),
        });
        let keys = Arc::new(KeyCache::new(authority.clone(), Duration::from_secs(3600)));
        let service = TokenService::new(authority, keys.clone(), Arc::new(Config::from_env()));

        // Prime the cache with version 1; the rotation lands mid-issuance.
        keys.current().await.unwrap();
        let token = service
            .issue_access_token("user-1", "demo", "", None)
            .await
            .unwrap();

        let kid = decode_header(&token).unwrap().kid.unwrap();
        assert_eq!(kid, "local-dev-key-v2");
        assert!(service.validate_access_token(&token).await.is_ok());
    }

    #[tokio::test]
    async fn jwks_lists_current_kid() {
        let service = service();
        let token = service
            .issue_access_token("user-1", "demo", "", None)
            .await
            .unwrap();
        let kid = decode_header(&token).unwrap().kid.unwrap();

        let jwks = service.jwks().await.unwrap();
        assert!(jwks.keys.iter().any(|key| key.kid == kid));
    }
}
