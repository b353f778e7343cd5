// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

//! OAuth 2.1 protocol state machine.
//!
//! Each authorization attempt moves `REQUESTED -> CODE_ISSUED ->
//! REDEEMED`, or terminates in `DENIED` (authorize-time rejection) or
//! `EXPIRED` (code TTL elapsed before redemption).
//!
//! ## Security
//!
//! - PKCE is mandatory and only `S256` is accepted
//! - Redirect URIs are matched exactly against the registered list
//! - PKCE verification compares digests in constant time
//! - Every security-sensitive redemption failure (unknown, expired or
//!   reused code, PKCE mismatch, binding mismatch) collapses into the
//!   same `invalid_grant`; the real cause is only logged

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::Config;
use crate::models::{
    AuthorizationCode, AuthorizeParams, IntrospectionResponse, OAuthError, RefreshToken,
    TokenForm, TokenResponse,
};
use crate::store::TokenStore;
use crate::tokens::{TokenError, TokenService};

/// Stand-in subject until a login front-end authenticates real users.
/// TODO: bind the authenticated end-user identity once the login UI lands.
const DEMO_SUBJECT: &str = "demo-user";

/// Authorize-time rejection. `redirectable` is set only after the client
/// and redirect URI have been validated; an unregistered redirect URI is
/// never redirected to.
#[derive(Debug)]
pub struct AuthorizeError {
    pub redirectable: bool,
    pub body: OAuthError,
}

/// Token-endpoint failure: either an OAuth protocol error (4xx) or
/// infrastructure unavailability (5xx, retryable).
#[derive(Debug)]
pub enum GrantError {
    Protocol(OAuthError),
    Unavailable,
}

impl From<TokenError> for GrantError {
    fn from(err: TokenError) -> Self {
        match err {
            // Issuance never yields Invalid; anything else is the key
            // authority or serialization failing underneath us.
            TokenError::Invalid => GrantError::Protocol(OAuthError::invalid_grant()),
            TokenError::Authority(cause) => {
                tracing::warn!(error = %cause, "token issuance unavailable");
                GrantError::Unavailable
            }
            TokenError::Encoding(cause) => {
                tracing::error!(error = %cause, "claims encoding failed");
                GrantError::Unavailable
            }
        }
    }
}

/// Implements `/authorize`, `/token` and `/introspect` semantics.
pub struct OAuthService {
    config: Arc<Config>,
    store: Arc<RwLock<TokenStore>>,
    tokens: TokenService,
}

impl OAuthService {
    pub fn new(
        config: Arc<Config>,
        store: Arc<RwLock<TokenStore>>,
        tokens: TokenService,
    ) -> Self {
        Self {
            config,
            store,
            tokens,
        }
    }

    /// `REQUESTED -> CODE_ISSUED`: validate the request and mint a
    /// one-time code bound to the PKCE challenge.
    pub async fn authorize(
        &self,
        params: &AuthorizeParams,
    ) -> Result<AuthorizationCode, AuthorizeError> {
        let state = params.state.clone();
        let deny = |redirectable: bool, body: OAuthError| AuthorizeError {
            redirectable,
            body: body.with_state(state.clone()),
        };

        if params.client_id != self.config.client_id {
            return Err(deny(
                false,
                OAuthError::new("unauthorized_client", "Unknown client_id"),
            ));
        }
        if !self
            .config
            .redirect_uris
            .iter()
            .any(|uri| uri == &params.redirect_uri)
        {
            return Err(deny(
                false,
                OAuthError::invalid_request("redirect_uri is not registered"),
            ));
        }

        // The client and redirect URI check out; failures from here on
        // may be reported via redirect.
        if params.response_type != "code" {
            return Err(deny(
                true,
                OAuthError::unsupported_response_type("Only the 'code' response type is supported"),
            ));
        }
        if !self.is_valid_scope(&params.scope) {
            return Err(deny(
                true,
                OAuthError::invalid_scope("Invalid or unsupported scope"),
            ));
        }
        if params.code_challenge.is_empty() {
            return Err(deny(
                true,
                OAuthError::invalid_request("code_challenge is required"),
            ));
        }
        if params.code_challenge_method != "S256" {
            return Err(deny(
                true,
                OAuthError::invalid_request("Only the 'S256' code_challenge_method is supported"),
            ));
        }

        let now = Utc::now();
        let code = AuthorizationCode {
            code: Uuid::new_v4().to_string(),
            client_id: params.client_id.clone(),
            redirect_uri: params.redirect_uri.clone(),
            scope: params.scope.clone(),
            state: params.state.clone(),
            code_challenge: params.code_challenge.clone(),
            code_challenge_method: params.code_challenge_method.clone(),
            nonce: params.nonce.clone(),
            subject: DEMO_SUBJECT.to_string(),
            issued_at: now,
            expires_at: now + self.config.code_ttl,
            consumed: false,
        };

        self.store.write().await.insert_code(code.clone());
        Ok(code)
    }

    /// `POST /token` dispatch by grant type.
    pub async fn token(&self, form: &TokenForm) -> Result<TokenResponse, GrantError> {
        match form.grant_type.as_str() {
            "authorization_code" => self.authorization_code_grant(form).await,
            "refresh_token" => self.refresh_token_grant(form).await,
            _ => Err(GrantError::Protocol(OAuthError::unsupported_grant_type(
                "Only 'authorization_code' and 'refresh_token' grant types are supported",
            ))),
        }
    }

    /// `CODE_ISSUED -> REDEEMED`: atomically consume the code, verify
    /// every binding, and issue tokens.
    async fn authorization_code_grant(
        &self,
        form: &TokenForm,
    ) -> Result<TokenResponse, GrantError> {
        if form.client_id != self.config.client_id {
            return Err(GrantError::Protocol(OAuthError::invalid_client(
                "Unknown client_id",
            )));
        }
        if form.code.is_empty() {
            return Err(GrantError::Protocol(OAuthError::invalid_request(
                "code is required",
            )));
        }
        if form.code_verifier.is_empty() {
            return Err(GrantError::Protocol(OAuthError::invalid_request(
                "code_verifier is required",
            )));
        }

        // Check-and-take under one write-lock hold: of N concurrent
        // redemptions exactly one gets the code back. The code stays
        // spent even when a later check fails.
        let code = {
            let mut store = self.store.write().await;
            store.consume_code(&form.code, Utc::now())
        };
        let Some(code) = code else {
            tracing::debug!("token rejected: unknown, expired or reused code");
            return Err(GrantError::Protocol(OAuthError::invalid_grant()));
        };

        if code.client_id != form.client_id {
            tracing::debug!("token rejected: client binding mismatch");
            return Err(GrantError::Protocol(OAuthError::invalid_grant()));
        }
        if code.redirect_uri != form.redirect_uri {
            tracing::debug!("token rejected: redirect_uri mismatch");
            return Err(GrantError::Protocol(OAuthError::invalid_grant()));
        }
        if !verify_pkce(&code.code_challenge, &form.code_verifier) {
            tracing::debug!("token rejected: PKCE verification failed");
            return Err(GrantError::Protocol(OAuthError::invalid_grant()));
        }

        let tenant_id = format!("tenant-{}", code.subject);
        let issued = async {
            let access_token = self
                .tokens
                .issue_access_token(&code.subject, &code.client_id, &code.scope, Some(&tenant_id))
                .await?;
            let id_token = if code.scope.split_whitespace().any(|s| s == "openid") {
                Some(
                    self.tokens
                        .issue_id_token(&code.subject, &code.client_id, code.nonce.as_deref())
                        .await?,
                )
            } else {
                None
            };
            Ok::<_, TokenError>((access_token, id_token))
        }
        .await;

        let (access_token, id_token) = match issued {
            Ok(tokens) => tokens,
            Err(err) => {
                // The 503 invites a retry; the code the client retries
                // with must still be redeemable. Protocol failures above
                // keep the code burned.
                let err = GrantError::from(err);
                if matches!(err, GrantError::Unavailable) {
                    let mut restored = code;
                    restored.consumed = false;
                    self.store.write().await.insert_code(restored);
                }
                return Err(err);
            }
        };

        let refresh_token = self
            .mint_refresh_token(&code.subject, &code.client_id, &code.scope)
            .await;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.tokens.access_token_lifetime_secs(),
            refresh_token: Some(refresh_token),
            scope: (!code.scope.is_empty()).then(|| code.scope.clone()),
            id_token,
        })
    }

    /// Refresh grant with rotation-on-use: the presented token is
    /// revoked and a successor is issued alongside the new access token.
    async fn refresh_token_grant(&self, form: &TokenForm) -> Result<TokenResponse, GrantError> {
        if form.client_id != self.config.client_id {
            return Err(GrantError::Protocol(OAuthError::invalid_client(
                "Unknown client_id",
            )));
        }
        if form.refresh_token.is_empty() {
            return Err(GrantError::Protocol(OAuthError::invalid_request(
                "refresh_token is required",
            )));
        }

        let consumed = {
            let mut store = self.store.write().await;
            store.consume_refresh_token(&form.refresh_token, Utc::now())
        };
        let Some(consumed) = consumed else {
            tracing::debug!("token rejected: unknown, expired or revoked refresh token");
            return Err(GrantError::Protocol(OAuthError::invalid_grant()));
        };

        if consumed.client_id != form.client_id {
            tracing::debug!("token rejected: refresh token client mismatch");
            return Err(GrantError::Protocol(OAuthError::invalid_grant()));
        }

        let access_token = match self
            .tokens
            .issue_access_token(&consumed.subject, &consumed.client_id, &consumed.scope, None)
            .await
        {
            Ok(token) => token,
            Err(err) => {
                // Same retry contract as the code grant: a transient
                // authority failure must not leave the client locked out,
                // so the consumed token goes back unrevoked.
                let err = GrantError::from(err);
                if matches!(err, GrantError::Unavailable) {
                    let mut restored = consumed;
                    restored.revoked = false;
                    self.store.write().await.insert_refresh_token(restored);
                }
                return Err(err);
            }
        };

        let successor = self
            .mint_refresh_token(&consumed.subject, &consumed.client_id, &consumed.scope)
            .await;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.tokens.access_token_lifetime_secs(),
            refresh_token: Some(successor),
            scope: (!consumed.scope.is_empty()).then(|| consumed.scope.clone()),
            id_token: None,
        })
    }

    /// RFC 7662 introspection. Invalid tokens report a bare
    /// `active: false`; only infrastructure failure propagates.
    pub async fn introspect(&self, token: &str) -> Result<IntrospectionResponse, TokenError> {
        let claims = match self.tokens.validate_access_token(token).await {
            Ok(claims) => claims,
            Err(TokenError::Invalid) => return Ok(IntrospectionResponse::inactive()),
            Err(err) => return Err(err),
        };

        Ok(IntrospectionResponse {
            active: true,
            client_id: claims.client_id.clone(),
            username: Some(claims.sub.clone()),
            scope: claims.scope.clone(),
            token_type: Some("Bearer".to_string()),
            exp: Some(claims.exp),
            iat: Some(claims.iat),
            nbf: Some(claims.nbf),
            sub: Some(claims.sub),
            aud: Some(claims.aud.join(" ")),
            iss: Some(claims.iss),
            jti: Some(claims.jti),
        })
    }

    async fn mint_refresh_token(&self, subject: &str, client_id: &str, scope: &str) -> String {
        let now = Utc::now();
        let ttl = ChronoDuration::from_std(self.config.refresh_token_ttl)
            .unwrap_or_else(|_| ChronoDuration::days(7));
        let token = RefreshToken {
            token: Uuid::new_v4().to_string(),
            subject: subject.to_string(),
            client_id: client_id.to_string(),
            scope: scope.to_string(),
            issued_at: now,
            expires_at: now + ttl,
            revoked: false,
        };
        let value = token.token.clone();
        self.store.write().await.insert_refresh_token(token);
        value
    }

    fn is_valid_scope(&self, scope: &str) -> bool {
        scope
            .split_whitespace()
            .all(|requested| self.config.supported_scopes.iter().any(|s| s == requested))
    }
}

/// Constant-time comparison of `S256(code_verifier)` against the stored
/// challenge.
fn verify_pkce(code_challenge: &str, code_verifier: &str) -> bool {
    let digest = Sha256::digest(code_verifier.as_bytes());
    let computed = Base64UrlUnpadded::encode_string(&digest);
    ring::constant_time::verify_slices_are_equal(computed.as_bytes(), code_challenge.as_bytes())
        .is_ok()
}
