// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

//! In-memory store for authorization codes and refresh tokens.
//!
//! The store is the system of record for consumption state. It is held
//! behind `Arc<RwLock<_>>` in [`crate::state::AppState`]; every consume
//! operation runs its full check-and-mark under one write-lock hold, so
//! concurrent redemption attempts for the same code or token have
//! exactly one winner.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{AuthorizationCode, RefreshToken};

#[derive(Default)]
pub struct TokenStore {
    codes: HashMap<String, AuthorizationCode>,
    refresh_tokens: HashMap<String, RefreshToken>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_code(&mut self, code: AuthorizationCode) {
        self.codes.insert(code.code.clone(), code);
    }

    /// Atomically take an authorization code.
    ///
    /// The entry is removed unconditionally, so the code is spent even
    /// when the caller's subsequent PKCE or binding checks fail; a
    /// replayed code always misses. Expired codes are dropped and
    /// reported as absent.
    pub fn consume_code(&mut self, code: &str, now: DateTime<Utc>) -> Option<AuthorizationCode> {
        let mut entry = self.codes.remove(code)?;
        if entry.consumed || entry.is_expired(now) {
            return None;
        }
        entry.consumed = true;
        Some(entry)
    }

    pub fn insert_refresh_token(&mut self, token: RefreshToken) {
        self.refresh_tokens.insert(token.token.clone(), token);
    }

    /// Atomically consume a refresh token for rotation-on-use.
    ///
    /// A consumable token is marked revoked in place (the tombstone makes
    /// replay fail until the sweeper removes it) and a copy is returned.
    pub fn consume_refresh_token(
        &mut self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Option<RefreshToken> {
        let entry = self.refresh_tokens.get_mut(token)?;
        if entry.revoked || entry.is_expired(now) {
            return None;
        }
        entry.revoked = true;
        Some(entry.clone())
    }

    /// Explicitly revoke a refresh token. Returns false when unknown.
    pub fn revoke_refresh_token(&mut self, token: &str) -> bool {
        match self.refresh_tokens.get_mut(token) {
            Some(entry) => {
                entry.revoked = true;
                true
            }
            None => false,
        }
    }

    /// Remove expired codes and expired or revoked refresh tokens.
    /// Returns the number of removed entries of each kind.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> (usize, usize) {
        let codes_before = self.codes.len();
        self.codes.retain(|_, code| !code.is_expired(now));

        let tokens_before = self.refresh_tokens.len();
        self.refresh_tokens
            .retain(|_, token| !token.revoked && !token.is_expired(now));

        (
            codes_before - self.codes.len(),
            tokens_before - self.refresh_tokens.len(),
        )
    }

    #[cfg(test)]
    pub fn len(&self) -> (usize, usize) {
        (self.codes.len(), self.refresh_tokens.len())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn code(value: &str, expires_in: Duration) -> AuthorizationCode {
        let now = Utc::now();
        AuthorizationCode {
            code: value.to_string(),
            client_id: "demo".into(),
            redirect_uri: "http://localhost/cb".into(),
            scope: String::new(),
            state: None,
            code_challenge: "challenge".into(),
            code_challenge_method: "S256".into(),
            nonce: None,
            subject: "demo-user".into(),
            issued_at: now,
            expires_at: now + expires_in,
            consumed: false,
        }
    }

    fn refresh(value: &str, expires_in: Duration) -> RefreshToken {
        let now = Utc::now();
        RefreshToken {
            token: value.to_string(),
            subject: "user-1".into(),
            client_id: "demo".into(),
            scope: String::new(),
            issued_at: now,
            expires_at: now + expires_in,
            revoked: false,
        }
    }

    #[test]
    fn code_is_consumed_exactly_once() {
        let mut store = TokenStore::new();
        store.insert_code(code("abc", Duration::minutes(10)));

        let first = store.consume_code("abc", Utc::now());
        assert!(first.is_some());
        assert!(first.unwrap().consumed);
        assert!(store.consume_code("abc", Utc::now()).is_none());
    }

    #[test]
    fn expired_code_is_not_redeemable() {
        let mut store = TokenStore::new();
        store.insert_code(code("abc", Duration::minutes(10)));
        let late = Utc::now() + Duration::minutes(11);
        assert!(store.consume_code("abc", late).is_none());
        // The expired entry is dropped, not resurrected.
        assert!(store.consume_code("abc", Utc::now()).is_none());
    }

    #[test]
    fn consumed_refresh_token_cannot_be_replayed() {
        let mut store = TokenStore::new();
        store.insert_refresh_token(refresh("rt-1", Duration::days(7)));

        assert!(store.consume_refresh_token("rt-1", Utc::now()).is_some());
        assert!(store.consume_refresh_token("rt-1", Utc::now()).is_none());
    }

    #[test]
    fn revoked_refresh_token_is_dead() {
        let mut store = TokenStore::new();
        store.insert_refresh_token(refresh("rt-1", Duration::days(7)));

        assert!(store.revoke_refresh_token("rt-1"));
        assert!(store.consume_refresh_token("rt-1", Utc::now()).is_none());
        assert!(!store.revoke_refresh_token("unknown"));
    }

    #[test]
    fn expired_refresh_token_is_not_consumable() {
        let mut store = TokenStore::new();
        store.insert_refresh_token(refresh("rt-1", Duration::days(7)));
        let late = Utc::now() + Duration::days(8);
        assert!(store.consume_refresh_token("rt-1", late).is_none());
    }

    #[test]
    fn sweep_removes_expired_and_revoked_entries() {
        let mut store = TokenStore::new();
        store.insert_code(code("live", Duration::minutes(10)));
        store.insert_code(code("dead", Duration::minutes(-1)));
        store.insert_refresh_token(refresh("live", Duration::days(7)));
        store.insert_refresh_token(refresh("dead", Duration::days(-1)));
        store.insert_refresh_token(refresh("revoked", Duration::days(7)));
        store.revoke_refresh_token("revoked");

        let (codes, tokens) = store.sweep(Utc::now());
        assert_eq!(codes, 1);
        assert_eq!(tokens, 2);
        assert_eq!(store.len(), (1, 1));
    }
}
