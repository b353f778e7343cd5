// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

//! The signing authority seam.

use async_trait::async_trait;

use super::error::KeyError;
use super::material::KeySet;

/// A signature produced by the authority.
#[derive(Debug, Clone)]
pub struct Signature {
    /// JWS signature, base64url-encoded without padding, ready to
    /// append as the third JWT segment.
    pub signature: String,
    /// Key version that actually signed. A rotation can land between a
    /// cached key-set read and the sign call, so callers must place the
    /// kid for this version in the signed header, not the version they
    /// read beforehand.
    pub key_version: u32,
}

/// External authority that signs JWT payloads and manages key versions.
///
/// Implementations must never expose private key material to callers.
/// Failures are surfaced, not retried here; callers decide retry policy.
#[async_trait]
pub trait SigningAuthority: Send + Sync {
    /// Sign `payload` under the current key version.
    async fn sign(&self, payload: &[u8]) -> Result<Signature, KeyError>;

    /// Fetch the current public key set, including retired versions that
    /// are still valid for verification.
    async fn fetch_key_set(&self) -> Result<KeySet, KeyError>;

    /// Create a new key version. Previously issued tokens stay
    /// verifiable under their original version.
    async fn rotate(&self) -> Result<(), KeyError>;
}
