// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

//! In-process signing authority for development and tests.
//!
//! Generates ECDSA P-256 keypairs in memory. Signatures use the fixed
//! (raw `r || s`) encoding, which is exactly the JWS ES256 format, so
//! tokens signed here verify against the published JWKS the same way
//! Transit-signed tokens do.
//!
//! WARNING: keys do not survive a restart. Production deployments must
//! configure `VAULT_ADDR`.

use std::sync::RwLock;

use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};

use super::authority::{Signature, SigningAuthority};
use super::error::KeyError;
use super::material::{key_id, point_coordinates, KeySet, VerificationKey};

/// Key name used in generated key identifiers (`local-dev-key-v{N}`).
const KEY_NAME: &str = "local-dev-key";

struct LocalKey {
    version: u32,
    pair: EcdsaKeyPair,
    /// Uncompressed public point, kept for key-set export.
    point: Vec<u8>,
}

/// Signing authority holding its keys in process memory.
pub struct LocalAuthority {
    rng: SystemRandom,
    keys: RwLock<Vec<LocalKey>>,
}

impl LocalAuthority {
    pub fn new() -> Result<Self, KeyError> {
        let rng = SystemRandom::new();
        let first = Self::generate(&rng, 1)?;
        Ok(Self {
            rng,
            keys: RwLock::new(vec![first]),
        })
    }

    fn generate(rng: &SystemRandom, version: u32) -> Result<LocalKey, KeyError> {
        let document = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, rng)
            .map_err(|_| KeyError::upstream("keypair generation failed"))?;
        let pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, document.as_ref(), rng)
            .map_err(|_| KeyError::upstream("generated keypair rejected"))?;
        let point = pair.public_key().as_ref().to_vec();
        Ok(LocalKey {
            version,
            pair,
            point,
        })
    }
}

#[async_trait]
impl SigningAuthority for LocalAuthority {
    async fn sign(&self, payload: &[u8]) -> Result<Signature, KeyError> {
        let keys = self.keys.read().expect("local key lock poisoned");
        let current = keys.last().expect("at least one local key");
        let signature = current
            .pair
            .sign(&self.rng, payload)
            .map_err(|_| KeyError::upstream("local signing failed"))?;
        Ok(Signature {
            signature: Base64UrlUnpadded::encode_string(signature.as_ref()),
            key_version: current.version,
        })
    }

    async fn fetch_key_set(&self) -> Result<KeySet, KeyError> {
        let keys = self.keys.read().expect("local key lock poisoned");
        let current_version = keys.last().expect("at least one local key").version;
        let mut verification = Vec::with_capacity(keys.len());
        for key in keys.iter() {
            let (x, y) = point_coordinates(&key.point)?;
            verification.push(VerificationKey {
                version: key.version,
                kid: key_id(KEY_NAME, key.version),
                x,
                y,
            });
        }
        KeySet::new(current_version, verification)
    }

    async fn rotate(&self) -> Result<(), KeyError> {
        let next_version = {
            let keys = self.keys.read().expect("local key lock poisoned");
            keys.last().expect("at least one local key").version + 1
        };
        let generated = Self::generate(&self.rng, next_version)?;
        self.keys
            .write()
            .expect("local key lock poisoned")
            .push(generated);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_returns_raw_es256_signature() {
        let authority = LocalAuthority::new().unwrap();
        let signed = authority.sign(b"header.claims").await.unwrap();
        // Raw r || s is 64 bytes, 86 base64url characters unpadded.
        assert_eq!(signed.signature.len(), 86);
        assert!(!signed.signature.contains('='));
        assert_eq!(signed.key_version, 1);
    }

    #[tokio::test]
    async fn rotation_keeps_old_versions_verifiable() {
        let authority = LocalAuthority::new().unwrap();
        authority.rotate().await.unwrap();
        let set = authority.fetch_key_set().await.unwrap();
        assert_eq!(set.current().version, 2);
        assert!(set.find("local-dev-key-v1").is_some());
    }
}
