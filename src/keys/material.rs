// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

//! Public key material published by the signing authority.

use base64ct::{Base64UrlUnpadded, Encoding};

use crate::models::{Jwk, JwkSet};

use super::error::KeyError;

/// Length of an uncompressed P-256 point: `0x04 || x (32) || y (32)`.
const UNCOMPRESSED_POINT_LEN: usize = 65;

/// One key version valid for signature verification.
#[derive(Debug, Clone)]
pub struct VerificationKey {
    pub version: u32,
    /// Key identifier embedded in JWT headers, `{key-name}-v{version}`.
    pub kid: String,
    /// P-256 x coordinate, base64url without padding.
    pub x: String,
    /// P-256 y coordinate, base64url without padding.
    pub y: String,
}

/// The authority's published key set at one point in time.
///
/// Exactly one version is current for signing; all listed versions are
/// valid for verification. Versions are ordered integers, never inferred
/// from map iteration order.
#[derive(Debug, Clone)]
pub struct KeySet {
    current_version: u32,
    keys: Vec<VerificationKey>,
}

impl KeySet {
    /// Build a key set, verifying the current version is present.
    pub fn new(current_version: u32, mut keys: Vec<VerificationKey>) -> Result<Self, KeyError> {
        if keys.is_empty() {
            return Err(KeyError::malformed("key set contains no keys"));
        }
        if !keys.iter().any(|key| key.version == current_version) {
            return Err(KeyError::malformed(format!(
                "current key version {current_version} missing from key set"
            )));
        }
        keys.sort_by_key(|key| key.version);
        Ok(Self {
            current_version,
            keys,
        })
    }

    /// The key currently used for signing.
    pub fn current(&self) -> &VerificationKey {
        // Presence is checked in the constructor.
        self.keys
            .iter()
            .find(|key| key.version == self.current_version)
            .expect("current version verified at construction")
    }

    /// Look up a verification key by its key identifier.
    pub fn find(&self, kid: &str) -> Option<&VerificationKey> {
        self.keys.iter().find(|key| key.kid == kid)
    }

    /// Look up a verification key by its version number.
    pub fn find_version(&self, version: u32) -> Option<&VerificationKey> {
        self.keys.iter().find(|key| key.version == version)
    }

    /// Export every verification-valid key as a JWK Set.
    pub fn to_jwks(&self) -> JwkSet {
        JwkSet {
            keys: self
                .keys
                .iter()
                .map(|key| Jwk {
                    kty: "EC".to_string(),
                    crv: "P-256".to_string(),
                    kid: key.kid.clone(),
                    use_: "sig".to_string(),
                    alg: "ES256".to_string(),
                    x: key.x.clone(),
                    y: key.y.clone(),
                })
                .collect(),
        }
    }
}

/// Key identifier for a named key at a given version.
pub fn key_id(name: &str, version: u32) -> String {
    format!("{name}-v{version}")
}

/// Extract base64url coordinates from an uncompressed P-256 point.
pub fn point_coordinates(point: &[u8]) -> Result<(String, String), KeyError> {
    if point.len() != UNCOMPRESSED_POINT_LEN || point[0] != 0x04 {
        return Err(KeyError::malformed("public key is not an uncompressed P-256 point"));
    }
    let x = Base64UrlUnpadded::encode_string(&point[1..33]);
    let y = Base64UrlUnpadded::encode_string(&point[33..65]);
    Ok((x, y))
}

/// Extract coordinates from a PEM-encoded SubjectPublicKeyInfo document,
/// as returned by the Vault Transit key-read endpoint.
///
/// The uncompressed point is the trailing 65 bytes of the DER document;
/// the ASN.1 prefix is fixed for P-256 keys.
pub fn spki_coordinates(pem_text: &str) -> Result<(String, String), KeyError> {
    let doc = pem::parse(pem_text)
        .map_err(|err| KeyError::malformed(format!("invalid PEM public key: {err}")))?;
    let der = doc.contents();
    if der.len() < UNCOMPRESSED_POINT_LEN {
        return Err(KeyError::malformed("public key document too short"));
    }
    point_coordinates(&der[der.len() - UNCOMPRESSED_POINT_LEN..])
}
