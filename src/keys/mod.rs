// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

//! # Key Management
//!
//! JWT signing is delegated to an external key authority; private key
//! material never enters this process.
//!
//! ## Components
//!
//! - [`SigningAuthority`] - the seam between the token service and the
//!   authority: sign bytes, fetch the public key set, rotate.
//! - [`TransitClient`] - production implementation backed by the Vault
//!   Transit engine (`ecdsa-p256` key type, JWS-marshaled signatures).
//! - [`LocalAuthority`] - in-process ECDSA P-256 signer used when
//!   `VAULT_ADDR` is unset (development) and by tests.
//! - [`KeyCache`] - time-bounded cache of the public key set with
//!   single-flight refresh.
//!
//! ## Key versions
//!
//! Versions are explicit integers. The numeric maximum is the current
//! signing key; every version at or above the authority's minimum
//! verification version stays valid for verification, so tokens signed
//! just before a rotation validate until their own `exp`.

pub mod authority;
pub mod cache;
pub mod error;
pub mod local;
pub mod material;
pub mod transit;

pub use authority::{Signature, SigningAuthority};
pub use cache::KeyCache;
pub use error::KeyError;
pub use local::LocalAuthority;
pub use material::{KeySet, VerificationKey};
pub use transit::TransitClient;
