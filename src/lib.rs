// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

//! OAuth 2.1 authorization server with externally signed JWTs.
//!
//! The server implements the authorization-code flow with mandatory
//! PKCE (S256 only), refresh token rotation, RFC 7662 introspection and
//! a published JWK Set. Access tokens are ES256 JWTs whose signatures
//! come from an external authority (Vault Transit in production, an
//! in-process signer in development); the private key never enters this
//! process.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `oauth` - OAuth 2.1 protocol state machine
//! - `keys` - Signing authorities, key cache and key material
//! - `tokens` - JWT issuance and validation
//! - `store` - In-memory code and refresh token store
//! - `rotation` / `sweeper` - Background maintenance tasks

pub mod api;
pub mod config;
pub mod error;
pub mod keys;
pub mod metrics;
pub mod models;
pub mod oauth;
pub mod rotation;
pub mod state;
pub mod store;
pub mod sweeper;
pub mod tokens;
