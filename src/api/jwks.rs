// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::ApiError;
use crate::models::JwkSet;
use crate::state::AppState;

/// Published verification keys (RFC 7517).
///
/// Serves the current key plus every predecessor still valid for
/// verification, so tokens signed before a rotation keep verifying.
#[utoipa::path(
    get,
    path = "/.well-known/jwks.json",
    tag = "Keys",
    responses(
        (status = 200, description = "Current JWK Set", body = JwkSet),
        (status = 503, description = "Key material unavailable")
    )
)]
pub async fn jwks(State(state): State<AppState>) -> Result<Response, ApiError> {
    match state.tokens.jwks().await {
        Ok(set) => Ok((
            [(header::CACHE_CONTROL, "public, max-age=3600")],
            Json(set),
        )
            .into_response()),
        Err(err) => {
            tracing::warn!(error = %err, "jwks unavailable");
            Err(ApiError::unavailable("Key material unavailable"))
        }
    }
}
