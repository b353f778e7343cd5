// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

use axum::{
    extract::State,
    http::{header, HeaderMap},
    Form, Json,
};

use crate::error::ApiError;
use crate::metrics::record_introspection_request;
use crate::models::{IntrospectionForm, IntrospectionResponse};
use crate::state::AppState;
use crate::tokens::TokenError;

/// Introspection endpoint (RFC 7662).
///
/// The caller authenticates with a valid bearer access token of its
/// own; RFC 7662 §2.1 requires introspection to be authorized so the
/// endpoint cannot be used as a token oracle. The introspected token is
/// reported as a bare `active: false` whenever it fails validation.
#[utoipa::path(
    post,
    path = "/introspect",
    request_body(content = IntrospectionForm, content_type = "application/x-www-form-urlencoded"),
    tag = "OAuth",
    responses(
        (status = 200, description = "Introspection result", body = IntrospectionResponse),
        (status = 400, description = "Missing token parameter"),
        (status = 401, description = "Caller is not authorized"),
        (status = 503, description = "Key material unavailable")
    )
)]
pub async fn introspect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<IntrospectionForm>,
) -> Result<Json<IntrospectionResponse>, ApiError> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("Bearer token required"))?;

    match state.tokens.validate_access_token(bearer).await {
        Ok(_) => {}
        Err(TokenError::Invalid) => {
            return Err(ApiError::unauthorized("Invalid bearer token"));
        }
        Err(err) => {
            tracing::warn!(error = %err, "caller validation unavailable");
            return Err(ApiError::unavailable("Key material unavailable"));
        }
    }

    if form.token.is_empty() {
        return Err(ApiError::bad_request("token parameter is required"));
    }

    match state.oauth.introspect(&form.token).await {
        Ok(response) => {
            record_introspection_request(if response.active { "active" } else { "inactive" });
            Ok(Json(response))
        }
        Err(err) => {
            tracing::warn!(error = %err, "introspection unavailable");
            Err(ApiError::unavailable("Key material unavailable"))
        }
    }
}
