// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};

use crate::metrics::{record_token_issued, record_token_request};
use crate::models::{OAuthError, TokenForm, TokenResponse};
use crate::oauth::GrantError;
use crate::state::AppState;

/// Token endpoint (RFC 6749 §4.1.3 and §6).
///
/// Protocol failures answer `400` (`401` for `invalid_client`);
/// infrastructure failures answer `503 server_error` and are safe to
/// retry.
#[utoipa::path(
    post,
    path = "/token",
    request_body(content = TokenForm, content_type = "application/x-www-form-urlencoded"),
    tag = "OAuth",
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 400, description = "Protocol error", body = OAuthError),
        (status = 401, description = "Client authentication failed", body = OAuthError),
        (status = 503, description = "Signing authority unavailable", body = OAuthError)
    )
)]
pub async fn token(State(state): State<AppState>, Form(form): Form<TokenForm>) -> Response {
    match state.oauth.token(&form).await {
        Ok(response) => {
            record_token_request(&form.grant_type, "success");
            record_token_issued("access_token");
            if response.refresh_token.is_some() {
                record_token_issued("refresh_token");
            }
            if response.id_token.is_some() {
                record_token_issued("id_token");
            }
            no_store((StatusCode::OK, Json(response)).into_response())
        }
        Err(GrantError::Protocol(err)) => {
            record_token_request(&form.grant_type, "error");
            let status = if err.error == "invalid_client" {
                StatusCode::UNAUTHORIZED
            } else {
                StatusCode::BAD_REQUEST
            };
            no_store((status, Json(err)).into_response())
        }
        Err(GrantError::Unavailable) => {
            record_token_request(&form.grant_type, "error");
            no_store(
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(OAuthError::server_error()),
                )
                    .into_response(),
            )
        }
    }
}

// RFC 6749 §5.1 forbids caching token responses.
fn no_store(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_grant_type_is_bad_request() {
        let state = AppState::for_tests();
        let form = TokenForm {
            grant_type: "client_credentials".into(),
            ..TokenForm::default()
        };

        let response = token(State(state), Form(form)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            HeaderValue::from_static("no-store")
        );
    }

    #[tokio::test]
    async fn unknown_client_is_unauthorized() {
        let state = AppState::for_tests();
        let form = TokenForm {
            grant_type: "authorization_code".into(),
            client_id: "intruder".into(),
            code: "whatever".into(),
            code_verifier: "whatever".into(),
            ..TokenForm::default()
        };

        let response = token(State(state), Form(form)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
