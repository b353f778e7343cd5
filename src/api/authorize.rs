// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use url::Url;

use crate::metrics::record_authorization_request;
use crate::models::{AuthorizeParams, OAuthError};
use crate::state::AppState;

/// Authorization endpoint (RFC 6749 §4.1.1, PKCE per RFC 7636).
///
/// Successful requests answer `302 Found` to the registered redirect
/// URI with `code` (and `state`) appended. Failures redirect with
/// `error`/`error_description` only once the client and redirect URI
/// have been validated; before that they answer `400` with a JSON body
/// so an attacker-supplied URI never receives a redirect.
#[utoipa::path(
    get,
    path = "/authorize",
    params(AuthorizeParams),
    tag = "OAuth",
    responses(
        (status = 302, description = "Redirect with authorization code or error"),
        (status = 400, description = "Request rejected before redirect validation", body = OAuthError)
    )
)]
pub async fn authorize(
    State(state): State<AppState>,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    match state.oauth.authorize(&params).await {
        Ok(code) => {
            let mut location = match Url::parse(&code.redirect_uri) {
                Ok(url) => url,
                Err(err) => {
                    tracing::error!(error = %err, "registered redirect_uri does not parse");
                    record_authorization_request("error");
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(OAuthError::invalid_request("redirect_uri is not a valid URL")),
                    )
                        .into_response();
                }
            };
            {
                let mut query = location.query_pairs_mut();
                query.append_pair("code", &code.code);
                if let Some(ref s) = code.state {
                    query.append_pair("state", s);
                }
            }
            record_authorization_request("success");
            found(location.as_str())
        }
        Err(err) if err.redirectable => {
            record_authorization_request("denied");
            // The redirect URI was validated against the registered
            // list before the error became redirectable.
            match Url::parse(&params.redirect_uri) {
                Ok(mut location) => {
                    {
                        let mut query = location.query_pairs_mut();
                        query.append_pair("error", &err.body.error);
                        if let Some(ref description) = err.body.error_description {
                            query.append_pair("error_description", description);
                        }
                        if let Some(ref s) = err.body.state {
                            query.append_pair("state", s);
                        }
                    }
                    found(location.as_str())
                }
                Err(_) => (StatusCode::BAD_REQUEST, Json(err.body)).into_response(),
            }
        }
        Err(err) => {
            record_authorization_request("denied");
            (StatusCode::BAD_REQUEST, Json(err.body)).into_response()
        }
    }
}

// 302 rather than axum's `Redirect::to`, which answers 303.
fn found(location: &str) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, location.to_string())],
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> AuthorizeParams {
        AuthorizeParams {
            response_type: "code".into(),
            client_id: "demo".into(),
            redirect_uri: "http://localhost/cb".into(),
            scope: "openid".into(),
            state: Some("abc".into()),
            code_challenge: "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".into(),
            code_challenge_method: "S256".into(),
            nonce: None,
        }
    }

    #[tokio::test]
    async fn success_redirects_with_code_and_state() {
        let state = AppState::for_tests();
        let response = authorize(State(state), Query(params())).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("http://localhost/cb?"));
        assert!(location.contains("code="));
        assert!(location.contains("state=abc"));
    }

    #[tokio::test]
    async fn denied_request_redirects_with_error() {
        let state = AppState::for_tests();
        let mut bad = params();
        bad.code_challenge_method = "plain".into();
        let response = authorize(State(state), Query(bad)).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.contains("error=invalid_request"));
        assert!(location.contains("state=abc"));
    }

    #[tokio::test]
    async fn unregistered_redirect_uri_gets_json_error() {
        let state = AppState::for_tests();
        let mut bad = params();
        bad.redirect_uri = "http://evil.example/cb".into();
        let response = authorize(State(state), Query(bad)).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(header::LOCATION).is_none());
    }
}
