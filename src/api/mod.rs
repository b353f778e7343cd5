// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{
        IntrospectionForm, IntrospectionResponse, Jwk, JwkSet, OAuthError, TokenForm,
        TokenResponse,
    },
    state::AppState,
};

pub mod authorize;
pub mod health;
pub mod introspect;
pub mod jwks;
pub mod metrics;
pub mod token;

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/authorize", get(authorize::authorize))
        .route("/token", post(token::token))
        .route("/introspect", post(introspect::introspect))
        .route("/.well-known/jwks.json", get(jwks::jwks))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/metrics", get(metrics::metrics))
        .with_state(state);

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        authorize::authorize,
        token::token,
        introspect::introspect,
        jwks::jwks,
        health::health,
        health::liveness,
        metrics::metrics
    ),
    components(
        schemas(
            TokenForm,
            TokenResponse,
            OAuthError,
            IntrospectionForm,
            IntrospectionResponse,
            Jwk,
            JwkSet,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "OAuth", description = "Authorization, token exchange and introspection"),
        (name = "Keys", description = "Published verification keys"),
        (name = "Health", description = "Probes and operational metrics")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::models::{IntrospectionResponse, TokenResponse};

    use super::*;

    // RFC 7636 appendix B test vector.
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    fn authorize_uri() -> String {
        format!(
            "/authorize?response_type=code&client_id=demo\
             &redirect_uri=http%3A%2F%2Flocalhost%2Fcb&scope=openid\
             &state=xyz&code_challenge={CHALLENGE}&code_challenge_method=S256"
        )
    }

    fn form_request(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn full_flow_over_http() {
        let app = router(AppState::for_tests());

        // Authorize: expect a 302 carrying the code.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(authorize_uri())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        let redirect = url::Url::parse(location).unwrap();
        let code = redirect
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned())
            .expect("redirect carries a code");

        // Exchange the code.
        let body = format!(
            "grant_type=authorization_code&code={code}\
             &redirect_uri=http%3A%2F%2Flocalhost%2Fcb&client_id=demo\
             &code_verifier={VERIFIER}"
        );
        let response = app
            .clone()
            .oneshot(form_request("/token", body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        let tokens: TokenResponse = json_body(response).await;
        assert_eq!(tokens.token_type, "Bearer");
        assert!(tokens.id_token.is_some());

        // Replay fails with the uniform error.
        let response = app
            .clone()
            .oneshot(form_request("/token", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Introspect the access token using itself as caller credential.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/introspect")
                    .header(
                        header::AUTHORIZATION,
                        format!("Bearer {}", tokens.access_token),
                    )
                    .header(
                        header::CONTENT_TYPE,
                        "application/x-www-form-urlencoded",
                    )
                    .body(Body::from(format!("token={}", tokens.access_token)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let introspection: IntrospectionResponse = json_body(response).await;
        assert!(introspection.active);
        assert_eq!(introspection.sub.as_deref(), Some("demo-user"));
    }

    #[tokio::test]
    async fn well_known_endpoints_answer() {
        let app = router(AppState::for_tests());

        for uri in ["/.well-known/jwks.json", "/health", "/health/live", "/metrics"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "GET {uri}");
        }
    }

    #[tokio::test]
    async fn introspection_requires_authorization() {
        let app = router(AppState::for_tests());

        let response = app
            .oneshot(form_request("/introspect", "token=abc".into()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
