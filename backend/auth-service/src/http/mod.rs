/// HTTP API for the auth service
///
/// Public JSON endpoints under `/api/v1/auth` plus `/health`. Protected
/// routes take the account from an `Authorization: Bearer <jwt>` header.
/// Errors render as `{"error": "..."}` with the status from
/// [`crate::error::AuthError::status_code`].
mod extract;
mod handlers;

pub use extract::{AuthenticatedAccount, BearerToken};

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::services::{AccountService, OAuthService};

/// Shared HTTP server state
#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,
    pub oauth: Option<OAuthService>,
    pub trust_proxy_headers: bool,
}

/// Build the HTTP router with all auth endpoints
pub fn build_router(state: AppState) -> Router {
    let state = Arc::new(state);

    let auth = Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/refresh", post(handlers::refresh))
        .route(
            "/verify-email",
            get(handlers::verify_email_link).post(handlers::verify_email),
        )
        .route("/resend-verification", post(handlers::resend_verification))
        .route("/logout", post(handlers::logout))
        .route("/profile", get(handlers::profile))
        .route("/oauth/login", get(handlers::oauth_login))
        .route("/oauth/callback", get(handlers::oauth_callback));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1/auth", auth)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
pub async fn start_http_server<F>(
    state: AppState,
    host: &str,
    port: u16,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Starting HTTP API server on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenSettings;
    use crate::db::InMemoryCredentialStore;
    use crate::security::JwtKeys;
    use crate::services::email::MockNotificationSink;
    use crate::services::TokenLifecycle;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    type TestApp = (
        Router,
        mpsc::UnboundedReceiver<String>,
        Arc<InMemoryCredentialStore>,
    );

    fn test_router() -> TestApp {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sink = MockNotificationSink::new();
        sink.expect_send_verification_link()
            .returning(move |_, token| {
                let _ = tx.send(token.to_string());
                Ok(())
            });

        let store = Arc::new(InMemoryCredentialStore::new());
        let tokens = TokenLifecycle::new(
            store.clone(),
            JwtKeys::from_secret(b"router-test-secret-00000000000000").unwrap(),
            TokenSettings::default(),
        );
        let state = AppState {
            accounts: AccountService::new(store.clone(), tokens, Arc::new(sink)),
            oauth: None,
            trust_proxy_headers: false,
        };
        (build_router(state), rx, store)
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response: Response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn with_bearer(method: Method, uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _, _) = test_router();
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_register_verify_login_profile_logout() {
        let (router, mut rx, _) = test_router();
        let register = json!({
            "email": "a@x.com",
            "password": "pw123456",
            "first_name": "A",
            "last_name": "B",
        });

        let (status, body) = send(&router, post_json("/api/v1/auth/register", register.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["account"]["email"], "a@x.com");
        assert!(body["account"].get("password_hash").is_none());

        let (status, _) = send(&router, post_json("/api/v1/auth/register", register)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let credentials = json!({ "email": "a@x.com", "password": "pw123456" });
        let (status, body) = send(&router, post_json("/api/v1/auth/login", credentials.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Email not verified");

        let token = rx.recv().await.unwrap();
        let uri = format!("/api/v1/auth/verify-email?token={token}");
        let (status, _) = send(&router, Request::get(uri.as_str()).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&router, Request::get(uri.as_str()).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::GONE);

        let (status, session) = send(&router, post_json("/api/v1/auth/login", credentials)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["token_type"], "Bearer");
        assert_eq!(session["user"]["email_verified"], true);
        let access = session["access_token"].as_str().unwrap().to_string();

        let (status, profile) = send(
            &router,
            with_bearer(Method::GET, "/api/v1/auth/profile", &access),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["name"], "A B");

        let (status, _) = send(
            &router,
            with_bearer(Method::POST, "/api/v1/auth/logout", &access),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &router,
            with_bearer(Method::GET, "/api/v1/auth/profile", &access),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid, expired, or revoked token");
    }

    #[tokio::test]
    async fn test_refresh_rotation_over_http() {
        let (router, mut rx, _) = test_router();
        send(
            &router,
            post_json(
                "/api/v1/auth/register",
                json!({"email": "r@x.com", "password": "pw123456", "first_name": "R", "last_name": "X"}),
            ),
        )
        .await;
        let token = rx.recv().await.unwrap();
        send(&router, post_json("/api/v1/auth/verify-email", json!({ "token": token }))).await;

        let (_, session) = send(
            &router,
            post_json("/api/v1/auth/login", json!({"email": "r@x.com", "password": "pw123456"})),
        )
        .await;
        let refresh = json!({ "refresh_token": session["refresh_token"] });

        let (status, rotated) = send(&router, post_json("/api/v1/auth/refresh", refresh.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(rotated["refresh_token"], session["refresh_token"]);

        let (status, _) = send(&router, post_json("/api/v1/auth/refresh", refresh)).await;
        assert_eq!(status, StatusCode::GONE);
    }

    #[tokio::test]
    async fn test_logout_is_idempotent_and_always_audited() {
        let (router, mut rx, store) = test_router();
        send(
            &router,
            post_json(
                "/api/v1/auth/register",
                json!({"email": "l@x.com", "password": "pw123456", "first_name": "L", "last_name": "X"}),
            ),
        )
        .await;
        let token = rx.recv().await.unwrap();
        send(&router, post_json("/api/v1/auth/verify-email", json!({ "token": token }))).await;
        let (_, session) = send(
            &router,
            post_json("/api/v1/auth/login", json!({"email": "l@x.com", "password": "pw123456"})),
        )
        .await;
        let access = session["access_token"].as_str().unwrap().to_string();

        for _ in 0..2 {
            let (status, _) = send(
                &router,
                with_bearer(Method::POST, "/api/v1/auth/logout", &access),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, _) = send(
            &router,
            with_bearer(Method::POST, "/api/v1/auth/logout", "garbage"),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &router,
            Request::post("/api/v1/auth/logout").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let logouts: Vec<_> = store
            .auth_logs()
            .into_iter()
            .filter(|log| log.action == "logout")
            .collect();
        assert_eq!(logouts.len(), 4);
        assert_eq!(logouts.iter().filter(|log| log.success).count(), 2);
        assert!(logouts[2..].iter().all(|log| log.user_id.is_none()));
    }

    #[tokio::test]
    async fn test_protected_routes_require_bearer() {
        let (router, _, _) = test_router();
        let (status, _) = send(
            &router,
            Request::get("/api/v1/auth/profile").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &router,
            with_bearer(Method::GET, "/api/v1/auth/profile", "garbage"),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_oauth_routes_without_provider() {
        let (router, _, _) = test_router();
        let (status, _) = send(
            &router,
            Request::get("/api/v1/auth/oauth/login").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
