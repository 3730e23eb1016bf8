//! Authentication and metrics middleware for API routes.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use retrack_core::config::AuthMethod;

use crate::metrics::{
    normalize_path, AUTH_FAILURES_TOTAL, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION,
};
use crate::state::AppState;

/// Metrics middleware that tracks HTTP request duration and counts.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    HTTP_REQUESTS_IN_FLIGHT.inc();

    let response = next.run(request).await;

    HTTP_REQUESTS_IN_FLIGHT.dec();

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path, &status])
        .observe(duration);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

/// Authentication middleware validating requests against the configured
/// API key.
///
/// The key is accepted either as `Authorization: Bearer <key>` or in the
/// `X-API-Key` header. With auth method `none` every request passes.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth = &state.config().auth;

    if auth.method == AuthMethod::None {
        return Ok(next.run(request).await);
    }

    let expected = match auth.api_key.as_deref() {
        Some(key) if !key.is_empty() => key,
        _ => {
            AUTH_FAILURES_TOTAL
                .with_label_values(&["not_configured"])
                .inc();
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let bearer = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let api_key_header = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());

    match bearer.or(api_key_header) {
        Some(provided) if provided == expected => Ok(next.run(request).await),
        Some(_) => {
            AUTH_FAILURES_TOTAL
                .with_label_values(&["invalid_credentials"])
                .inc();
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            AUTH_FAILURES_TOTAL
                .with_label_values(&["not_authenticated"])
                .inc();
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{body::Body, http::Request, middleware, routing::get, Router};
    use tower::ServiceExt;

    use retrack_core::config::{
        AuthConfig, Config, DatabaseConfig, FetcherConfig, NotifierConfig, SchedulerConfig,
        ServerConfig, StoreConfig,
    };
    use retrack_core::testing::{MockFetcher, MockNotifier, MockStore};
    use retrack_core::{Reconciler, SqliteSeriesRepository};

    async fn dummy_handler() -> &'static str {
        "OK"
    }

    fn test_config(auth: AuthConfig) -> Config {
        Config {
            auth,
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            fetcher: FetcherConfig {
                base_url: "https://tracker.example/forum".to_string(),
                username: "user".to_string(),
                password: "pass".to_string(),
                proxy_url: None,
                timeout_secs: 20,
                download_timeout_secs: 30,
            },
            store: StoreConfig {
                url: "http://localhost:8081".to_string(),
                username: "admin".to_string(),
                password: "adminadmin".to_string(),
                category: "retrack".to_string(),
                delete_files: false,
                timeout_secs: 30,
            },
            scheduler: SchedulerConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }

    fn test_state(auth: AuthConfig) -> Arc<AppState> {
        let engine = Arc::new(Reconciler::new(
            Arc::new(MockFetcher::new()),
            Arc::new(MockStore::new()),
            Arc::new(SqliteSeriesRepository::in_memory().unwrap()),
            Arc::new(MockNotifier::new()),
            SchedulerConfig::default(),
            false,
        ));
        Arc::new(AppState::new(test_config(auth), engine))
    }

    fn test_app(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/test", get(dummy_handler))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            ))
            .with_state(state)
    }

    #[tokio::test]
    async fn test_none_auth_allows_all() {
        let app = test_app(test_state(AuthConfig::default()));

        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_key_auth_valid_bearer() {
        let app = test_app(test_state(AuthConfig {
            method: AuthMethod::ApiKey,
            api_key: Some("secret-key".to_string()),
        }));

        let request = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Bearer secret-key")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_key_auth_valid_header() {
        let app = test_app(test_state(AuthConfig {
            method: AuthMethod::ApiKey,
            api_key: Some("secret-key".to_string()),
        }));

        let request = Request::builder()
            .uri("/test")
            .header("X-API-Key", "secret-key")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_key_auth_invalid() {
        let app = test_app(test_state(AuthConfig {
            method: AuthMethod::ApiKey,
            api_key: Some("secret-key".to_string()),
        }));

        let request = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Bearer wrong-key")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_api_key_auth_missing() {
        let app = test_app(test_state(AuthConfig {
            method: AuthMethod::ApiKey,
            api_key: Some("secret-key".to_string()),
        }));

        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
