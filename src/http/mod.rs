//! HTTP surface (C7): axum routes, `{success, data?, error?}` envelope, CORS,
//! body-size caps. Grounded on the teacher's `build_app` in `bin/server.rs`
//! (`Router::new()...layer(ServiceBuilder::new().layer(TraceLayer...)
//! .layer(CorsLayer...))`), generalized from a permissive CORS layer to a
//! configured origin whitelist and from one `ApiError` to the full `AppError`
//! code table.

pub mod dto;
pub mod handlers;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::admission::{ApiKeyGate, SessionTokens};
use crate::captcha::CaptchaVerifier;
use crate::pool::PoolHandle;
use crate::render::RenderDriver;
use crate::robots::RobotsAdvisor;
use crate::screenshot_cache::ScreenshotCache;

/// Request bodies above this size are rejected with 413 before reaching a handler.
pub const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;
/// Response fields carrying page text/markup are truncated past this size.
pub const MAX_RESPONSE_BODY_TEXT_BYTES: usize = 3 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub driver: Arc<RenderDriver>,
    pub pool: PoolHandle,
    pub screenshots: ScreenshotCache,
    pub robots: Arc<RobotsAdvisor>,
    pub captcha: Option<Arc<CaptchaVerifier>>,
    pub api_keys: ApiKeyGate,
    pub sessions: Option<Arc<SessionTokens>>,
    pub server_timeout: Duration,
    pub started_at: Instant,
}

pub fn build_app(state: AppState, cors_origins: &[String]) -> Router {
    let cors = if cors_origins.is_empty() {
        CorsLayer::new()
    } else {
        let origins: Vec<_> = cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(tower_http::cors::Any)
    };

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/api/render", post(handlers::render))
        .route("/api/robots", post(handlers::robots))
        .route("/api/auth/captcha", post(handlers::captcha_exchange))
        .route("/api/screenshot/{id}", get(handlers::screenshot))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::config::ChromeSection;
    use crate::pool::{Pool, WorkerFactory};
    use crate::render::engine::{EngineRenderOutput, FakeEngine, RenderEngine};

    fn fake_factory() -> WorkerFactory {
        Arc::new(|| {
            Box::pin(async {
                let engine = FakeEngine::new(EngineRenderOutput {
                    status_code: 200,
                    final_url: "https://example.com/".into(),
                    redirect_url: None,
                    markup: "<html><head><title>Hi</title></head><body>hello</body></html>".into(),
                    screenshot: None,
                    broken: false,
                });
                Ok(Arc::new(engine) as Arc<dyn RenderEngine>)
            })
        })
    }

    async fn test_state() -> AppState {
        let mut chrome = ChromeSection::default();
        chrome.pool_size = 1;
        let pool = Pool::start_with_factory(chrome, fake_factory()).await.unwrap();
        let screenshots = ScreenshotCache::new();
        let driver = Arc::new(RenderDriver::new(pool.handle(), screenshots.clone(), Duration::from_secs(30)));

        AppState {
            driver,
            pool: pool.handle(),
            screenshots,
            robots: Arc::new(RobotsAdvisor::new()),
            captcha: None,
            api_keys: ApiKeyGate::disabled(),
            sessions: None,
            server_timeout: Duration::from_secs(30),
            started_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn healthz_reports_pool_size() {
        let app = build_app(test_state().await, &[]);
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn render_rejects_ssrf_target() {
        let app = build_app(test_state().await, &[]);
        let body = serde_json::json!({"url": "http://127.0.0.1/", "js_enabled": false}).to_string();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/render")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn render_requires_api_key_when_enabled() {
        let mut state = test_state().await;
        state.api_keys = ApiKeyGate::new(true, vec!["good-key".to_string()]);
        let app = build_app(state, &[]);
        let body = serde_json::json!({"url": "https://example.com/", "js_enabled": false}).to_string();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/render")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn screenshot_unknown_id_is_404() {
        let app = build_app(test_state().await, &[]);
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/screenshot/{}", uuid::Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }
}
