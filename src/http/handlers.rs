//! Request handlers for C7. Admission (API key, session token) runs ahead of
//! the render/robots handlers per §4.2; validation (C1) runs ahead of the
//! driver. Grounded on the teacher's handler shape in `bin/server.rs`
//! (`State<AppState>` extractor, `Json<Req> -> Result<Json<Resp>, ApiError>`).

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use crate::error::AppError;
use crate::render::RenderContext;
use crate::validate;

use super::dto::{
    CaptchaRequestDto, CaptchaResponseData, Envelope, HealthResponseData, RenderRequestDto,
    RenderResponseData, RobotsRequestDto, RobotsResponseData,
};
use super::AppState;

const API_KEY_HEADER: &str = "x-api-key";

pub async fn healthz(State(state): State<AppState>) -> Json<Envelope<HealthResponseData>> {
    let stats = state.pool.stats().await;
    Json(Envelope::ok(HealthResponseData {
        status: "ok",
        uptime_seconds: state.started_at.elapsed().as_secs(),
        pool_size: stats.pool_size as u8,
    }))
}

pub async fn render(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RenderRequestDto>,
) -> Result<Json<Envelope<RenderResponseData>>, AppError> {
    state.api_keys.check(header_str(&headers, API_KEY_HEADER))?;
    check_session(&state, req.session_token.as_deref()).await?;

    let url = validate::parse_target_url(&req.url)?;
    validate::validate_timeout(req.timeout)?;
    validate::validate_wait_event(&req.wait_event)?;
    validate::validate_host_ssrf(url.host_str().expect("parse_target_url guarantees a host")).await?;

    let ctx = RenderContext {
        url: req.url,
        js_enabled: req.js_enabled,
        user_agent: req.user_agent.unwrap_or_default(),
        timeout: Duration::from_secs(req.timeout).min(state.server_timeout),
        wait_event: req.wait_event,
        follow_redirects: req.follow_redirects,
        capture_screenshot: req.include_screenshot,
        blocked_resource_types: req.blocked_types,
        block_ads: req.block_ads,
        block_analytics: req.block_analytics,
        block_social: req.block_social,
        block_tracking: req.block_tracking,
        include_raw_markup: req.include_raw_markup,
    };

    let outcome = state.driver.render(ctx).await?;
    Ok(Json(Envelope::ok(RenderResponseData::from(outcome))))
}

pub async fn robots(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RobotsRequestDto>,
) -> Result<Json<Envelope<RobotsResponseData>>, AppError> {
    state.api_keys.check(header_str(&headers, API_KEY_HEADER))?;
    let is_allowed = state.robots.is_allowed(&req.url).await?;
    Ok(Json(Envelope::ok(RobotsResponseData { is_allowed })))
}

pub async fn captcha_exchange(
    State(state): State<AppState>,
    Json(req): Json<CaptchaRequestDto>,
) -> Result<Json<Envelope<CaptchaResponseData>>, AppError> {
    let verifier = state
        .captcha
        .as_ref()
        .ok_or_else(|| AppError::captcha_failed("captcha verification is not configured"))?;
    let sessions = state
        .sessions
        .as_ref()
        .ok_or_else(|| AppError::captcha_failed("session signing is not configured"))?;

    verifier.verify(&req.captcha_token, req.client_ip.as_deref()).await?;

    let subject = Uuid::new_v4().to_string();
    let session_token = sessions.mint(&subject)?;
    let claims = sessions.verify(&session_token)?;
    let expires_at = chrono::DateTime::<chrono::Utc>::from_timestamp(claims.exp, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default();

    Ok(Json(Envelope::ok(CaptchaResponseData {
        session_token,
        expires_at,
    })))
}

pub async fn screenshot(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Ok(id) = Uuid::parse_str(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match state.screenshots.get(id) {
        Some(bytes) => ([(header::CONTENT_TYPE, "image/png")], bytes.as_ref().clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn check_session(state: &AppState, presented: Option<&str>) -> Result<(), AppError> {
    let Some(sessions) = state.sessions.as_ref() else {
        return Ok(());
    };
    let token = presented.ok_or_else(|| AppError::session_token_required("session_token is required"))?;
    sessions.verify(token).map(|_| ())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
