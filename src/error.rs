//! Stable machine error codes and their HTTP mapping.
//!
//! Generalizes the teacher's `ApiError` enum (`bin/server.rs`) from three ad-hoc
//! variants to the full code table the render engine exposes to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidUrl,
    InvalidTimeout,
    InvalidWaitEvent,
    InvalidRequestBody,
    DomainNotFound,
    ApiKeyRequired,
    ApiKeyInvalid,
    SessionTokenRequired,
    SessionTokenInvalid,
    SessionTokenExpired,
    SsrfBlocked,
    CaptchaFailed,
    MethodNotAllowed,
    RenderTimeout,
    ChromeUnavailable,
    PoolExhausted,
    PoolShuttingDown,
    RenderFailed,
    FetchFailed,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        use ErrorCode::*;
        match self {
            InvalidUrl | InvalidTimeout | InvalidWaitEvent | InvalidRequestBody
            | DomainNotFound => StatusCode::BAD_REQUEST,
            ApiKeyRequired => StatusCode::UNAUTHORIZED,
            ApiKeyInvalid | SessionTokenRequired | SessionTokenInvalid | SessionTokenExpired
            | SsrfBlocked | CaptchaFailed => StatusCode::FORBIDDEN,
            MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RenderTimeout => StatusCode::REQUEST_TIMEOUT,
            ChromeUnavailable | PoolExhausted | PoolShuttingDown => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RenderFailed | FetchFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(self) -> &'static str {
        use ErrorCode::*;
        match self {
            InvalidUrl => "INVALID_URL",
            InvalidTimeout => "INVALID_TIMEOUT",
            InvalidWaitEvent => "INVALID_WAIT_EVENT",
            InvalidRequestBody => "INVALID_REQUEST_BODY",
            DomainNotFound => "DOMAIN_NOT_FOUND",
            ApiKeyRequired => "API_KEY_REQUIRED",
            ApiKeyInvalid => "API_KEY_INVALID",
            SessionTokenRequired => "SESSION_TOKEN_REQUIRED",
            SessionTokenInvalid => "SESSION_TOKEN_INVALID",
            SessionTokenExpired => "SESSION_TOKEN_EXPIRED",
            SsrfBlocked => "SSRF_BLOCKED",
            CaptchaFailed => "CAPTCHA_FAILED",
            MethodNotAllowed => "METHOD_NOT_ALLOWED",
            RenderTimeout => "RENDER_TIMEOUT",
            ChromeUnavailable => "CHROME_UNAVAILABLE",
            PoolExhausted => "POOL_EXHAUSTED",
            PoolShuttingDown => "POOL_SHUTTING_DOWN",
            RenderFailed => "RENDER_FAILED",
            FetchFailed => "FETCH_FAILED",
        }
    }
}

/// Application error carrying a stable code and a short human message.
///
/// Never partially fills a response: a handler returns either `Ok(data)` or
/// `Err(AppError)`, never both, matching the one-of `{data, error}` envelope.
#[derive(Debug, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

macro_rules! ctor {
    ($name:ident, $code:ident) => {
        pub fn $name(message: impl Into<String>) -> Self {
            Self::new(ErrorCode::$code, message)
        }
    };
}

impl AppError {
    ctor!(invalid_url, InvalidUrl);
    ctor!(invalid_timeout, InvalidTimeout);
    ctor!(invalid_wait_event, InvalidWaitEvent);
    ctor!(invalid_request_body, InvalidRequestBody);
    ctor!(domain_not_found, DomainNotFound);
    ctor!(api_key_required, ApiKeyRequired);
    ctor!(api_key_invalid, ApiKeyInvalid);
    ctor!(session_token_required, SessionTokenRequired);
    ctor!(session_token_invalid, SessionTokenInvalid);
    ctor!(session_token_expired, SessionTokenExpired);
    ctor!(ssrf_blocked, SsrfBlocked);
    ctor!(captcha_failed, CaptchaFailed);
    ctor!(render_timeout, RenderTimeout);
    ctor!(chrome_unavailable, ChromeUnavailable);
    ctor!(pool_exhausted, PoolExhausted);
    ctor!(pool_shutting_down, PoolShuttingDown);
    ctor!(render_failed, RenderFailed);
    ctor!(fetch_failed, FetchFailed);
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct Envelope {
    success: bool,
    error: ErrorBody,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.code.status();
        tracing::warn!(code = self.code.as_str(), message = %self.message, "request rejected");
        let body = Envelope {
            success: false,
            error: ErrorBody {
                code: self.code.as_str(),
                message: self.message,
            },
        };
        (status, Json(body)).into_response()
    }
}
