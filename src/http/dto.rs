//! Wire-level request/response shapes for C7. `{success, data?, error?}` on
//! every response; field naming is `snake_case` throughout per §6's wire
//! protocol section.

use serde::{Deserialize, Serialize};

use crate::extract::ExtractedFields;
use crate::render::events::RenderTrace;
use crate::render::RenderOutcome;

fn default_timeout() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderRequestDto {
    pub url: String,
    #[serde(default = "default_true")]
    pub js_enabled: bool,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub wait_event: String,
    #[serde(default)]
    pub block_ads: bool,
    #[serde(default)]
    pub block_analytics: bool,
    #[serde(default)]
    pub block_social: bool,
    #[serde(default)]
    pub block_tracking: bool,
    #[serde(default)]
    pub blocked_types: Vec<String>,
    #[serde(default = "default_true")]
    pub follow_redirects: bool,
    #[serde(default)]
    pub session_token: Option<String>,
    /// `include_screenshot` and `capture_screenshot` are synonyms — either
    /// field name populates this flag (resolved Open Question, SPEC_FULL.md §9).
    #[serde(default, alias = "capture_screenshot")]
    pub include_screenshot: bool,
    #[serde(default)]
    pub include_raw_markup: bool,
}

#[derive(Debug, Serialize)]
pub struct RenderResponseData {
    pub status_code: u16,
    pub final_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    pub byte_size: u64,
    pub render_time_ms: u64,
    #[serde(flatten)]
    pub extracted: ExtractedFields,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<Vec<crate::render::events::SubresourceRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<Vec<crate::render::events::LifecycleEvent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console: Option<Vec<crate::render::events::ConsoleEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub js_errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_markup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_id: Option<String>,
}

impl From<RenderOutcome> for RenderResponseData {
    fn from(outcome: RenderOutcome) -> Self {
        let RenderOutcome {
            status_code,
            final_url,
            redirect_url,
            byte_size,
            render_time_ms,
            extracted,
            trace,
            raw_markup,
            screenshot_id,
        } = outcome;

        let RenderTrace {
            subresources,
            lifecycle,
            console,
            js_errors,
        } = trace.unwrap_or_default();

        let scripted = screenshot_id.is_some() || !subresources.is_empty() || !lifecycle.is_empty();

        Self {
            status_code,
            final_url,
            redirect_url,
            byte_size,
            render_time_ms,
            extracted,
            requests: scripted.then_some(subresources),
            lifecycle: scripted.then_some(lifecycle),
            console: scripted.then_some(console),
            js_errors: (!js_errors.is_empty()).then_some(js_errors),
            raw_markup,
            screenshot_id: screenshot_id.map(|id| id.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RobotsRequestDto {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct RobotsResponseData {
    pub is_allowed: bool,
}

#[derive(Debug, Deserialize)]
pub struct CaptchaRequestDto {
    pub captcha_token: String,
    #[serde(default)]
    pub client_ip: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CaptchaResponseData {
    pub session_token: String,
    pub expires_at: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponseData {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub pool_size: u8,
}

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
        }
    }
}
