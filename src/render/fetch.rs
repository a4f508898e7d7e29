//! Plain document fetch (the `js_enabled=false` half of §4.5): no worker
//! pool, no subresources, no lifecycle/console capture — just a single HTTP
//! request whose body feeds the same extractors as the scripted path.
//!
//! Grounded on the teacher's own plain HTTP usage pattern generalized with
//! `reqwest`'s redirect-policy API, the way danielchristiancazares-forge's
//! `webfetch::http` module drives its non-browser fetch path.

use std::time::{Duration, Instant};

use reqwest::redirect::Policy;

use crate::error::AppError;

pub struct FetchOutput {
    pub status_code: u16,
    pub final_url: String,
    pub redirect_url: Option<String>,
    pub body: String,
    pub byte_size: u64,
    pub elapsed: Duration,
    pub headers: reqwest::header::HeaderMap,
}

/// Issues a single GET, honoring `follow_redirects` the same way the
/// scripted path does: when `false`, the first 3xx stops and its `Location`
/// becomes `redirect_url` without being followed.
pub async fn fetch_document(
    url: &str,
    user_agent: &str,
    follow_redirects: bool,
    timeout: Duration,
) -> Result<FetchOutput, AppError> {
    let policy = if follow_redirects { Policy::limited(10) } else { Policy::none() };

    let client = reqwest::Client::builder()
        .redirect(policy)
        .timeout(timeout)
        .user_agent(if user_agent.is_empty() { "rendertwin/1.0" } else { user_agent })
        .build()
        .map_err(|e| AppError::fetch_failed(format!("failed to build http client: {e}")))?;

    let start = Instant::now();
    let response = client.get(url).send().await.map_err(|e| classify_reqwest_error(&e))?;
    let elapsed = start.elapsed();

    let status_code = response.status().as_u16();
    let final_url = response.url().to_string();
    let redirect_url = if !follow_redirects && response.status().is_redirection() {
        response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    } else {
        None
    };
    let headers = response.headers().clone();

    let body_bytes = response.bytes().await.map_err(|e| classify_reqwest_error(&e))?;
    let byte_size = body_bytes.len() as u64;
    let body = String::from_utf8_lossy(&body_bytes).into_owned();

    Ok(FetchOutput {
        status_code,
        final_url,
        redirect_url,
        body,
        byte_size,
        elapsed,
        headers,
    })
}

fn classify_reqwest_error(e: &reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::render_timeout(format!("fetch timed out: {e}"))
    } else if e.is_connect() {
        AppError::domain_not_found(format!("could not connect: {e}"))
    } else {
        AppError::fetch_failed(format!("fetch failed: {e}"))
    }
}
