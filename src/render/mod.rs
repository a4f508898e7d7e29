//! Render driver (C5): leases a worker, drives one navigation to the
//! requested lifecycle event (or runs the plain-fetch path), and hands the
//! result to the extractors. Grounded on the teacher's `client.rs`
//! (`Browser::launch` → `page.execute` → `event_listener` → `chaser.evaluate`)
//! reground on `chromiumoxide`, and on riptide's render-then-extract shape.

pub mod block_registry;
pub mod engine;
pub mod events;
pub mod fetch;

use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::extract::{self, ExtractedFields};
use crate::pool::{PoolHandle, DEFAULT_LEASE_ADMISSION_WINDOW};
use crate::screenshot_cache::ScreenshotCache;

use engine::{RenderOptions, NETWORK_IDLE_QUIET_WINDOW};
use events::{EventAggregator, RenderTrace};

#[derive(Debug, Clone)]
pub struct RenderContext {
    pub url: String,
    pub js_enabled: bool,
    pub user_agent: String,
    pub timeout: Duration,
    pub wait_event: String,
    pub follow_redirects: bool,
    pub capture_screenshot: bool,
    pub blocked_resource_types: Vec<String>,
    pub block_ads: bool,
    pub block_analytics: bool,
    pub block_social: bool,
    pub block_tracking: bool,
    pub include_raw_markup: bool,
}

pub struct RenderOutcome {
    pub status_code: u16,
    pub final_url: String,
    pub redirect_url: Option<String>,
    pub byte_size: u64,
    pub render_time_ms: u64,
    pub extracted: ExtractedFields,
    pub trace: Option<RenderTrace>,
    pub raw_markup: Option<String>,
    pub screenshot_id: Option<Uuid>,
}

pub struct RenderDriver {
    pool: PoolHandle,
    screenshots: ScreenshotCache,
    server_timeout: Duration,
}

impl RenderDriver {
    pub fn new(pool: PoolHandle, screenshots: ScreenshotCache, server_timeout: Duration) -> Self {
        Self {
            pool,
            screenshots,
            server_timeout,
        }
    }

    pub async fn render(&self, ctx: RenderContext) -> Result<RenderOutcome, AppError> {
        let effective_timeout = ctx.timeout.min(self.server_timeout);
        let deadline = Instant::now() + effective_timeout;

        if ctx.js_enabled {
            self.render_scripted(ctx, deadline).await
        } else {
            self.render_plain(ctx, effective_timeout).await
        }
    }

    async fn render_plain(&self, ctx: RenderContext, timeout: Duration) -> Result<RenderOutcome, AppError> {
        let start = Instant::now();
        let result = fetch::fetch_document(&ctx.url, &ctx.user_agent, ctx.follow_redirects, timeout).await?;

        let extracted = extract::extract(
            &result.final_url,
            &result.body,
            &[],
            &result.headers,
            result.status_code,
        );

        Ok(RenderOutcome {
            status_code: result.status_code,
            final_url: result.final_url,
            redirect_url: result.redirect_url,
            byte_size: result.byte_size,
            render_time_ms: start.elapsed().as_millis() as u64,
            extracted,
            trace: None,
            raw_markup: ctx.include_raw_markup.then(|| result.body),
            screenshot_id: None,
        })
    }

    async fn render_scripted(&self, ctx: RenderContext, deadline: Instant) -> Result<RenderOutcome, AppError> {
        let start = Instant::now();
        let admission_window = DEFAULT_LEASE_ADMISSION_WINDOW.min(deadline.saturating_duration_since(Instant::now()));
        let worker = self.pool.lease(admission_window).await?;

        let blocked_host_patterns = block_registry::host_patterns_for_categories(
            ctx.block_ads,
            ctx.block_analytics,
            ctx.block_social,
            ctx.block_tracking,
        );
        let options = RenderOptions {
            url: ctx.url.clone(),
            user_agent: ctx.user_agent.clone(),
            wait_event: ctx.wait_event.clone(),
            follow_redirects: ctx.follow_redirects,
            capture_screenshot: ctx.capture_screenshot,
            blocked_resource_types: ctx.blocked_resource_types.clone(),
            blocked_host_patterns,
            deadline,
        };

        let (tx, mut aggregator) = EventAggregator::channel();
        let remaining = deadline.saturating_duration_since(Instant::now());
        let render_result = tokio::time::timeout(remaining + NETWORK_IDLE_QUIET_WINDOW, worker.engine.render(&options, tx)).await;

        let mut trace = RenderTrace::default();
        aggregator.drain_into(&mut trace);

        let output = match render_result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                worker.release(true);
                return Err(e);
            }
            Err(_) => {
                worker.release(true);
                return Err(AppError::render_timeout("render deadline exceeded"));
            }
        };

        worker.release(output.broken);

        mark_internal_subresources(&mut trace, &output.final_url);
        let empty_headers = HeaderMap::new();
        let extracted = extract::extract(
            &output.final_url,
            &output.markup,
            &trace.subresources,
            &empty_headers,
            output.status_code,
        );

        let screenshot_id = output.screenshot.map(|bytes| self.screenshots.insert(bytes));

        Ok(RenderOutcome {
            status_code: output.status_code,
            final_url: output.final_url,
            redirect_url: output.redirect_url,
            byte_size: output.markup.len() as u64,
            render_time_ms: start.elapsed().as_millis() as u64,
            extracted,
            trace: Some(trace),
            raw_markup: ctx.include_raw_markup.then_some(output.markup),
            screenshot_id,
        })
    }
}

fn mark_internal_subresources(trace: &mut RenderTrace, final_url: &str) {
    let Some(final_host) = reqwest::Url::parse(final_url).ok().and_then(|u| u.host_str().map(str::to_string)) else {
        return;
    };
    for record in &mut trace.subresources {
        record.is_internal = reqwest::Url::parse(&record.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .map(|host| !crate::domain::is_external(&final_host, &host))
            .unwrap_or(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChromeSection;
    use crate::pool::Pool;
    use engine::{EngineRenderOutput, FakeEngine};
    use std::sync::Arc;

    fn fake_factory() -> crate::pool::WorkerFactory {
        Arc::new(|| {
            Box::pin(async {
                let engine = FakeEngine::new(EngineRenderOutput {
                    status_code: 200,
                    final_url: "https://example.com/".into(),
                    redirect_url: None,
                    markup: "<html><head><title>Hi</title></head><body>hello world</body></html>".into(),
                    screenshot: None,
                    broken: false,
                });
                Ok(Arc::new(engine) as Arc<dyn engine::RenderEngine>)
            })
        })
    }

    fn test_chrome() -> ChromeSection {
        let mut chrome = ChromeSection::default();
        chrome.pool_size = 1;
        chrome
    }

    #[tokio::test]
    async fn scripted_render_roundtrip() {
        let pool = Pool::start_with_factory(test_chrome(), fake_factory()).await.unwrap();
        let driver = RenderDriver::new(pool.handle(), ScreenshotCache::new(), Duration::from_secs(30));

        let outcome = driver
            .render(RenderContext {
                url: "https://example.com/".into(),
                js_enabled: true,
                user_agent: String::new(),
                timeout: Duration::from_secs(10),
                wait_event: "domContentLoaded".into(),
                follow_redirects: true,
                capture_screenshot: false,
                blocked_resource_types: Vec::new(),
                block_ads: false,
                block_analytics: false,
                block_social: false,
                block_tracking: false,
                include_raw_markup: false,
            })
            .await
            .unwrap();

        assert_eq!(outcome.status_code, 200);
        assert_eq!(outcome.extracted.title.as_deref(), Some("Hi"));
        assert!(outcome.trace.is_some());
    }

    #[tokio::test]
    async fn pool_exhaustion_surfaces_as_pool_exhausted() {
        let pool = Pool::start_with_factory(test_chrome(), fake_factory()).await.unwrap();
        let driver = RenderDriver::new(pool.handle(), ScreenshotCache::new(), Duration::from_secs(30));
        let held = pool.handle().lease(Duration::from_millis(100)).await.unwrap();

        let result = driver
            .render(RenderContext {
                url: "https://example.com/".into(),
                js_enabled: true,
                user_agent: String::new(),
                timeout: Duration::from_secs(1),
                wait_event: String::new(),
                follow_redirects: true,
                capture_screenshot: false,
                blocked_resource_types: Vec::new(),
                block_ads: false,
                block_analytics: false,
                block_social: false,
                block_tracking: false,
                include_raw_markup: false,
            })
            .await;

        assert!(matches!(result, Err(e) if e.code == crate::error::ErrorCode::PoolExhausted));
        held.release(false);
    }
}
