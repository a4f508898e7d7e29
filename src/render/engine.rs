//! The narrow capability set the render driver depends on — launch,
//! navigate, evaluate, screenshot, close, plus four event streams — expressed
//! as a trait so the driver is agnostic of the concrete engine dialect, per
//! "Dynamic dispatch over engine RPCs".
//!
//! `ChromiumEngine` is grounded on danielchristiancazares-forge's
//! `webfetch::browser::render` (Fetch-domain interception, network-idle
//! polling, `document.documentElement.outerHTML` extraction) generalized from
//! a one-shot render function into a long-lived worker with a `RenderEngine`
//! impl the pool can hold behind `Box<dyn RenderEngine>`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch;
use chromiumoxide::cdp::browser_protocol::network;
use futures::StreamExt;
use tokio::sync::Mutex;

use crate::config::ChromeSection;
use crate::error::AppError;

use super::events::{
    ConsoleEntry, ConsoleLevel, EngineEvent, EventSender, LifecycleEvent, SubresourceRecord,
    SubresourceType,
};

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub url: String,
    pub user_agent: String,
    pub wait_event: String,
    pub follow_redirects: bool,
    pub capture_screenshot: bool,
    pub blocked_resource_types: Vec<String>,
    pub blocked_host_patterns: Vec<String>,
    pub deadline: Instant,
}

pub struct EngineRenderOutput {
    pub status_code: u16,
    pub final_url: String,
    pub redirect_url: Option<String>,
    pub markup: String,
    pub screenshot: Option<Vec<u8>>,
    /// Set when the engine observed an error severe enough that the worker
    /// should not be returned to the idle pool.
    pub broken: bool,
}

/// Quiet window a `networkIdle`/`networkAlmostIdle` wait must sustain before
/// the driver considers navigation settled.
pub const NETWORK_IDLE_QUIET_WINDOW: Duration = Duration::from_millis(500);

#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn warm_up(&self, url: &str, timeout: Duration) -> Result<(), AppError>;

    /// Drives one render, emitting events onto `events` as they arrive.
    async fn render(
        &self,
        options: &RenderOptions,
        events: EventSender,
    ) -> Result<EngineRenderOutput, AppError>;
}

pub struct ChromiumEngine {
    browser: Browser,
    _handler: tokio::task::JoinHandle<()>,
}

impl ChromiumEngine {
    pub async fn launch(chrome: &ChromeSection) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder();
        if chrome.headless {
            builder = builder.new_headless_mode();
        }
        if chrome.no_sandbox {
            builder = builder.no_sandbox();
        }
        let config = builder
            .build()
            .map_err(|e| AppError::chrome_unavailable(format!("invalid chrome config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::chrome_unavailable(format!("failed to launch chrome: {e}")))?;

        let join = tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(Self {
            browser,
            _handler: join,
        })
    }

    pub async fn close(mut self) {
        let _ = self.browser.close().await;
    }
}

#[async_trait]
impl RenderEngine for ChromiumEngine {
    async fn warm_up(&self, url: &str, timeout: Duration) -> Result<(), AppError> {
        let page = tokio::time::timeout(timeout, self.browser.new_page(url))
            .await
            .map_err(|_| AppError::chrome_unavailable("warm-up navigation timed out"))?
            .map_err(|e| AppError::chrome_unavailable(format!("warm-up navigation failed: {e}")))?;
        let _ = page.close().await;
        Ok(())
    }

    async fn render(
        &self,
        options: &RenderOptions,
        events: EventSender,
    ) -> Result<EngineRenderOutput, AppError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::render_failed(format!("failed to open page: {e}")))?;

        if !options.user_agent.is_empty() {
            let _ = page
                .execute(chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams::new(
                    options.user_agent.clone(),
                ))
                .await;
        }

        // The Request stage enables resource/host blocking (`spawn_request_handler`);
        // the Response stage is only needed to observe a document response's status
        // before the browser decides whether to follow a redirect.
        let mut patterns = vec![fetch::RequestPattern {
            url_pattern: Some("*".to_string()),
            resource_type: None,
            request_stage: Some(fetch::RequestStage::Request),
        }];
        if !options.follow_redirects {
            patterns.push(fetch::RequestPattern {
                url_pattern: Some("*".to_string()),
                resource_type: Some(network::ResourceType::Document),
                request_stage: Some(fetch::RequestStage::Response),
            });
        }
        page.execute(fetch::EnableParams {
            patterns: Some(patterns),
            handle_auth_requests: Some(false),
        })
        .await
        .map_err(|e| AppError::render_failed(format!("failed to enable fetch interception: {e}")))?;

        page.execute(network::EnableParams::default())
            .await
            .map_err(|e| AppError::render_failed(format!("failed to enable network events: {e}")))?;

        let in_flight = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();
        let redirect_capture: Arc<StdMutex<Option<RedirectCapture>>> = Arc::new(StdMutex::new(None));

        spawn_network_tracker(&page, in_flight.clone(), events.clone(), start).await?;
        spawn_request_handler(
            &page,
            events.clone(),
            &options.blocked_resource_types,
            &options.blocked_host_patterns,
            redirect_capture.clone(),
            start,
        )
        .await?;
        spawn_lifecycle_tracker(&page, events.clone(), start).await?;
        spawn_console_tracker(&page, events.clone(), start).await?;

        let remaining = options.deadline.saturating_duration_since(Instant::now());
        let navigation = page.goto(options.url.as_str());
        let nav_result = tokio::time::timeout(remaining, navigation).await;

        let redirect = redirect_capture.lock().expect("redirect capture mutex poisoned").clone();

        let broken = match nav_result {
            Ok(Ok(_)) => false,
            Ok(Err(e)) => {
                // A redirect we deliberately stopped following surfaces as a
                // navigation error from chromiumoxide's perspective; any other
                // error is a genuine engine failure.
                if redirect.is_none() {
                    return Err(AppError::render_failed(format!("navigation failed: {e}")));
                }
                false
            }
            Err(_) => return Err(AppError::render_timeout("navigation deadline exceeded")),
        };

        if redirect.is_none() && matches!(options.wait_event.as_str(), "networkIdle" | "networkAlmostIdle") {
            let threshold = if options.wait_event == "networkIdle" { 0 } else { 2 };
            wait_for_network_quiet(&in_flight, threshold, options.deadline).await?;
        }

        let markup = page
            .evaluate("document.documentElement.outerHTML")
            .await
            .map_err(|e| AppError::render_failed(format!("failed to read markup: {e}")))?
            .into_value::<String>()
            .unwrap_or_default();

        let screenshot = if options.capture_screenshot && redirect.is_none() {
            page.screenshot(chromiumoxide::page::ScreenshotParams::builder().full_page(true).build())
                .await
                .ok()
        } else {
            None
        };

        let final_url = page.url().await.ok().flatten().unwrap_or_else(|| options.url.clone());
        let _ = page.close().await;

        let (status_code, final_url, redirect_url) = match redirect {
            Some(RedirectCapture { status, location }) => (status, options.url.clone(), location),
            None => (200, final_url, None),
        };

        Ok(EngineRenderOutput {
            status_code,
            final_url,
            redirect_url,
            markup,
            screenshot,
            broken,
        })
    }
}

/// Status and `Location` of the first 3xx observed when `follow_redirects`
/// is false, captured from the redirect's own response before the browser
/// issues the next hop's request.
#[derive(Debug, Clone)]
struct RedirectCapture {
    status: u16,
    location: Option<String>,
}

async fn spawn_network_tracker(
    page: &chromiumoxide::Page,
    in_flight: Arc<AtomicUsize>,
    events: EventSender,
    start: Instant,
) -> Result<(), AppError> {
    let mut will_be_sent = page
        .event_listener::<network::EventRequestWillBeSent>()
        .await
        .map_err(|e| AppError::render_failed(format!("subscribe requestWillBeSent: {e}")))?;
    let mut response_received = page
        .event_listener::<network::EventResponseReceived>()
        .await
        .map_err(|e| AppError::render_failed(format!("subscribe responseReceived: {e}")))?;
    let mut finished = page
        .event_listener::<network::EventLoadingFinished>()
        .await
        .map_err(|e| AppError::render_failed(format!("subscribe loadingFinished: {e}")))?;
    let mut failed = page
        .event_listener::<network::EventLoadingFailed>()
        .await
        .map_err(|e| AppError::render_failed(format!("subscribe loadingFailed: {e}")))?;

    let counter = in_flight.clone();
    let tx = events.clone();
    tokio::spawn(async move {
        while let Some(event) = will_be_sent.next().await {
            counter.fetch_add(1, Ordering::Relaxed);
            let record = SubresourceRecord {
                id: event.request_id.inner().to_string(),
                url: event.request.url.clone(),
                method: event.request.method.clone(),
                status: 0,
                kind: event
                    .r#type
                    .as_ref()
                    .map(resource_type_to_subresource_type)
                    .unwrap_or(SubresourceType::Other),
                size: 0,
                time: start.elapsed().as_secs_f64(),
                is_internal: false,
                blocked: false,
                failed: false,
            };
            let _ = tx.send(EngineEvent::Subresource(record));
        }
    });

    let tx = events.clone();
    tokio::spawn(async move {
        while let Some(event) = response_received.next().await {
            let _ = tx.send(EngineEvent::SubresourceUpdate {
                id: event.request_id.inner().to_string(),
                status: Some(event.response.status as u16),
                size: None,
                failed: None,
            });
        }
    });

    let counter = in_flight.clone();
    let tx = events.clone();
    tokio::spawn(async move {
        while let Some(event) = finished.next().await {
            counter.fetch_sub(1, Ordering::Relaxed);
            let _ = tx.send(EngineEvent::SubresourceUpdate {
                id: event.request_id.inner().to_string(),
                status: None,
                size: Some(event.encoded_data_length as u64),
                failed: None,
            });
        }
    });

    let counter = in_flight.clone();
    let tx = events.clone();
    tokio::spawn(async move {
        while let Some(event) = failed.next().await {
            counter.fetch_sub(1, Ordering::Relaxed);
            let _ = tx.send(EngineEvent::SubresourceUpdate {
                id: event.request_id.inner().to_string(),
                status: None,
                size: None,
                failed: Some(true),
            });
            let _ = tx.send(EngineEvent::JsError(format!(
                "network request {} failed: {}",
                event.request_id.inner(),
                event.error_text
            )));
        }
    });

    Ok(())
}

async fn spawn_request_handler(
    page: &chromiumoxide::Page,
    events: EventSender,
    blocked_resource_types: &[String],
    blocked_host_patterns: &[String],
    redirect_capture: Arc<StdMutex<Option<RedirectCapture>>>,
    start: Instant,
) -> Result<(), AppError> {
    let mut paused = page
        .event_listener::<fetch::EventRequestPaused>()
        .await
        .map_err(|e| AppError::render_failed(format!("subscribe requestPaused: {e}")))?;
    let page = page.clone();
    let blocked: std::collections::HashSet<String> = blocked_resource_types
        .iter()
        .map(|s| s.to_ascii_lowercase())
        .collect();
    let host_patterns = blocked_host_patterns.to_vec();

    tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            // Only the Response-stage pattern (enabled when `!follow_redirects`,
            // scoped to document requests) ever carries a status code here.
            if let Some(status_code) = event.response_status_code {
                handle_paused_response(&page, &redirect_capture, &event, status_code).await;
                continue;
            }

            let type_name = event
                .resource_type
                .as_ref()
                .map(|t| format!("{t:?}").to_ascii_lowercase())
                .unwrap_or_default();
            let host_blocked = super::block_registry::matches_any(&event.request.url, &host_patterns);
            if blocked.contains(&type_name) || host_blocked {
                let _ = page
                    .execute(fetch::FailRequestParams {
                        request_id: event.request_id.clone(),
                        error_reason: network::ErrorReason::BlockedByClient,
                    })
                    .await;
                let _ = events.send(EngineEvent::Subresource(SubresourceRecord {
                    id: event.request_id.inner().to_string(),
                    url: event.request.url.clone(),
                    method: event.request.method.clone(),
                    status: 0,
                    kind: resource_type_to_subresource_type(&event.resource_type),
                    size: 0,
                    time: start.elapsed().as_secs_f64(),
                    is_internal: false,
                    blocked: true,
                    failed: false,
                }));
            } else {
                let _ = page.execute(fetch::ContinueRequestParams::new(event.request_id.clone())).await;
            }
        }
    });

    Ok(())
}

/// Stops at the first 3xx document response when `follow_redirects` is
/// false, recording its status and `Location` header; otherwise lets the
/// response through unmodified.
async fn handle_paused_response(
    page: &chromiumoxide::Page,
    redirect_capture: &StdMutex<Option<RedirectCapture>>,
    event: &fetch::EventRequestPaused,
    status_code: i64,
) {
    let status = status_code as u16;
    if (300..400).contains(&status) {
        let location = event.response_headers.as_ref().and_then(|headers| {
            headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case("location"))
                .map(|h| h.value.clone())
        });
        *redirect_capture.lock().expect("redirect capture mutex poisoned") = Some(RedirectCapture { status, location });
        let _ = page
            .execute(fetch::FailRequestParams {
                request_id: event.request_id.clone(),
                error_reason: network::ErrorReason::BlockedByClient,
            })
            .await;
        return;
    }
    let _ = page.execute(fetch::ContinueResponseParams::new(event.request_id.clone())).await;
}

async fn spawn_lifecycle_tracker(
    page: &chromiumoxide::Page,
    events: EventSender,
    start: Instant,
) -> Result<(), AppError> {
    use chromiumoxide::cdp::browser_protocol::page as cdp_page;
    let mut lifecycle = page
        .event_listener::<cdp_page::EventLifecycleEvent>()
        .await
        .map_err(|e| AppError::render_failed(format!("subscribe lifecycleEvent: {e}")))?;

    tokio::spawn(async move {
        while let Some(event) = lifecycle.next().await {
            let name = match event.name.as_str() {
                "DOMContentLoaded" => "domContentLoaded".to_string(),
                other => other.to_string(),
            };
            let _ = events.send(EngineEvent::Lifecycle(LifecycleEvent {
                name,
                time: start.elapsed().as_secs_f64(),
            }));
        }
    });

    Ok(())
}

async fn spawn_console_tracker(
    page: &chromiumoxide::Page,
    events: EventSender,
    start: Instant,
) -> Result<(), AppError> {
    use chromiumoxide::cdp::browser_protocol::log as cdp_log;
    let mut console = page
        .event_listener::<cdp_log::EventEntryAdded>()
        .await
        .map_err(|e| AppError::render_failed(format!("subscribe log entry: {e}")))?;

    tokio::spawn(async move {
        while let Some(event) = console.next().await {
            let level = match event.entry.level {
                cdp_log::LogEntryLevel::Error => ConsoleLevel::Error,
                cdp_log::LogEntryLevel::Warning => ConsoleLevel::Warning,
                cdp_log::LogEntryLevel::Info => ConsoleLevel::Info,
                _ => ConsoleLevel::Log,
            };
            let _ = events.send(EngineEvent::Console(ConsoleEntry {
                level,
                text: event.entry.text.clone(),
                time: start.elapsed().as_secs_f64(),
            }));
        }
    });

    Ok(())
}

fn resource_type_to_subresource_type(kind: &network::ResourceType) -> SubresourceType {
    match kind {
        network::ResourceType::Document => SubresourceType::Document,
        network::ResourceType::Script => SubresourceType::Script,
        network::ResourceType::Stylesheet => SubresourceType::Stylesheet,
        network::ResourceType::Xhr => SubresourceType::Xhr,
        network::ResourceType::Fetch => SubresourceType::Fetch,
        network::ResourceType::Image => SubresourceType::Image,
        network::ResourceType::Font => SubresourceType::Font,
        network::ResourceType::Media => SubresourceType::Media,
        network::ResourceType::WebSocket => SubresourceType::Websocket,
        _ => SubresourceType::Other,
    }
}

async fn wait_for_network_quiet(
    in_flight: &AtomicUsize,
    threshold: usize,
    deadline: Instant,
) -> Result<(), AppError> {
    let mut quiet_since: Option<Instant> = None;
    loop {
        if Instant::now() >= deadline {
            return Err(AppError::render_timeout("network-idle wait exceeded deadline"));
        }
        if in_flight.load(Ordering::Relaxed) <= threshold {
            let since = *quiet_since.get_or_insert_with(Instant::now);
            if since.elapsed() >= NETWORK_IDLE_QUIET_WINDOW {
                return Ok(());
            }
        } else {
            quiet_since = None;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// In-memory fake used by driver tests so lifecycle/timeout/cancellation
/// logic is exercised without a real Chromium binary, per §10.
pub struct FakeEngine {
    pub response: Mutex<Option<EngineRenderOutput>>,
    pub render_delay: Duration,
}

impl FakeEngine {
    pub fn new(response: EngineRenderOutput) -> Self {
        Self {
            response: Mutex::new(Some(response)),
            render_delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }
}

#[async_trait]
impl RenderEngine for FakeEngine {
    async fn warm_up(&self, _url: &str, _timeout: Duration) -> Result<(), AppError> {
        Ok(())
    }

    async fn render(
        &self,
        options: &RenderOptions,
        events: EventSender,
    ) -> Result<EngineRenderOutput, AppError> {
        if self.render_delay > Duration::ZERO {
            if tokio::time::timeout(
                options.deadline.saturating_duration_since(Instant::now()),
                tokio::time::sleep(self.render_delay),
            )
            .await
            .is_err()
            {
                return Err(AppError::render_timeout("fake engine exceeded deadline"));
            }
        }
        let _ = events.send(EngineEvent::Lifecycle(LifecycleEvent {
            name: "domContentLoaded".into(),
            time: 0.0,
        }));
        let mut guard = self.response.lock().await;
        guard
            .take()
            .ok_or_else(|| AppError::render_failed("fake engine has no canned response left"))
    }
}
