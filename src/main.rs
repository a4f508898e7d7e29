//! CLI entry point (C12). Accepts a config-file path, loads and validates
//! configuration, starts the worker pool, screenshot sweeper, and HTTP
//! listener, and drains gracefully on `SIGINT`/`SIGTERM`.
//!
//! Grounded on the teacher's `main()` + `shutdown_signal()` in
//! `bin/server.rs`, generalized to the richer drain sequence the worker pool
//! and screenshot cache require (§6C).

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rendertwin::admission::{ApiKeyGate, SessionTokens};
use rendertwin::captcha::CaptchaVerifier;
use rendertwin::http::{build_app, AppState};
use rendertwin::pool::Pool;
use rendertwin::render::RenderDriver;
use rendertwin::robots::RobotsAdvisor;
use rendertwin::screenshot_cache::ScreenshotCache;
use rendertwin::AppConfig;

fn main() -> ExitCode {
    let Some(config_path) = std::env::args().nth(1) else {
        eprintln!("usage: rendertwin-server <config-file>");
        return ExitCode::from(1);
    };

    let config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::from(2);
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal startup error");
            ExitCode::from(1)
        }
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    rendertwin::logging::init(&config.logging);

    tracing::info!(pool_size = config.chrome.pool_size, "starting worker pool");
    let pool = Pool::start(config.chrome.clone()).await?;

    let screenshots = ScreenshotCache::new();
    let sweeper = screenshots.spawn_sweeper();

    let driver = Arc::new(RenderDriver::new(
        pool.handle(),
        screenshots.clone(),
        Duration::from_secs(config.server.timeout),
    ));

    let captcha = config
        .captcha
        .enabled
        .then(|| Arc::new(CaptchaVerifier::new(config.captcha.verify_url.clone(), config.captcha.secret_key.clone())));
    let sessions = config
        .captcha
        .enabled
        .then(|| Arc::new(SessionTokens::new(&config.captcha.secret_key)));

    let state = AppState {
        driver,
        pool: pool.handle(),
        screenshots,
        robots: Arc::new(RobotsAdvisor::new()),
        captcha,
        api_keys: ApiKeyGate::new(config.api.enabled, config.api.keys.clone()),
        sessions,
        server_timeout: Duration::from_secs(config.server.timeout),
        started_at: Instant::now(),
    };

    let app = build_app(state, &config.server.cors_origins);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("draining in-flight renders");
    pool.handle().shutdown().await;
    sweeper.abort();
    tracing::info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received sigterm, shutting down"),
    }
}
