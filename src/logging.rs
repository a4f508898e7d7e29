//! Structured logging setup.
//!
//! Generalizes the teacher's `tracing_subscriber::registry().with(EnvFilter...).
//! with(fmt::layer())` construction (`bin/server.rs`) to branch on the
//! `logging.format` config section: `json` for machine ingestion, `console` for
//! local development.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingSection;

pub fn init(section: &LoggingSection) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rendertwin={},tower_http=info", section.level)));

    let registry = tracing_subscriber::registry().with(filter);

    if section.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
