pub mod admission;
pub mod captcha;
pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod http;
pub mod logging;
pub mod pool;
pub mod render;
pub mod robots;
pub mod screenshot_cache;
pub mod validate;

pub use config::AppConfig;
pub use error::{AppError, ErrorCode};
