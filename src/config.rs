//! Structured configuration: load a TOML file, apply environment overrides,
//! validate. Generalizes the teacher's `ServerConfig::from_env` (`bin/server.rs`)
//! into the pool-aware, section-based schema of SPEC_FULL.md §6A.

use std::path::Path;

use serde::Deserialize;

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_server_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChromeSection {
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default)]
    pub no_sandbox: bool,
    #[serde(default = "default_pool_size")]
    pub pool_size: u8,
    #[serde(default = "default_warmup_url")]
    pub warmup_url: String,
    #[serde(default = "default_restart_after_count")]
    pub restart_after_count: u32,
    #[serde(default = "default_restart_after_time")]
    pub restart_after_time: u64,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub verify_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "ServerSection::default")]
    pub server: ServerSection,
    #[serde(default = "ChromeSection::default")]
    pub chrome: ChromeSection,
    #[serde(default = "LoggingSection::default")]
    pub logging: LoggingSection,
    #[serde(default = "CaptchaSection::default")]
    pub captcha: CaptchaSection,
    #[serde(default = "ApiSection::default")]
    pub api: ApiSection,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_server_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_pool_size() -> u8 {
    4
}
fn default_warmup_url() -> String {
    "about:blank".to_string()
}
fn default_restart_after_count() -> u32 {
    500
}
fn default_restart_after_time() -> u64 {
    3600
}
fn default_shutdown_timeout() -> u64 {
    15
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout: default_server_timeout(),
            cors_origins: Vec::new(),
        }
    }
}

impl Default for ChromeSection {
    fn default() -> Self {
        Self {
            headless: true,
            no_sandbox: false,
            pool_size: default_pool_size(),
            warmup_url: default_warmup_url(),
            restart_after_count: default_restart_after_count(),
            restart_after_time: default_restart_after_time(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for CaptchaSection {
    fn default() -> Self {
        Self {
            enabled: false,
            secret_key: String::new(),
            verify_url: String::new(),
        }
    }
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            enabled: false,
            keys: Vec::new(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            chrome: ChromeSection::default(),
            logging: LoggingSection::default(),
            captcha: CaptchaSection::default(),
            api: ApiSection::default(),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file, apply environment overrides, then validate.
    ///
    /// Mirrors the teacher's `ServerConfig::from_env`, but file-backed first and
    /// env-overridden second, as SPEC_FULL.md §6A specifies.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut config: AppConfig = toml::from_str(&raw)?;
        config.apply_env_overrides();
        config.validate().map_err(|e| anyhow::anyhow!("{}: {}", e.code.as_str(), e.message))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("PORT").and_then(|v| v.parse().map_err(|_| std::env::VarError::NotPresent)) {
            self.server.port = port;
        }
        if let Ok(size) = std::env::var("CHROME_POOL_SIZE").and_then(|v| v.parse().map_err(|_| std::env::VarError::NotPresent)) {
            self.chrome.pool_size = size;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.server.cors_origins = origins.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Ok(enabled) = std::env::var("CAPTCHA_ENABLED") {
            self.captcha.enabled = matches!(enabled.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(secret) = std::env::var("CAPTCHA_SECRET_KEY") {
            self.captcha.secret_key = secret;
        }
        if let Ok(keys) = std::env::var("API_KEYS") {
            let keys: Vec<String> = keys.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
            if !keys.is_empty() {
                self.api.enabled = true;
                self.api.keys = keys;
            }
        }
    }

    /// Fatal startup validation — rejects before the listener binds.
    pub fn validate(&self) -> Result<(), AppError> {
        if !(1..=16).contains(&self.chrome.pool_size) {
            return Err(AppError::invalid_request_body(format!(
                "chrome.pool_size must be in 1..=16, got {}",
                self.chrome.pool_size
            )));
        }
        if !matches!(self.logging.level.as_str(), "debug" | "info" | "warn" | "error") {
            return Err(AppError::invalid_request_body(format!(
                "logging.level must be one of debug|info|warn|error, got {:?}",
                self.logging.level
            )));
        }
        if !matches!(self.logging.format.as_str(), "json" | "console") {
            return Err(AppError::invalid_request_body(format!(
                "logging.format must be one of json|console, got {:?}",
                self.logging.format
            )));
        }
        if self.captcha.enabled && self.captcha.secret_key.is_empty() {
            return Err(AppError::invalid_request_body(
                "captcha.enabled requires a non-empty captcha.secret_key",
            ));
        }
        if self.captcha.enabled && self.captcha.verify_url.is_empty() {
            return Err(AppError::invalid_request_body(
                "captcha.enabled requires a non-empty captcha.verify_url",
            ));
        }
        if self.api.enabled && self.api.keys.is_empty() {
            return Err(AppError::invalid_request_body(
                "api.enabled requires at least one api.keys entry",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn pool_size_out_of_range_rejected() {
        let mut config = AppConfig::default();
        config.chrome.pool_size = 0;
        assert!(config.validate().is_err());
        config.chrome.pool_size = 17;
        assert!(config.validate().is_err());
    }

    #[test]
    fn captcha_enabled_without_secret_rejected() {
        let mut config = AppConfig::default();
        config.captcha.enabled = true;
        assert!(config.validate().is_err());
        config.captcha.secret_key = "shh".to_string();
        assert!(config.validate().is_err());
        config.captcha.verify_url = "https://captcha.example.com/verify".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn api_enabled_without_keys_rejected() {
        let mut config = AppConfig::default();
        config.api.enabled = true;
        assert!(config.validate().is_err());
        config.api.keys.push("key-1".to_string());
        assert!(config.validate().is_ok());
    }
}
