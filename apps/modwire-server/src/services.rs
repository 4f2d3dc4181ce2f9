use std::sync::Arc;

use modwire::Token;
use modwire_bootstrap::{AppConfig, ServerConfig};
use serde::de::DeserializeOwned;

pub const CONFIG_SERVICE: Token = Token::new("config_service");
pub const LOGGER_SERVICE: Token = Token::new("logger_service");

/// Read-only view of the loaded configuration, shared through the container.
#[derive(Debug, Clone)]
pub struct ConfigService {
    config: Arc<AppConfig>,
}

impl ConfigService {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }

    pub fn env(&self) -> &str {
        &self.config.env
    }

    pub fn server(&self) -> &ServerConfig {
        &self.config.server
    }

    pub fn jobs_enabled(&self) -> bool {
        self.config.jobs.enabled
    }

    /// Typed `modules.<name>` section; `Ok(None)` when absent.
    pub fn module_config<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<Option<T>> {
        self.config.module_config(name)
    }
}

/// Application-level logger. Every event carries the environment name.
#[derive(Debug, Clone)]
pub struct LoggerService {
    env: String,
    slow_request_ms: u64,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggerSettings {
    #[serde(default)]
    slow_request_ms: Option<u64>,
}

impl LoggerService {
    const DEFAULT_SLOW_REQUEST_MS: u64 = 1_000;

    pub fn from_config(config: &ConfigService) -> anyhow::Result<Self> {
        let settings: LoggerSettings = config.module_config("logger")?.unwrap_or_default();
        Ok(Self {
            env: config.env().to_string(),
            slow_request_ms: settings
                .slow_request_ms
                .unwrap_or(Self::DEFAULT_SLOW_REQUEST_MS),
        })
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    pub fn info(&self, context: &str, message: &str) {
        tracing::info!(env = %self.env, context, "{message}");
    }

    pub fn warn(&self, context: &str, message: &str) {
        tracing::warn!(env = %self.env, context, "{message}");
    }

    pub fn error(&self, context: &str, message: &str) {
        tracing::error!(env = %self.env, context, "{message}");
    }

    /// One line per request; slow and failing requests are raised to `warn`.
    pub fn request(&self, method: &str, path: &str, status: u16, latency_ms: u64) {
        if status >= 500 || latency_ms >= self.slow_request_ms {
            tracing::warn!(env = %self.env, method, path, status, latency_ms, "Request completed");
        } else {
            tracing::info!(env = %self.env, method, path, status, latency_ms, "Request completed");
        }
    }
}
