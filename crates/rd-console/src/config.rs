//! Application configuration.

use crate::error::{AppError, AppResult};
use rd_hub::HubConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const CONFIG_ENV: &str = "RD_CONFIG";
pub const GATEWAY_URL_ENV: &str = "RD_GATEWAY_URL";
pub const PUSH_URL_ENV: &str = "RD_PUSH_URL";

/// Container settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoresConfig {
    /// Page size for list loads.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    rd_store::DEFAULT_PAGE_SIZE
}

impl Default for StoresConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// GraphQL endpoint.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    /// Push endpoint; copied into `hub.url`.
    #[serde(default = "default_push_url")]
    pub push_url: String,
    /// Session file. Without it the session lives in memory only.
    #[serde(default)]
    pub storage_path: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub stores: StoresConfig,
}

fn default_gateway_url() -> String {
    "http://localhost:4000/graphql".to_string()
}

fn default_push_url() -> String {
    "ws://localhost:4000/ws".to_string()
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            push_url: default_push_url(),
            storage_path: None,
            request_timeout_ms: default_request_timeout_ms(),
            hub: HubConfig::default(),
            stores: StoresConfig::default(),
        }
    }
}

impl AppConfig {
    /// Resolve the config path (`cli` > `RD_CONFIG` > default) and load it.
    /// A missing default file falls back to built-in defaults.
    pub fn load(cli: Option<String>) -> AppResult<Self> {
        let explicit = cli.or_else(|| std::env::var(CONFIG_ENV).ok());
        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(DEFAULT_CONFIG_PATH)?
            }
            None => {
                tracing::warn!(path = DEFAULT_CONFIG_PATH, "Config file not found, using defaults");
                Self::default()
            }
        };
        config.apply_overrides(
            std::env::var(GATEWAY_URL_ENV).ok(),
            std::env::var(PUSH_URL_ENV).ok(),
        );
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let mut config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.sync_hub_url();
        Ok(config)
    }

    /// Endpoint overrides from the environment.
    pub fn apply_overrides(&mut self, gateway_url: Option<String>, push_url: Option<String>) {
        if let Some(url) = gateway_url.filter(|u| !u.trim().is_empty()) {
            self.gateway_url = url;
        }
        if let Some(url) = push_url.filter(|u| !u.trim().is_empty()) {
            self.push_url = url;
        }
        self.sync_hub_url();
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.gateway_url.trim().is_empty() {
            return Err(AppError::Config("gateway_url must not be empty".to_string()));
        }
        if self.push_url.trim().is_empty() {
            return Err(AppError::Config("push_url must not be empty".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(AppError::Config(
                "request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.hub.heartbeat_interval_ms == 0 || self.hub.heartbeat_timeout_ms == 0 {
            return Err(AppError::Config(
                "hub.heartbeat_interval_ms and hub.heartbeat_timeout_ms must be positive"
                    .to_string(),
            ));
        }
        if self.hub.reconnect_base_delay_ms > self.hub.reconnect_max_delay_ms {
            return Err(AppError::Config(format!(
                "hub.reconnect_base_delay_ms ({}) exceeds hub.reconnect_max_delay_ms ({})",
                self.hub.reconnect_base_delay_ms, self.hub.reconnect_max_delay_ms
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn sync_hub_url(&mut self) {
        self.hub.url = self.push_url.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_per_field() {
        let config = AppConfig::from_toml(
            r#"
            gateway_url = "https://dispatch.example.org/graphql"

            [hub]
            max_reconnect_attempts = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.gateway_url, "https://dispatch.example.org/graphql");
        assert_eq!(config.push_url, "ws://localhost:4000/ws");
        assert_eq!(config.hub.url, config.push_url);
        assert_eq!(config.hub.max_reconnect_attempts, 0);
        assert_eq!(config.hub.reconnect_max_delay_ms, 5_000);
        assert_eq!(config.stores.page_size, rd_store::DEFAULT_PAGE_SIZE);
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_replace_endpoints() {
        let mut config = AppConfig::default();
        config.apply_overrides(
            Some("https://gw.example.org/graphql".into()),
            Some("wss://push.example.org/ws".into()),
        );
        assert_eq!(config.gateway_url, "https://gw.example.org/graphql");
        assert_eq!(config.hub.url, "wss://push.example.org/ws");

        config.apply_overrides(Some("  ".into()), None);
        assert_eq!(config.gateway_url, "https://gw.example.org/graphql");
    }

    #[test]
    fn test_validation_rejects_empty_urls() {
        let config = AppConfig::from_toml(r#"push_url = """#).unwrap();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = AppConfig::default();
        config.hub.reconnect_base_delay_ms = 10_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_heartbeat() {
        let config = AppConfig::from_toml(
            r#"
            [hub]
            heartbeat_interval_ms = 0
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        assert!(matches!(
            AppConfig::from_toml("gateway_url = ["),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_shipped_default_config_parses() {
        let content = include_str!("../../../config/default.toml");
        let config = AppConfig::from_toml(content).unwrap();
        assert!(config.validate().is_ok());
    }
}
