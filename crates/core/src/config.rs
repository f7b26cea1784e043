use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::Result;
use crate::paths::Paths;
use crate::types::BrowserConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5001
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// API key for the remote reasoning service. May be omitted here and
    /// supplied per-request or via `WEBPILOT_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "computer-use-preview".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_api_base(),
            model: default_model(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl AgentConfig {
    /// Resolve the API key: explicit value wins, then config, then env.
    pub fn resolve_api_key(&self, explicit: Option<&str>) -> Option<String> {
        explicit
            .map(|k| k.to_string())
            .or_else(|| self.api_key.clone())
            .or_else(|| std::env::var("WEBPILOT_API_KEY").ok())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverConfig {
    /// Defaults used when a task request omits browser settings.
    #[serde(default)]
    pub defaults: BrowserConfig,
    /// Use the synthetic driver instead of launching a real browser.
    /// `WEBPILOT_SYNTHETIC_BROWSER=1` overrides this at runtime.
    #[serde(default)]
    pub synthetic: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            defaults: BrowserConfig::default(),
            synthetic: false,
        }
    }
}

impl DriverConfig {
    pub fn use_synthetic(&self) -> bool {
        if let Ok(v) = std::env::var("WEBPILOT_SYNTHETIC_BROWSER") {
            return v == "1" || v.eq_ignore_ascii_case("true");
        }
        self.synthetic
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default = "default_log_cap")]
    pub log_cap: usize,
    #[serde(default = "default_screenshot_cap")]
    pub screenshot_cap: usize,
    #[serde(default = "default_action_cap")]
    pub action_cap: usize,
    #[serde(default = "default_reasoning_cap")]
    pub reasoning_cap: usize,
    /// Seconds without a session update (while unpaused) before the sweep
    /// force-terminates the session.
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Sessions untouched for more than this many days are purged by
    /// the cleanup sweep.
    #[serde(default = "default_cleanup_days")]
    pub cleanup_days: u64,
}

fn default_log_cap() -> usize {
    1000
}

fn default_screenshot_cap() -> usize {
    10
}

fn default_action_cap() -> usize {
    100
}

fn default_reasoning_cap() -> usize {
    50
}

fn default_inactivity_timeout_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_cleanup_days() -> u64 {
    7
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            log_cap: default_log_cap(),
            screenshot_cap: default_screenshot_cap(),
            action_cap: default_action_cap(),
            reasoning_cap: default_reasoning_cap(),
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            cleanup_days: default_cleanup_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
}

impl Config {
    pub fn load(paths: &Paths) -> Result<Self> {
        let path = paths.config_file();
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, paths: &Paths) -> Result<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 5001);
        assert_eq!(config.agent.model, "computer-use-preview");
        assert_eq!(config.sessions.log_cap, 1000);
        assert_eq!(config.sessions.screenshot_cap, 10);
        assert_eq!(config.sessions.inactivity_timeout_secs, 300);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"server":{"port":8080},"sessions":{"logCap":10}}"#).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.sessions.log_cap, 10);
        assert_eq!(config.sessions.action_cap, 100);
    }
}
