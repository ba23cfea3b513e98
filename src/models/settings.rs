//! Settings Models
//!
//! Orchestrator configuration stored in config.json.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use webtest_client::{derive_ws_base_url, ServiceEndpoint};
use webtest_core::ProxyConfig;

/// Orchestrator configuration stored in config.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// REST base URL of the testing service
    pub api_base_url: String,
    /// Push channel base URL; derived from `api_base_url` when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_base_url: Option<String>,
    /// Sent as `X-API-Key`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Sent as a bearer token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Language code for plan generation and prompt conversion (e.g., "en", "ko")
    pub language: String,
    /// Scan status polling interval in seconds
    pub poll_interval_secs: u64,
    /// Delay before reopening a dropped execution channel, in seconds
    pub reconnect_delay_secs: u64,
    /// Reconnects allowed before an unstarted execution is given up on
    pub max_reconnect_attempts: u32,
    /// Scan log entries kept in memory
    pub scan_log_capacity: usize,
    pub default_max_pages: u32,
    pub default_max_depth: u32,
    /// Per-request timeout in seconds. Plan generation and composition are slow.
    pub request_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            ws_base_url: None,
            api_key: None,
            access_token: None,
            language: "en".to_string(),
            poll_interval_secs: 3,
            reconnect_delay_secs: 3,
            max_reconnect_attempts: 20,
            scan_log_capacity: 500,
            default_max_pages: 5,
            default_max_depth: 2,
            request_timeout_secs: 120,
            proxy: None,
        }
    }
}

/// Settings update request (partial update)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsUpdate {
    pub api_base_url: Option<String>,
    pub ws_base_url: Option<String>,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub language: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub reconnect_delay_secs: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
    pub scan_log_capacity: Option<usize>,
    pub default_max_pages: Option<u32>,
    pub default_max_depth: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub proxy: Option<ProxyConfig>,
}

impl OrchestratorConfig {
    /// Apply a partial update to the configuration
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(url) = update.api_base_url {
            self.api_base_url = url;
        }
        if let Some(url) = update.ws_base_url {
            self.ws_base_url = Some(url);
        }
        if let Some(key) = update.api_key {
            self.api_key = Some(key);
        }
        if let Some(token) = update.access_token {
            self.access_token = Some(token);
        }
        if let Some(language) = update.language {
            self.language = language;
        }
        if let Some(secs) = update.poll_interval_secs {
            self.poll_interval_secs = secs;
        }
        if let Some(secs) = update.reconnect_delay_secs {
            self.reconnect_delay_secs = secs;
        }
        if let Some(max) = update.max_reconnect_attempts {
            self.max_reconnect_attempts = max;
        }
        if let Some(capacity) = update.scan_log_capacity {
            self.scan_log_capacity = capacity;
        }
        if let Some(pages) = update.default_max_pages {
            self.default_max_pages = pages;
        }
        if let Some(depth) = update.default_max_depth {
            self.default_max_depth = depth;
        }
        if let Some(secs) = update.request_timeout_secs {
            self.request_timeout_secs = secs;
        }
        if let Some(proxy) = update.proxy {
            self.proxy = Some(proxy);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        let base = url::Url::parse(&self.api_base_url)
            .map_err(|e| format!("Invalid api_base_url {}: {}", self.api_base_url, e))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(format!(
                "Invalid api_base_url {}: scheme must be http or https",
                self.api_base_url
            ));
        }

        if let Some(ws) = &self.ws_base_url {
            let parsed =
                url::Url::parse(ws).map_err(|e| format!("Invalid ws_base_url {}: {}", ws, e))?;
            if !matches!(parsed.scheme(), "ws" | "wss") {
                return Err(format!(
                    "Invalid ws_base_url {}: scheme must be ws or wss",
                    ws
                ));
            }
        }

        // Validate language (basic check)
        if self.language.len() < 2 || self.language.len() > 5 {
            return Err(format!("Invalid language code: {}", self.language));
        }

        if self.poll_interval_secs == 0 {
            return Err("poll_interval_secs must be at least 1 second".to_string());
        }
        if self.reconnect_delay_secs == 0 {
            return Err("reconnect_delay_secs must be at least 1 second".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be at least 1 second".to_string());
        }
        if self.scan_log_capacity == 0 {
            return Err("scan_log_capacity must be greater than 0".to_string());
        }
        if self.default_max_pages == 0 {
            return Err("default_max_pages must be greater than 0".to_string());
        }

        if let Some(proxy) = &self.proxy {
            proxy.validate()?;
        }

        Ok(())
    }

    /// Push channel base URL, explicit or derived from `api_base_url`
    pub fn resolved_ws_base_url(&self) -> Result<String, String> {
        match &self.ws_base_url {
            Some(url) => Ok(url.clone()),
            None => derive_ws_base_url(&self.api_base_url).map_err(String::from),
        }
    }

    /// REST connection settings for the client crate
    pub fn endpoint(&self) -> ServiceEndpoint {
        ServiceEndpoint {
            api_base_url: self.api_base_url.clone(),
            api_key: self.api_key.clone(),
            access_token: self.access_token.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            proxy: self.proxy.clone(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}
