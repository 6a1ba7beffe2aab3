use eyre::Result;
use serde::{Deserialize, Serialize};
use std::time;

use crate::config::constants::{ERROR_HISTORY, LOG_FILE_PATH};

#[cfg(not(test))]
use super::CONFIG;
#[cfg(test)]
use super::TEST_CONFIG;

use super::constants::API_URL;
use super::defaults::*;

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Configuration {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct GeneralConfig {
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LogConfig {
    #[serde(default = "log_level")]
    pub level: Option<String>,

    #[serde(default)]
    pub filters: Option<Vec<LogFilter>>,

    #[serde(default)]
    pub file: LogFile,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LogFilter {
    #[serde(default)]
    pub module: Option<String>,

    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LogFile {
    #[serde(default = "log_file_path")]
    pub path: String,

    #[serde(default)]
    pub append: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(default = "api_url")]
    pub api_url: String,

    /// Realtime endpoint. Derived from `api_url` when not set.
    #[serde(default)]
    pub ws_url: Option<String>,

    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default)]
    pub timeout_secs: Option<u16>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SessionConfig {
    #[serde(default)]
    pub send_policy: SendPolicy,

    #[serde(default = "error_history")]
    pub error_history: usize,
}

/// How a session treats a send issued while another send is in flight.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SendPolicy {
    /// Sends are queued and run one at a time, in call order.
    #[default]
    #[serde(rename = "serialize")]
    Serialize,
    /// A send while another is in flight fails immediately.
    #[serde(rename = "reject_if_busy")]
    RejectIfBusy,
    /// No guard at all, overlapping sends race each other.
    #[serde(rename = "race")]
    Race,
}

impl Configuration {
    #[cfg(not(test))]
    pub fn instance() -> &'static Configuration {
        static FALLBACK: std::sync::OnceLock<Configuration> = std::sync::OnceLock::new();
        CONFIG
            .get()
            .unwrap_or_else(|| FALLBACK.get_or_init(Configuration::default))
    }

    #[cfg(not(test))]
    pub fn init(config: Configuration) -> Result<()> {
        CONFIG
            .set(config)
            .map_err(|_| eyre::eyre!("Config already initialized"))?;
        Ok(())
    }

    #[cfg(test)]
    pub fn instance() -> &'static Configuration {
        TEST_CONFIG.with(|config| *config.borrow())
    }

    #[cfg(test)]
    pub fn init(config: Configuration) -> Result<()> {
        TEST_CONFIG.with(|test_config| {
            *test_config.borrow_mut() = Box::leak(Box::new(config));
        });
        Ok(())
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Option<time::Duration> {
        self.timeout_secs
            .map(|secs| time::Duration::from_secs(secs as u64))
    }

    /// Returns the realtime endpoint, falling back to the api url with its
    /// scheme switched to ws(s) and `/ws` appended.
    pub fn ws_url(&self) -> String {
        if let Some(url) = self.ws_url.as_deref() {
            return url.to_string();
        }
        let base = self.api_url.trim_end_matches('/');
        format!(
            "{}/ws",
            base.replacen("https://", "wss://", 1)
                .replacen("http://", "ws://", 1)
        )
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Some("info".to_string()),
            file: LogFile::default(),
            filters: None,
        }
    }
}

impl Default for LogFile {
    fn default() -> Self {
        Self {
            path: LOG_FILE_PATH.to_string(),
            append: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_url: API_URL.to_string(),
            ws_url: None,
            api_token: None,
            timeout_secs: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            send_policy: SendPolicy::default(),
            error_history: ERROR_HISTORY,
        }
    }
}
