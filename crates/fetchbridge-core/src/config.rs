//! fetchbridge.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Preferred number of bytes requested from the host per pull (16 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Outbound fetches allowed in flight per request scope.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: u32 = 10;

/// Sent on outbound fetches that carry no `user-agent` of their own.
pub const DEFAULT_USER_AGENT: &str = "fetchbridge-runtime/fetcher";

pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub stream: Option<StreamConfig>,
    pub fetch: Option<FetchConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamConfig {
    pub chunk_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchConfig {
    pub max_concurrent: Option<u32>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub filter: Option<String>,
    pub json: Option<bool>,
}

impl BridgeConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.chunk_size() == 0 {
            anyhow::bail!("stream.chunk_size must be greater than zero");
        }
        if self.max_concurrent_fetches() == 0 {
            anyhow::bail!("fetch.max_concurrent must be greater than zero");
        }
        Ok(())
    }

    pub fn chunk_size(&self) -> usize {
        self.stream
            .as_ref()
            .and_then(|s| s.chunk_size)
            .unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    pub fn max_concurrent_fetches(&self) -> u32 {
        self.fetch
            .as_ref()
            .and_then(|f| f.max_concurrent)
            .unwrap_or(DEFAULT_MAX_CONCURRENT_FETCHES)
    }

    pub fn user_agent(&self) -> &str {
        self.fetch
            .as_ref()
            .and_then(|f| f.user_agent.as_deref())
            .unwrap_or(DEFAULT_USER_AGENT)
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Scaffold a fetchbridge.toml with every default spelled out.
    pub fn scaffold() -> Self {
        BridgeConfig {
            stream: Some(StreamConfig {
                chunk_size: Some(DEFAULT_CHUNK_SIZE),
            }),
            fetch: Some(FetchConfig {
                max_concurrent: Some(DEFAULT_MAX_CONCURRENT_FETCHES),
                user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            }),
            logging: Some(LoggingConfig {
                filter: Some(DEFAULT_LOG_FILTER.to_string()),
                json: Some(false),
            }),
        }
    }
}

impl LoggingConfig {
    pub fn filter(&self) -> &str {
        self.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    pub fn json(&self) -> bool {
        self.json.unwrap_or(false)
    }
}
