//! Resolved host configuration.

use fetchbridge_core::config::{
    BridgeConfig, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CONCURRENT_FETCHES, DEFAULT_USER_AGENT,
};

/// Host-side settings with every default applied.
///
/// Built from a [`BridgeConfig`] (the TOML representation) and adjustable
/// with the `with_*` builder methods. Sizes and limits are always non-zero.
#[derive(Debug, Clone)]
pub struct HostConfig {
    chunk_size: usize,
    max_concurrent_fetches: u32,
    user_agent: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HostConfig {
    pub fn from_bridge_config(config: &BridgeConfig) -> anyhow::Result<Self> {
        Self::default()
            .with_chunk_size(config.chunk_size())?
            .with_max_concurrent_fetches(config.max_concurrent_fetches())
            .map(|host| host.with_user_agent(config.user_agent()))
    }

    /// Bytes requested from a host reader per pull.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Outbound fetches allowed in flight per request scope.
    pub fn max_concurrent_fetches(&self) -> u32 {
        self.max_concurrent_fetches
    }

    /// Sent on outbound fetches without their own `user-agent`.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Builder method: set the pull size for fetched bodies.
    pub fn with_chunk_size(self, chunk_size: usize) -> anyhow::Result<Self> {
        if chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than zero");
        }
        Ok(Self { chunk_size, ..self })
    }

    /// Builder method: set the per-request fetch limit.
    pub fn with_max_concurrent_fetches(self, max_concurrent_fetches: u32) -> anyhow::Result<Self> {
        if max_concurrent_fetches == 0 {
            anyhow::bail!("max_concurrent_fetches must be greater than zero");
        }
        Ok(Self {
            max_concurrent_fetches,
            ..self
        })
    }

    /// Builder method: set the default user agent.
    pub fn with_user_agent(self, user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            ..self
        }
    }
}
