use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use spchain_core::DEFAULT_MAX_BATCH_SIZE;
use std::fmt;
use std::time::Duration;

pub const ENV_URL: &str = "SPCHAIN_URL";
pub const ENV_TIMEOUT_MS: &str = "SPCHAIN_TIMEOUT_MS";
pub const ENV_MAX_BATCH_SIZE: &str = "SPCHAIN_MAX_BATCH_SIZE";
pub const ENV_TOKEN: &str = "SPCHAIN_TOKEN";

/// Client configuration
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Absolute url of the web every chain starts from
    pub url: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Maximum number of actions in a single batch
    pub max_batch_size: usize,
    pub user_agent: String,
    /// Static bearer token; anonymous when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost".to_string(),
            timeout_ms: 30000,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            user_agent: format!("spchain/{}", env!("CARGO_PKG_VERSION")),
            bearer_token: None,
        }
    }
}

impl ClientConfig {
    pub fn new_with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Read `SPCHAIN_URL` (required), `SPCHAIN_TIMEOUT_MS`, `SPCHAIN_MAX_BATCH_SIZE`
    /// and `SPCHAIN_TOKEN` from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(ENV_URL).with_context(|| format!("{} is not set", ENV_URL))?;
        let mut config = Self::new_with_url(url);

        if let Some(value) = lookup(ENV_TIMEOUT_MS) {
            config.timeout_ms = value
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of milliseconds, got '{}'", ENV_TIMEOUT_MS, value))?;
        }
        if let Some(value) = lookup(ENV_MAX_BATCH_SIZE) {
            config.max_batch_size = value
                .trim()
                .parse()
                .with_context(|| format!("{} must be a positive integer, got '{}'", ENV_MAX_BATCH_SIZE, value))?;
        }
        config.bearer_token = lookup(ENV_TOKEN).filter(|token| !token.trim().is_empty());

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("https://") || self.url.starts_with("http://")) {
            bail!("url must be an absolute http(s) url, got '{}'", self.url);
        }
        if self.timeout_ms == 0 {
            bail!("timeout_ms must be greater than zero");
        }
        if self.max_batch_size == 0 {
            bail!("max_batch_size must be at least 1");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_batch_size", &self.max_batch_size)
            .field("user_agent", &self.user_agent)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
